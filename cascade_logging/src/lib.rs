//! Common logging infrastructure shared by the cascade engine.
//!
//! This mirrors the role of `timely_logging` in the teacher crate: a small,
//! dependency-free registry that lets an embedder bind a named event stream
//! to a sink, without the engine itself knowing anything about how events
//! are ultimately consumed (printed, counted, shipped elsewhere).

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A type-erased table of named loggers.
///
/// Binding a name twice replaces the destination for *new* loggers obtained
/// via [`Registry::get`]; loggers already handed out keep using their
/// original destination, mirroring the teacher's registry semantics.
pub struct Registry {
    time: Instant,
    map: HashMap<String, Box<dyn Any + Send>>,
}

impl Registry {
    /// Creates a new logger registry rooted at the current instant.
    pub fn new() -> Self {
        Registry {
            time: Instant::now(),
            map: HashMap::new(),
        }
    }

    /// Binds a log name to an action invoked on log event batches.
    ///
    /// The action receives a lower bound on the next event's timestamp and a
    /// slice of `(elapsed, event)` pairs with non-decreasing timestamps.
    pub fn insert<T: 'static + Send>(
        &mut self,
        name: impl Into<String>,
        action: Box<dyn Fn(&Duration, &[(Duration, T)]) + Send + Sync>,
    ) -> Option<Box<dyn Any + Send>> {
        let logger = Logger::<T>::new(self.time, action);
        self.map.insert(name.into(), Box::new(logger))
    }

    /// Removes a bound logger, signalling end-of-stream to anyone still
    /// holding a clone of it once they next try to flush.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Any + Send>> {
        self.map.remove(name)
    }

    /// Retrieves a shared handle to a named logger, if one has been bound.
    pub fn get<T: 'static + Send>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Logger<T>>())
            .cloned()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// A cheaply cloneable, buffering logger for events of type `T`.
pub struct Logger<T> {
    time: Instant,
    action: Arc<dyn Fn(&Duration, &[(Duration, T)]) + Send + Sync>,
    buffer: Arc<Mutex<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger {
            time: self.time,
            action: Arc::clone(&self.action),
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<T> Logger<T> {
    /// Allocates a new logger bound to a write destination.
    pub fn new(
        time: Instant,
        action: Box<dyn Fn(&Duration, &[(Duration, T)]) + Send + Sync>,
    ) -> Self {
        Logger {
            time,
            action: Arc::from(action),
            buffer: Arc::new(Mutex::new(Vec::with_capacity(256))),
        }
    }

    /// Logs an event, timestamped at the moment of the call.
    ///
    /// The event is buffered; it is written out once the buffer fills or
    /// [`Logger::flush`] is called explicitly.
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes any buffered events to the sink.
    pub fn flush(&self) {
        let mut buffer = self.buffer.lock().unwrap();
        if !buffer.is_empty() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_delivers_buffered_events() {
        let mut registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        registry.insert::<u32>(
            "test",
            Box::new(move |_, events| {
                seen_clone
                    .lock()
                    .unwrap()
                    .extend(events.iter().map(|(_, e)| *e));
            }),
        );
        let logger = registry.get::<u32>("test").unwrap();
        logger.log(1);
        logger.log(2);
        logger.flush();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn unbound_name_returns_none() {
        let registry = Registry::new();
        assert!(registry.get::<u32>("missing").is_none());
    }

    #[test]
    fn stale_handle_keeps_old_destination_after_rebind() {
        let mut registry = Registry::new();
        let first_seen = Arc::new(Mutex::new(Vec::new()));
        let first_seen_clone = Arc::clone(&first_seen);
        registry.insert::<u32>(
            "test",
            Box::new(move |_, events| {
                first_seen_clone
                    .lock()
                    .unwrap()
                    .extend(events.iter().map(|(_, e)| *e));
            }),
        );
        let old_logger = registry.get::<u32>("test").unwrap();

        let second_seen = Arc::new(Mutex::new(Vec::new()));
        let second_seen_clone = Arc::clone(&second_seen);
        registry.insert::<u32>(
            "test",
            Box::new(move |_, events| {
                second_seen_clone
                    .lock()
                    .unwrap()
                    .extend(events.iter().map(|(_, e)| *e));
            }),
        );

        old_logger.log(42);
        old_logger.flush();
        assert_eq!(*first_seen.lock().unwrap(), vec![42]);
        assert!(second_seen.lock().unwrap().is_empty());
    }
}
