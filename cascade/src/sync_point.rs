//! The sync point (§4.6): a refcounted wait primitive used to join on
//! enqueued transactions, built on a mutex, a condition variable, and an
//! integer waiter count — exactly as specified, no async runtime involved.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct Shared {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Shared {
    fn increment(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn decrement_and_notify(&self) {
        let mut count = self.count.lock().unwrap();
        *count = count
            .checked_sub(1)
            .expect("dependency decremented past zero");
        if *count == 0 {
            self.condvar.notify_all();
        }
    }
}

/// A shared wait primitive released when every [`Dependency`] constructed
/// from it (directly, or transitively through [`Dependency::combine`]) has
/// been dropped.
#[derive(Clone)]
pub struct SyncPoint {
    shared: Arc<Shared>,
}

impl SyncPoint {
    /// Creates a sync point with no outstanding dependencies; it is
    /// immediately releasable until a dependency is minted from it.
    pub fn new() -> Self {
        SyncPoint {
            shared: Arc::new(Shared {
                count: Mutex::new(0),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Mints a new dependency token, incrementing the outstanding count.
    pub fn new_dependency(&self) -> Dependency {
        self.shared.increment();
        Dependency(Inner::Single(Arc::clone(&self.shared)))
    }

    /// Blocks the calling thread until the outstanding count reaches zero.
    pub fn wait(&self) {
        let guard = self.shared.count.lock().unwrap();
        let _guard = self
            .shared
            .condvar
            .wait_while(guard, |count| *count != 0)
            .unwrap();
    }

    /// Blocks until release or `timeout` elapses, whichever comes first.
    /// Returns whether the sync point was released within the window.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let guard = self.shared.count.lock().unwrap();
        let (_guard, result) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |count| *count != 0)
            .unwrap();
        !result.timed_out()
    }

    /// As [`SyncPoint::wait_for`], but expressed as an absolute deadline.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.wait_for(remaining)
    }

    /// True if the outstanding count is currently zero. Racy by
    /// construction — meant for tests and diagnostics, not synchronization.
    pub fn is_released(&self) -> bool {
        *self.shared.count.lock().unwrap() == 0
    }
}

impl Default for SyncPoint {
    fn default() -> Self {
        Self::new()
    }
}

enum Inner {
    Single(Arc<Shared>),
    Group(Arc<Vec<Dependency>>),
}

/// A refcounted token on a sync point. Cloning increments the point's
/// outstanding count; dropping decrements it. Moving a `Dependency` does
/// neither, so ownership transfer (e.g. into a closure) never double-counts.
pub struct Dependency(Inner);

impl Dependency {
    /// Combines several dependencies (possibly on different sync points)
    /// into a single token that, while alive, keeps every constituent
    /// alive; once the last clone of the combined token is dropped, every
    /// constituent is dropped and releases its own sync point in turn.
    pub fn combine(dependencies: Vec<Dependency>) -> Dependency {
        Dependency(Inner::Group(Arc::new(dependencies)))
    }
}

impl Clone for Dependency {
    fn clone(&self) -> Self {
        match &self.0 {
            Inner::Single(shared) => {
                shared.increment();
                Dependency(Inner::Single(Arc::clone(shared)))
            }
            Inner::Group(group) => Dependency(Inner::Group(Arc::clone(group))),
        }
    }
}

impl Drop for Dependency {
    fn drop(&mut self) {
        if let Inner::Single(shared) = &self.0 {
            shared.decrement_and_notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn releases_immediately_with_no_dependencies() {
        let sp = SyncPoint::new();
        assert!(sp.is_released());
        sp.wait();
    }

    #[test]
    fn wait_blocks_until_dependency_dropped() {
        let sp = SyncPoint::new();
        let dep = sp.new_dependency();
        assert!(!sp.is_released());

        let sp2 = sp.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            drop(dep);
        });
        sp2.wait();
        assert!(sp2.is_released());
        handle.join().unwrap();
    }

    #[test]
    fn wait_for_times_out() {
        let sp = SyncPoint::new();
        let _dep = sp.new_dependency();
        assert!(!sp.wait_for(Duration::from_millis(20)));
    }

    #[test]
    fn clone_requires_every_copy_to_drop() {
        let sp = SyncPoint::new();
        let dep = sp.new_dependency();
        let dep2 = dep.clone();
        assert!(!sp.is_released());
        drop(dep);
        assert!(!sp.is_released());
        drop(dep2);
        assert!(sp.is_released());
    }

    #[test]
    fn combined_dependency_releases_only_once_all_constituents_drop() {
        let sp_a = SyncPoint::new();
        let sp_b = SyncPoint::new();
        let dep_a = sp_a.new_dependency();
        let dep_b = sp_b.new_dependency();
        let combined = Dependency::combine(vec![dep_a, dep_b]);

        assert!(!sp_a.is_released());
        assert!(!sp_b.is_released());
        drop(combined);
        assert!(sp_a.is_released());
        assert!(sp_b.is_released());
    }
}
