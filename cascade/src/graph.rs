//! The graph: per-instance engine state (§2) tying together the node
//! table, topological queue, transaction bookkeeping, and link registry,
//! plus the [`Group`] handle application code actually holds.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::link::LinkCache;
use crate::logging::CascadeEvent;
use crate::node::{LinkOutputs, NodeCategory, UpdateContext, UpdateOutcome};
use crate::queue::TopoQueue;
use crate::sync_point::Dependency;
use crate::table::{NodeId, NodeTable};
use crate::transaction::{AsyncTransaction, TransactionFlags};

thread_local! {
    /// Guards against re-entering a synchronous transaction from within a
    /// propagation callback (§5, §7 "Misuse").
    static IN_PROPAGATION: Cell<bool> = const { Cell::new(false) };
}

struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> Self {
        IN_PROPAGATION.with(|flag| {
            assert!(
                !flag.get(),
                "cascade: do_transaction re-entered from within a propagation callback"
            );
            flag.set(true);
        });
        ReentrancyGuard
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_PROPAGATION.with(|flag| flag.set(false));
    }
}

/// Identifies a graph instance by the stable address of its shared state.
/// Used as the key for per-target-graph link output staging (§4.3 step 3)
/// and by the link registry (§4.7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GraphId(usize);

#[derive(Default)]
struct CycleState {
    allow_merging: bool,
    sync_linked: bool,
    local_deps: Vec<Dependency>,
    link_deps: Vec<Dependency>,
}

impl CycleState {
    fn record(&mut self, dependency: Option<Dependency>, flags: TransactionFlags) {
        let sync_linked = flags.contains(TransactionFlags::SYNC_LINKED);
        if flags.contains(TransactionFlags::ALLOW_MERGING) {
            self.allow_merging = true;
        }
        if sync_linked {
            self.sync_linked = true;
        }
        if let Some(dependency) = dependency {
            if sync_linked {
                self.link_deps.push(dependency);
            } else {
                self.local_deps.push(dependency);
            }
        }
    }

    fn take(&mut self) -> (bool, bool, Vec<Dependency>, Vec<Dependency>) {
        (
            std::mem::take(&mut self.allow_merging),
            std::mem::take(&mut self.sync_linked),
            std::mem::take(&mut self.local_deps),
            std::mem::take(&mut self.link_deps),
        )
    }
}

/// Optional knobs for constructing a [`Group`] (§6, "Configuration").
pub struct GroupConfig {
    /// Installs a logger for [`CascadeEvent`]s emitted by this graph.
    pub logger: Option<cascade_logging::Logger<CascadeEvent>>,
    /// Initial capacity of the graph's async transaction queue. Must be
    /// greater than zero; see [`GroupConfigError::ZeroQueueCapacity`].
    pub queue_capacity_hint: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig {
            logger: None,
            queue_capacity_hint: 16,
        }
    }
}

/// A [`GroupConfig`] that failed validation (§7, "Graph/queue setup").
#[derive(Debug, thiserror::Error)]
pub enum GroupConfigError {
    #[error("queue_capacity_hint must be greater than zero")]
    ZeroQueueCapacity,
}

/// Per-graph engine state guarded by a single mutex: the node table, the
/// topological queue, the transaction nesting counter, and the link cache.
/// Everything here is only ever touched while the owning [`GraphShared`]'s
/// lock is held, which is what makes propagation single-threaded per graph
/// (§5) without any inner locking.
pub(crate) struct GraphInner {
    pub(crate) table: NodeTable,
    queue: TopoQueue,
    transaction_level: u32,
    changed_inputs: Vec<NodeId>,
    dirty: Vec<NodeId>,
    pub(crate) link_cache: LinkCache,
    cycle: CycleState,
    logger: Option<cascade_logging::Logger<CascadeEvent>>,
}

impl GraphInner {
    fn new(config: &GroupConfig) -> Self {
        GraphInner {
            table: NodeTable::new(),
            queue: TopoQueue::new(),
            transaction_level: 0,
            changed_inputs: Vec::new(),
            dirty: Vec::new(),
            link_cache: LinkCache::new(),
            cycle: CycleState::default(),
            logger: config.logger.clone(),
        }
    }

    fn log(&self, event: CascadeEvent) {
        if let Some(logger) = &self.logger {
            logger.log(event);
        }
    }

    fn schedule_successors(&mut self, id: NodeId) {
        for succ in self.table.successors(id) {
            if !self.table.contains(succ) {
                continue;
            }
            if !self.table.is_queued(succ) {
                self.table.set_queued(succ, true);
                self.queue.push(succ, self.table.level(succ));
            }
        }
    }

    fn propagate_new_level_to_successors(&self, id: NodeId, level: u32) {
        for succ in self.table.successors(id) {
            if self.table.contains(succ) {
                self.table.set_new_level(succ, level + 1);
            }
        }
    }

    fn clear_dirty(&mut self) {
        for id in self.dirty.drain(..) {
            if self.table.contains(id) {
                let mut body = self.table.take_body(id);
                body.clear();
                self.table.put_body(id, body);
            }
        }
    }

    /// Runs one node's `update`, handling each of the three outcomes
    /// (§4.3 step 2.c, §4.4). Panics from user closures are caught and
    /// returned rather than resumed here: the caller still holds the
    /// graph's mutex at this point, and resuming the unwind through a live
    /// `MutexGuard` would poison it for every future transaction (§7,
    /// "Propagation exception"). The per-cycle dirty buffer is still
    /// cleared before the payload is handed back.
    fn run_update(&mut self, id: NodeId) -> Option<Box<dyn Any + Send>> {
        if !self.table.contains(id) {
            return None;
        }
        let mut body = self.table.take_body(id);
        let result = {
            let ctx = UpdateContext { table: &self.table };
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body.update(&ctx)))
        };
        self.table.put_body(id, body);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.table.set_queued(id, false);
                self.clear_dirty();
                return Some(payload);
            }
        };

        self.log(CascadeEvent::NodeUpdated {
            node: format!("{id:?}"),
            outcome,
        });

        match outcome {
            UpdateOutcome::Unchanged => {
                self.table.set_queued(id, false);
            }
            UpdateOutcome::Changed => {
                self.table.set_queued(id, false);
                self.dirty.push(id);
                self.schedule_successors(id);
            }
            UpdateOutcome::Shifted => {
                let level = self.table.level(id);
                self.log(CascadeEvent::NodeShifted {
                    node: format!("{id:?}"),
                    new_level: level,
                });
                self.propagate_new_level_to_successors(id, level);
                self.queue.push(id, level);
            }
        }
        None
    }

    /// Abandons the current propagation cycle after a node panic: any node
    /// still sitting in the topological queue is unmarked so it can be
    /// scheduled again by a future transaction, and the cycle's merge/link
    /// bookkeeping is discarded (§7, "Propagation exception").
    fn abort_cycle(&mut self) {
        for id in self.queue.drain_all() {
            if self.table.contains(id) {
                self.table.set_queued(id, false);
            }
        }
        self.cycle.take();
        self.log(CascadeEvent::TransactionPanicked);
    }

    /// The propagation driver (§4.3): drains `changedInputs`, repeatedly
    /// pops the lowest-level scheduled batch, and finally stages link
    /// deliveries for any target graphs reached this cycle. Returns the
    /// panic payload, if any node update panicked, instead of resuming it:
    /// callers resume it only once they have released the graph's mutex.
    fn propagate(&mut self, group: &Group) -> Option<Box<dyn Any + Send>> {
        let changed_inputs = std::mem::take(&mut self.changed_inputs);
        for id in changed_inputs {
            if let Some(payload) = self.run_update(id) {
                self.abort_cycle();
                return Some(payload);
            }
        }

        let mut outputs = LinkOutputs::new();
        while self.queue.fetch_next() {
            let batch = self.queue.next().to_vec();
            for (id, _level) in batch {
                if !self.table.contains(id) {
                    continue;
                }
                if self.table.level(id) < self.table.new_level(id) {
                    let updated = self.table.adopt_new_level(id);
                    self.propagate_new_level_to_successors(id, updated);
                    self.queue.push(id, updated);
                    continue;
                }
                if self.table.category(id) == NodeCategory::LinkOutput {
                    let mut body = self.table.take_body(id);
                    {
                        let ctx = UpdateContext { table: &self.table };
                        body.collect_output(&ctx, &mut outputs);
                    }
                    self.table.put_body(id, body);
                    self.table.set_queued(id, false);
                    continue;
                }
                if let Some(payload) = self.run_update(id) {
                    self.abort_cycle();
                    return Some(payload);
                }
            }
        }

        let (allow_merging, sync_linked, local_deps, link_deps) = self.cycle.take();
        let downstream_dependency = if sync_linked && !link_deps.is_empty() {
            Some(Dependency::combine(link_deps))
        } else {
            None
        };
        let mut flags = TransactionFlags::NONE;
        if allow_merging {
            flags = flags | TransactionFlags::ALLOW_MERGING;
        }
        if sync_linked {
            flags = flags | TransactionFlags::SYNC_LINKED;
        }
        for (_, (target, deliveries)) in outputs.by_target {
            self.log(CascadeEvent::LinkDeliveryStaged {
                target: format!("{:?}", target.id()),
                count: deliveries.len(),
            });
            let dependency = downstream_dependency.clone();
            target.enqueue_transaction(
                Box::new(move |g: &Group| {
                    for delivery in deliveries {
                        delivery(g);
                    }
                    g.log_event(CascadeEvent::LinkDeliveryApplied {
                        target: format!("{:?}", g.id()),
                    });
                }),
                dependency,
                flags,
            );
        }
        drop(local_deps);

        self.clear_dirty();
        None
    }
}

struct TransactionQueueState {
    queue: Mutex<std::collections::VecDeque<AsyncTransaction>>,
    condvar: Condvar,
    closed: AtomicBool,
}

impl TransactionQueueState {
    fn new(capacity_hint: usize) -> Self {
        TransactionQueueState {
            queue: Mutex::new(std::collections::VecDeque::with_capacity(capacity_hint)),
            condvar: Condvar::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push_back(&self, txn: AsyncTransaction) {
        self.queue.lock().unwrap().push_back(txn);
        self.condvar.notify_one();
    }

    fn push_front(&self, txn: AsyncTransaction) {
        self.queue.lock().unwrap().push_front(txn);
        self.condvar.notify_one();
    }

    fn try_pop(&self) -> Option<AsyncTransaction> {
        self.queue.lock().unwrap().pop_front()
    }

    fn pop_blocking(&self) -> Option<AsyncTransaction> {
        let mut guard = self.queue.lock().unwrap();
        loop {
            if let Some(txn) = guard.pop_front() {
                return Some(txn);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            guard = self.condvar.wait(guard).unwrap();
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}

struct GraphShared {
    inner: Mutex<GraphInner>,
    tx_queue: TransactionQueueState,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for GraphShared {
    fn drop(&mut self) {
        self.tx_queue.close();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// A handle to a graph. Clones share ownership of the same underlying
/// engine state; the graph's background transaction-queue worker thread is
/// joined when the last clone is dropped.
#[derive(Clone)]
pub struct Group(Arc<GraphShared>);

/// A non-owning reference to a [`Group`] that does not keep its worker
/// thread alive. A link forwarder holds its target this way (§7, "Link
/// target destroyed") so a forwarder cached on the source side can never
/// itself be the reason a target graph's `GraphShared` never drops.
#[derive(Clone)]
pub(crate) struct WeakGroup(std::sync::Weak<GraphShared>);

impl WeakGroup {
    pub(crate) fn upgrade(&self) -> Option<Group> {
        self.0.upgrade().map(Group)
    }
}

impl Group {
    pub(crate) fn downgrade(&self) -> WeakGroup {
        WeakGroup(Arc::downgrade(&self.0))
    }

    /// Constructs a new, empty graph with default configuration.
    pub fn new() -> Self {
        Self::new_with(GroupConfig::default())
            .expect("default group configuration is always valid")
    }

    /// Constructs a new graph with the given configuration. Fails only if
    /// `config` itself is invalid (§7, "Graph/queue setup"); this is the
    /// one fallible entry point application code meets outside of a
    /// transaction's own user code.
    pub fn new_with(config: GroupConfig) -> Result<Self, GroupConfigError> {
        if config.queue_capacity_hint == 0 {
            return Err(GroupConfigError::ZeroQueueCapacity);
        }
        let queue_capacity_hint = config.queue_capacity_hint;
        let shared = Arc::new(GraphShared {
            inner: Mutex::new(GraphInner::new(&config)),
            tx_queue: TransactionQueueState::new(queue_capacity_hint),
            worker: Mutex::new(None),
        });
        let group = Group(shared);
        let worker_group = group.clone();
        let handle = std::thread::Builder::new()
            .name("cascade-worker".into())
            .spawn(move || worker_loop(worker_group))
            .expect("failed to spawn cascade transaction worker thread");
        *group.0.worker.lock().unwrap() = Some(handle);
        Ok(group)
    }

    /// A stable identifier for this graph instance, used as a hash key.
    pub fn id(&self) -> GraphId {
        GraphId(Arc::as_ptr(&self.0) as usize)
    }

    pub(crate) fn table_op<R>(&self, f: impl FnOnce(&GraphInner) -> R) -> R {
        let inner = self.0.inner.lock().unwrap();
        f(&inner)
    }

    pub(crate) fn table_op_mut<R>(&self, f: impl FnOnce(&mut GraphInner) -> R) -> R {
        let mut inner = self.0.inner.lock().unwrap();
        f(&mut inner)
    }

    pub(crate) fn log_event(&self, event: CascadeEvent) {
        self.table_op(|inner| inner.log(event));
    }

    /// Registers a new node with this graph.
    pub(crate) fn register(
        &self,
        category: NodeCategory,
        body: Box<dyn crate::node::NodeBody>,
    ) -> NodeId {
        let id = self.table_op(|inner| inner.table.register(category, body));
        self.log_event(CascadeEvent::NodeRegistered {
            node: format!("{id:?}"),
            category: format!("{category:?}"),
        });
        id
    }

    /// Removes a node from this graph (§3, "Lifecycle").
    pub(crate) fn unregister(&self, id: NodeId) {
        self.table_op(|inner| inner.table.unregister(id));
        self.log_event(CascadeEvent::NodeUnregistered {
            node: format!("{id:?}"),
        });
    }

    pub(crate) fn attach(&self, child: NodeId, parent: NodeId) {
        self.table_op(|inner| inner.table.attach(child, parent));
    }

    pub(crate) fn detach(&self, child: NodeId, parent: NodeId) {
        self.table_op(|inner| inner.table.detach(child, parent));
    }

    /// Returns a cached forwarder from this (source) graph to `target_id`,
    /// registering one via `make_body` if none is currently live (§4.7).
    pub(crate) fn lookup_or_create_forwarder(
        &self,
        source_id: NodeId,
        target_id: GraphId,
        make_body: impl FnOnce() -> Box<dyn crate::node::NodeBody>,
    ) -> crate::link::ForwarderHandle {
        let mut inner = self.0.inner.lock().unwrap();
        let GraphInner {
            table, link_cache, ..
        } = &mut *inner;
        link_cache.lookup_or_create(table, self.clone(), source_id, target_id, make_body)
    }

    /// Runs `f`, batching any input pushes performed inside it into a
    /// single propagation cycle once `f` returns and no enclosing
    /// transaction remains (§4.5).
    ///
    /// If a node or observer panics during that cycle, the panic is
    /// caught inside `propagate` and resumed here only after the graph's
    /// mutex has been released, so a panicking cycle never poisons the
    /// mutex for future transactions (§7, "Propagation exception").
    pub fn do_transaction<F: FnOnce(&Group)>(&self, f: F) {
        let _guard = ReentrancyGuard::enter();
        {
            let mut inner = self.0.inner.lock().unwrap();
            inner.transaction_level += 1;
        }
        f(self);
        let payload = {
            let mut inner = self.0.inner.lock().unwrap();
            inner.transaction_level -= 1;
            if inner.transaction_level == 0 {
                let payload = inner.propagate(self);
                if payload.is_none() {
                    inner.log(CascadeEvent::TransactionCommitted);
                }
                payload
            } else {
                None
            }
        };
        if let Some(payload) = payload {
            std::panic::resume_unwind(payload);
        }
    }

    /// Mutates a node's pending buffer and, if outside any transaction,
    /// runs propagation immediately (§4.5). See [`Group::do_transaction`]
    /// for why the panic payload is resumed only after the lock is
    /// released.
    pub(crate) fn push_input(&self, id: NodeId, callback: impl FnOnce(&mut dyn Any)) {
        let payload = {
            let mut inner = self.0.inner.lock().unwrap();
            if !inner.table.contains(id) {
                panic!("cascade: push_input on a destroyed node");
            }
            inner.table.with_body_mut(id, callback);
            inner.changed_inputs.push(id);
            if inner.transaction_level == 0 {
                let _guard = ReentrancyGuard::enter();
                inner.propagate(self)
            } else {
                None
            }
        };
        if let Some(payload) = payload {
            std::panic::resume_unwind(payload);
        }
    }

    /// Places an asynchronous transaction on this graph's queue (§4.5).
    /// `dependency`, if any, is held until this transaction's contribution
    /// to a propagation cycle is fully accounted for.
    pub fn enqueue_transaction(
        &self,
        func: Box<dyn FnOnce(&Group) + Send>,
        dependency: Option<Dependency>,
        flags: TransactionFlags,
    ) {
        self.0.tx_queue.push_back(AsyncTransaction {
            func,
            dependency,
            flags,
        });
        self.log_event(CascadeEvent::TransactionEnqueued);
    }

    fn record_dependency(&self, dependency: Option<Dependency>, flags: TransactionFlags) {
        let mut inner = self.0.inner.lock().unwrap();
        inner.cycle.record(dependency, flags);
    }

    /// Pops one transaction and, if it allows merging, folds in any
    /// immediately-following mergeable transactions into the same
    /// propagation cycle (§4.5 steps 1-3).
    ///
    /// Runs inside `catch_unwind` so a panicking cycle only aborts this
    /// one batch: the worker thread keeps running and the async queue
    /// keeps draining afterward (§7, "Propagation exception").
    fn run_batch(&self, first: AsyncTransaction) {
        let allow_merging = first.flags.contains(TransactionFlags::ALLOW_MERGING);
        let merged_count = std::cell::Cell::new(0usize);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.do_transaction(|g| {
                g.record_dependency(first.dependency, first.flags);
                (first.func)(g);
                if allow_merging {
                    loop {
                        let Some(next) = g.0.tx_queue.try_pop() else {
                            break;
                        };
                        if !next.flags.contains(TransactionFlags::ALLOW_MERGING) {
                            g.0.tx_queue.push_front(next);
                            break;
                        }
                        g.record_dependency(next.dependency, next.flags);
                        (next.func)(g);
                        merged_count.set(merged_count.get() + 1);
                    }
                }
            });
        }));
        if result.is_err() {
            return;
        }
        if merged_count.get() > 0 {
            self.log_event(CascadeEvent::TransactionsMerged {
                count: merged_count.get(),
            });
        }
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_loop(group: Group) {
    loop {
        match group.0.tx_queue.pop_blocking() {
            Some(first) => group.run_batch(first),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let config = GroupConfig {
            logger: None,
            queue_capacity_hint: 0,
        };
        assert!(matches!(
            Group::new_with(config),
            Err(GroupConfigError::ZeroQueueCapacity)
        ));
    }

    #[test]
    fn default_config_constructs_successfully() {
        assert!(Group::new_with(GroupConfig::default()).is_ok());
    }
}
