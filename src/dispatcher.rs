//! Dispatcher (C3): single-writer serializer for all engine graph
//! mutations.
//!
//! Producers submit items from arbitrary threads; a single consumer
//! applies them to the engine in submission order. Modeled on the
//! teacher's use of `crossbeam-channel` to hand commands from UI/app
//! threads to a dedicated worker (`src/audio/mod.rs`,
//! `src/plugin_host/mod.rs`), generalized here to carry cancellation and
//! an outcome reply per item.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::engine::{Engine, NodeId};
use crate::error::MixError;

/// Minimum queue capacity required by spec §4.3.
pub const MIN_QUEUE_CAPACITY: usize = 32;

/// Cooperative cancellation token carried with each submitted item.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One graph mutation the dispatcher knows how to apply.
pub enum DispatchOp {
    Attach(NodeId),
    Connect {
        src: NodeId,
        dst: NodeId,
        src_bus: u32,
        dst_bus: u32,
    },
    DisconnectNodeInput {
        node: NodeId,
        bus: u32,
    },
    DisconnectNodeOutput {
        node: NodeId,
        bus: u32,
    },
    /// Arbitrary closure for callers that need a custom sequence of
    /// engine calls applied atomically with respect to other dispatcher
    /// items (e.g. a chain rebuild).
    Func(Box<dyn FnOnce(&dyn Engine) -> Result<(), MixError> + Send>),
}

struct Item {
    op: DispatchOp,
    cancel: CancelToken,
    reply: Sender<Result<(), MixError>>,
}

/// Handle producers use to submit mutations; cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Item>,
    closed: Arc<AtomicBool>,
}

/// The consumer side: owns the receiver and applies items against an
/// engine. Either run on a dedicated thread via [`Dispatcher::spawn`], or
/// pumped synchronously via [`DispatcherWorker::pump_once`] /
/// [`DispatcherWorker::drain`] for deterministic tests.
pub struct DispatcherWorker {
    rx: Receiver<Item>,
}

impl Dispatcher {
    /// Create a bound dispatcher/worker pair with the given queue
    /// capacity (clamped up to [`MIN_QUEUE_CAPACITY`]).
    pub fn new(capacity: usize) -> (Self, DispatcherWorker) {
        let capacity = capacity.max(MIN_QUEUE_CAPACITY);
        let (tx, rx) = bounded(capacity);
        let closed = Arc::new(AtomicBool::new(false));
        (Dispatcher { tx, closed: closed.clone() }, DispatcherWorker { rx })
    }

    /// Submit an item and block until it has been applied (or cancelled).
    /// Blocks on submission itself if the queue is full (spec's
    /// block-with-context-deadline backpressure policy, realized here as
    /// plain blocking send since no async runtime is in scope).
    pub fn submit(&self, op: DispatchOp, cancel: CancelToken) -> Result<(), MixError> {
        if self.closed.load(Ordering::SeqCst) {
            log::warn!(target: "mixcore::dispatcher", "submit rejected: dispatcher closed");
            return Err(MixError::Closed);
        }
        let (reply_tx, reply_rx) = bounded(1);
        let item = Item { op, cancel, reply: reply_tx };
        self.tx.send(item).map_err(|_| MixError::Closed)?;
        reply_rx.recv().map_err(|_| MixError::Closed)?
    }

    pub fn attach(&self, node: NodeId) -> Result<(), MixError> {
        self.submit(DispatchOp::Attach(node), CancelToken::new())
    }

    pub fn connect(&self, src: NodeId, dst: NodeId, src_bus: u32, dst_bus: u32) -> Result<(), MixError> {
        self.submit(
            DispatchOp::Connect { src, dst, src_bus, dst_bus },
            CancelToken::new(),
        )
    }

    pub fn disconnect_node_input(&self, node: NodeId, bus: u32) -> Result<(), MixError> {
        self.submit(DispatchOp::DisconnectNodeInput { node, bus }, CancelToken::new())
    }

    pub fn disconnect_node_output(&self, node: NodeId, bus: u32) -> Result<(), MixError> {
        self.submit(DispatchOp::DisconnectNodeOutput { node, bus }, CancelToken::new())
    }

    pub fn run(&self, f: impl FnOnce(&dyn Engine) -> Result<(), MixError> + Send + 'static) -> Result<(), MixError> {
        self.submit(DispatchOp::Func(Box::new(f)), CancelToken::new())
    }

    /// Drain pending work and refuse further submissions. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Route a connect through `dispatcher` when one is bound, else apply it
/// directly against `engine`. Shared by every topology-mutating call site
/// in `Bus`/`Send`/`PluginChain` so each one honors the single-writer
/// exclusion the dispatcher exists to provide, the same way
/// `Channel::dispatch_connect` does for its own routing operations.
pub fn route_connect(
    dispatcher: Option<&Dispatcher>,
    engine: &dyn Engine,
    src: NodeId,
    dst: NodeId,
    src_bus: u32,
    dst_bus: u32,
) -> Result<(), MixError> {
    match dispatcher {
        Some(d) => d.connect(src, dst, src_bus, dst_bus),
        None => engine.connect(src, dst, src_bus, dst_bus),
    }
}

pub fn route_disconnect_input(
    dispatcher: Option<&Dispatcher>,
    engine: &dyn Engine,
    node: NodeId,
    bus: u32,
) -> Result<(), MixError> {
    match dispatcher {
        Some(d) => d.disconnect_node_input(node, bus),
        None => engine.disconnect_node_input(node, bus),
    }
}

pub fn route_disconnect_output(
    dispatcher: Option<&Dispatcher>,
    engine: &dyn Engine,
    node: NodeId,
    bus: u32,
) -> Result<(), MixError> {
    match dispatcher {
        Some(d) => d.disconnect_node_output(node, bus),
        None => engine.disconnect_node_output(node, bus),
    }
}

impl DispatcherWorker {
    fn apply(op: DispatchOp, engine: &dyn Engine) -> Result<(), MixError> {
        match op {
            DispatchOp::Attach(node) => engine.attach(node),
            DispatchOp::Connect { src, dst, src_bus, dst_bus } => {
                engine.connect(src, dst, src_bus, dst_bus)
            }
            DispatchOp::DisconnectNodeInput { node, bus } => engine.disconnect_node_input(node, bus),
            DispatchOp::DisconnectNodeOutput { node, bus } => engine.disconnect_node_output(node, bus),
            DispatchOp::Func(f) => f(engine),
        }
    }

    /// Apply exactly one pending item, if any. A cancelled-before-start
    /// item is dropped and reported as `Cancelled` without touching the
    /// engine; once an item starts it always runs to completion.
    pub fn pump_once(&self, engine: &dyn Engine) -> bool {
        match self.rx.try_recv() {
            Ok(item) => {
                if item.cancel.is_cancelled() {
                    log::debug!(target: "mixcore::dispatcher", "dropping cancelled item before start");
                    let _ = item.reply.send(Err(MixError::Cancelled));
                } else {
                    let result = Self::apply(item.op, engine);
                    if let Err(ref e) = result {
                        log::warn!(target: "mixcore::dispatcher", "item application failed: {e}");
                    }
                    let _ = item.reply.send(result);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Apply every currently-pending item in submission order.
    pub fn drain(&self, engine: &dyn Engine) -> usize {
        let mut count = 0;
        while self.pump_once(engine) {
            count += 1;
        }
        count
    }

    /// Run a blocking consumer loop on a dedicated thread until the
    /// dispatcher is closed and the queue is empty.
    pub fn spawn(self, engine: Arc<dyn Engine>, dispatcher: Dispatcher) -> JoinHandle<()> {
        std::thread::spawn(move || loop {
            match self.rx.recv_timeout(Duration::from_millis(50)) {
                Ok(item) => {
                    if item.cancel.is_cancelled() {
                        let _ = item.reply.send(Err(MixError::Cancelled));
                    } else {
                        let result = Self::apply(item.op, engine.as_ref());
                        let _ = item.reply.send(result);
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    if dispatcher.is_closed() && self.rx.is_empty() {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        })
    }
}
