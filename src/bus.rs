//! Bus / MasterBus (C5): mixer-backed summing points.
//!
//! Grounded in the input-index allocator pattern from
//! `other_examples/.../routing.rs`'s `RoutingGraph` (monotonic id
//! counters, `HashMap<index, source>` bookkeeping) and the teacher's
//! `Bus`-like `RouteDestination` concept in `src/mixer/routing.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::dispatcher::{route_connect, route_disconnect_input, Dispatcher};
use crate::engine::{validate_bus, Engine, NodeId};
use crate::error::MixError;
use crate::node::NodeHandle;

/// A mixer owned by the core that other nodes connect their outputs
/// into. Input indices are allocated monotonically and never recycled
/// (spec §9's Open Question: this implementation chooses monotonic
/// allocation, see DESIGN.md).
pub struct Bus {
    name: String,
    mixer: NodeHandle,
    next_input: AtomicU32,
    inputs: Mutex<HashMap<u32, NodeId>>,
}

impl Bus {
    pub fn new(engine: &dyn Engine, name: impl Into<String>) -> Result<Self, MixError> {
        let mut mixer = crate::node::create_mixer(engine)?;
        mixer.ensure_attached(engine)?;
        Ok(Self {
            name: name.into(),
            mixer,
            next_input: AtomicU32::new(0),
            inputs: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mixer(&self) -> &NodeHandle {
        &self.mixer
    }

    /// Connect `source`'s output bus 0 into a freshly allocated input
    /// index on this bus's mixer. Returns the allocated index. Routes the
    /// connect through `dispatcher` when bound, so this wiring step obeys
    /// the same single-writer exclusion as every other graph mutation.
    pub fn connect_channel(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        source: &mut NodeHandle,
    ) -> Result<u32, MixError> {
        source.ensure_attached(engine)?;
        self.mixer.ensure_attached(engine)?;
        let index = self.next_input.fetch_add(1, Ordering::SeqCst);
        route_connect(dispatcher, engine, source.id(), self.mixer.id(), 0, index)?;
        self.inputs.lock().unwrap().insert(index, source.id());
        Ok(index)
    }

    /// Allocate the next input index without wiring anything yet. Used by
    /// callers (e.g. `Channel::connect_send_to`) that need an index
    /// before the eventual source node exists, recording the source
    /// afterwards via [`Bus::record_input`].
    pub fn allocate_input_index(&self) -> u32 {
        self.next_input.fetch_add(1, Ordering::SeqCst)
    }

    /// Record the source feeding a previously [`allocate_input_index`]'d
    /// input, once the caller has connected it.
    pub fn record_input(&mut self, index: u32, source: NodeId) {
        self.inputs.lock().unwrap().insert(index, source);
    }

    pub fn disconnect_input(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        index: u32,
    ) -> Result<(), MixError> {
        route_disconnect_input(dispatcher, engine, self.mixer.id(), index)?;
        self.inputs.lock().unwrap().remove(&index);
        Ok(())
    }

    fn source_of(&self, index: u32) -> Result<NodeId, MixError> {
        self.inputs
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .ok_or_else(|| MixError::NotFound(format!("bus input {index}")))
    }

    /// Prefer per-edge gain on the recorded source->bus connection;
    /// fall back to bus-level mixer gain when unsupported.
    pub fn set_input_level(&self, engine: &dyn Engine, index: u32, value: f32) -> Result<(), MixError> {
        crate::engine::validate_volume(value)?;
        let src = self.source_of(index)?;
        match engine.set_connection_input_volume(src, self.mixer.id(), index, value) {
            Ok(()) => Ok(()),
            Err(MixError::EngineError(_)) => {
                log::debug!(
                    target: "mixcore::bus",
                    "engine has no per-edge gain for bus {} input {index}, falling back to mixer gain",
                    self.name
                );
                validate_bus(self.mixer.input_bus_count(engine)?, index)?;
                engine.set_mixer_volume(self.mixer.id(), index, value)
            }
            Err(e) => Err(e),
        }
    }

    pub fn input_level(&self, engine: &dyn Engine, index: u32) -> Result<f32, MixError> {
        let src = self.source_of(index)?;
        match engine.connection_input_volume(src, self.mixer.id(), index) {
            Ok(v) => Ok(v),
            Err(MixError::EngineError(_)) => engine.mixer_volume(self.mixer.id(), index),
            Err(e) => Err(e),
        }
    }

    pub fn set_input_pan(&self, engine: &dyn Engine, index: u32, value: f32) -> Result<(), MixError> {
        crate::engine::validate_pan(value)?;
        self.source_of(index)?;
        validate_bus(self.mixer.input_bus_count(engine)?, index)?;
        engine.set_mixer_pan(self.mixer.id(), index, value)
    }

    pub fn input_pan(&self, engine: &dyn Engine, index: u32) -> Result<f32, MixError> {
        self.source_of(index)?;
        engine.mixer_pan(self.mixer.id(), index)
    }

    pub fn release(&mut self, engine: &dyn Engine) -> Result<(), MixError> {
        self.mixer.release(engine)
    }
}

/// Non-owning view of the engine's main mixer: the routing destination
/// for `connectToMaster`.
pub struct MasterBus;

impl MasterBus {
    pub fn node(engine: &dyn Engine) -> NodeId {
        engine.main_mixer_node()
    }

    pub fn input_level(engine: &dyn Engine, index: u32) -> Result<f32, MixError> {
        engine.mixer_volume(engine.main_mixer_node(), index)
    }

    pub fn set_input_level(engine: &dyn Engine, index: u32, value: f32) -> Result<(), MixError> {
        crate::engine::validate_volume(value)?;
        engine.set_mixer_volume(engine.main_mixer_node(), index, value)
    }
}
