//! Node abstraction (C1): an opaque audio-processing object with identity,
//! bus counts, and an attached/installed flag.

use std::sync::Arc;

use crate::engine::{validate_bus, AudioSpec, Engine, NodeId};
use crate::error::MixError;

/// A handle to an engine node plus the bookkeeping `mixcore` needs to
/// enforce "connect only after attach" without re-querying the engine on
/// every call.
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    installed: bool,
}

impl NodeHandle {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            installed: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Attach this node to the engine if it is not already attached.
    /// Idempotent.
    pub fn ensure_attached(&mut self, engine: &dyn Engine) -> Result<(), MixError> {
        if !self.installed {
            engine.attach(self.id)?;
            self.installed = true;
        }
        Ok(())
    }

    pub fn input_bus_count(&self, engine: &dyn Engine) -> Result<u32, MixError> {
        engine.input_bus_count(self.id)
    }

    pub fn output_bus_count(&self, engine: &dyn Engine) -> Result<u32, MixError> {
        engine.output_bus_count(self.id)
    }

    pub fn validate_input_bus(&self, engine: &dyn Engine, bus: u32) -> Result<(), MixError> {
        validate_bus(engine.input_bus_count(self.id)?, bus)
    }

    pub fn validate_output_bus(&self, engine: &dyn Engine, bus: u32) -> Result<(), MixError> {
        validate_bus(engine.output_bus_count(self.id)?, bus)
    }

    /// Negotiated format for one of this node's input buses. Returns the
    /// `unconnected` sentinel before attach/connect (spec §4.1).
    pub fn input_format_for_bus(&self, engine: &dyn Engine, bus: u32) -> Result<AudioSpec, MixError> {
        self.validate_input_bus(engine, bus)?;
        engine.input_format_for_bus(self.id, bus)
    }

    /// Negotiated format for one of this node's output buses. Returns the
    /// `unconnected` sentinel before attach/connect (spec §4.1).
    pub fn output_format_for_bus(&self, engine: &dyn Engine, bus: u32) -> Result<AudioSpec, MixError> {
        self.validate_output_bus(engine, bus)?;
        engine.output_format_for_bus(self.id, bus)
    }

    pub fn set_volume(&self, engine: &dyn Engine, bus: u32, value: f32) -> Result<(), MixError> {
        crate::engine::validate_volume(value)?;
        self.validate_input_bus(engine, bus)?;
        engine.set_mixer_volume(self.id, bus, value)
    }

    pub fn volume(&self, engine: &dyn Engine, bus: u32) -> Result<f32, MixError> {
        self.validate_input_bus(engine, bus)?;
        engine.mixer_volume(self.id, bus)
    }

    pub fn set_pan(&self, engine: &dyn Engine, bus: u32, value: f32) -> Result<(), MixError> {
        crate::engine::validate_pan(value)?;
        self.validate_input_bus(engine, bus)?;
        engine.set_mixer_pan(self.id, bus, value)
    }

    pub fn pan(&self, engine: &dyn Engine, bus: u32) -> Result<f32, MixError> {
        self.validate_input_bus(engine, bus)?;
        engine.mixer_pan(self.id, bus)
    }

    /// Release the underlying mixer node. Idempotent; clears the installed
    /// flag so a stray reuse of this handle fails loudly elsewhere rather
    /// than silently touching a dead node.
    pub fn release(&mut self, engine: &dyn Engine) -> Result<(), MixError> {
        engine.release_mixer(self.id)?;
        self.installed = false;
        Ok(())
    }
}

/// Create a new stereo mixer node handle (not yet attached).
pub fn create_mixer(engine: &dyn Engine) -> Result<NodeHandle, MixError> {
    Ok(NodeHandle::new(engine.create_mixer()?))
}

/// Create a new matrix mixer node handle (not yet attached), used for the
/// phase-invert placeholder stage (spec §9).
pub fn create_matrix_mixer(engine: &dyn Engine) -> Result<NodeHandle, MixError> {
    let handle = NodeHandle::new(engine.create_matrix_mixer()?);
    engine.configure_matrix_invert(handle.id())?;
    Ok(handle)
}

/// Shared, cloneable identity for a node used where multiple owners need
/// to refer to "the same logical node" without owning its lifecycle
/// (e.g. a `Plugin` descriptor shared between a `Channel` and its
/// `PluginChain`'s `Effect` entry). See spec §3(c)/§9.
pub type SharedNodeId = Arc<NodeId>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockEngine;

    #[test]
    fn ensure_attached_is_idempotent() {
        let engine = MockEngine::new();
        let mut handle = create_mixer(&engine).unwrap();
        assert!(!handle.is_installed());
        handle.ensure_attached(&engine).unwrap();
        assert!(handle.is_installed());
        assert_eq!(engine.attach_call_count(), 1);
        handle.ensure_attached(&engine).unwrap();
        assert_eq!(engine.attach_call_count(), 1);
    }

    #[test]
    fn bus_validation_rejects_out_of_range() {
        let engine = MockEngine::new();
        let mut handle = create_mixer(&engine).unwrap();
        handle.ensure_attached(&engine).unwrap();
        let buses = handle.input_bus_count(&engine).unwrap();
        assert!(handle.validate_input_bus(&engine, buses).is_err());
        assert!(handle.validate_input_bus(&engine, 0).is_ok());
    }

    #[test]
    fn format_is_unconnected_sentinel_before_attach() {
        let engine = MockEngine::new();
        let mut handle = create_mixer(&engine).unwrap();
        assert_eq!(
            handle.input_format_for_bus(&engine, 0).unwrap(),
            crate::engine::UNCONNECTED_FORMAT
        );
        handle.ensure_attached(&engine).unwrap();
        assert_ne!(
            handle.input_format_for_bus(&engine, 0).unwrap(),
            crate::engine::UNCONNECTED_FORMAT
        );
    }

    #[test]
    fn volume_out_of_range_rejected_locally() {
        let engine = MockEngine::new();
        let mut handle = create_mixer(&engine).unwrap();
        handle.ensure_attached(&engine).unwrap();
        assert!(matches!(
            handle.set_volume(&engine, 0, 1.5),
            Err(MixError::OutOfRange(_))
        ));
        assert_eq!(engine.connect_call_count(), 0);
    }
}
