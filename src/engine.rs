//! Contract for the opaque, platform-provided real-time audio engine.
//!
//! `mixcore` never implements a render engine itself — attach/connect/
//! disconnect, format negotiation, and the render callback all live on the
//! other side of this trait. Production code supplies a concrete `Engine`
//! (e.g. a wrapper around a platform audio graph API); tests use
//! [`crate::test_support::MockEngine`].

use crate::error::MixError;

/// Opaque handle to a node living inside the engine's graph.
///
/// Carries no information about the engine's internal representation;
/// equality/identity is all callers may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn from_raw(id: u64) -> Self {
        NodeId(id)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Audio format negotiated for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
}

/// Sentinel returned by format queries before a node is attached.
pub const UNCONNECTED_FORMAT: AudioSpec = AudioSpec {
    sample_rate: 0,
    channels: 0,
    buffer_size: 0,
};

/// The external real-time audio engine contract (spec §6).
///
/// All graph-mutating methods (`attach`, `connect`, `disconnect_*`,
/// `create_*`, `release_mixer`) are expected to be called only from the
/// [`crate::dispatcher::Dispatcher`]'s single consumer. Non-mutating
/// queries (`is_attached`, bus counts, formats, gain reads) may be called
/// from any thread.
pub trait Engine: Send + Sync {
    /// Attach a node to the engine's graph. Idempotent: attaching an
    /// already-attached node succeeds without effect.
    fn attach(&self, node: NodeId) -> Result<(), MixError>;

    /// Connect an output bus of `src` to an input bus of `dst`.
    fn connect(&self, src: NodeId, dst: NodeId, src_bus: u32, dst_bus: u32) -> Result<(), MixError>;

    /// Disconnect whatever is feeding `node`'s input bus, if anything.
    fn disconnect_node_input(&self, node: NodeId, bus: u32) -> Result<(), MixError>;

    /// Disconnect whatever `node`'s output bus feeds, if anything.
    fn disconnect_node_output(&self, node: NodeId, bus: u32) -> Result<(), MixError>;

    /// The engine's main mixer node (destination for master routing).
    fn main_mixer_node(&self) -> NodeId;

    /// Whether `node` is currently a member of the engine's attached-node set.
    fn is_attached(&self, node: NodeId) -> bool;

    /// Create a stereo mixer node (not yet attached).
    fn create_mixer(&self) -> Result<NodeId, MixError>;

    /// Create a matrix mixer node (not yet attached), used for the phase
    /// inversion placeholder stage.
    fn create_matrix_mixer(&self) -> Result<NodeId, MixError>;

    /// Configure a previously-created matrix mixer to act as a phase
    /// inverter. No-op on engines without the concept; DSP is out of
    /// scope here, this only wires the placeholder stage.
    fn configure_matrix_invert(&self, node: NodeId) -> Result<(), MixError>;

    fn input_bus_count(&self, node: NodeId) -> Result<u32, MixError>;
    fn output_bus_count(&self, node: NodeId) -> Result<u32, MixError>;

    /// The format negotiated for one of `node`'s input buses. Returns
    /// [`UNCONNECTED_FORMAT`] before the node is attached/connected.
    fn input_format_for_bus(&self, node: NodeId, bus: u32) -> Result<AudioSpec, MixError>;

    /// The format negotiated for one of `node`'s output buses. Returns
    /// [`UNCONNECTED_FORMAT`] before the node is attached/connected.
    fn output_format_for_bus(&self, node: NodeId, bus: u32) -> Result<AudioSpec, MixError>;

    fn set_mixer_volume(&self, node: NodeId, bus: u32, value: f32) -> Result<(), MixError>;
    fn mixer_volume(&self, node: NodeId, bus: u32) -> Result<f32, MixError>;
    fn set_mixer_pan(&self, node: NodeId, bus: u32, value: f32) -> Result<(), MixError>;
    fn mixer_pan(&self, node: NodeId, bus: u32) -> Result<f32, MixError>;

    /// Per-edge gain on a specific connection, where the engine supports
    /// it. Callers fall back to bus-level gain when this returns
    /// `Err(MixError::EngineError(_))` with an "unsupported" message.
    fn set_connection_input_volume(
        &self,
        src: NodeId,
        dst: NodeId,
        dst_bus: u32,
        value: f32,
    ) -> Result<(), MixError>;
    fn connection_input_volume(&self, src: NodeId, dst: NodeId, dst_bus: u32) -> Result<f32, MixError>;

    /// Release (and detach, if attached) a mixer node. Idempotent on a
    /// node that was never attached.
    fn release_mixer(&self, node: NodeId) -> Result<(), MixError>;

    /// The format negotiated once at engine construction, immutable for
    /// the engine's lifetime.
    fn default_audio_spec(&self) -> AudioSpec;
}

pub fn validate_bus(count: u32, bus: u32) -> Result<(), MixError> {
    if bus < count {
        Ok(())
    } else {
        Err(MixError::InvalidBus { bus, count })
    }
}

pub fn validate_volume(v: f32) -> Result<(), MixError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(MixError::out_of_range(format!("volume {v} not in [0,1]")))
    }
}

pub fn validate_pan(p: f32) -> Result<(), MixError> {
    if (-1.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(MixError::out_of_range(format!("pan {p} not in [-1,1]")))
    }
}
