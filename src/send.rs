//! Send subsystem (C6): per-send gain node with pre/post-fader source
//! selection and independent level/mute.
//!
//! Grounded in the teacher's `mixer/routing.rs` `Send` type (destination
//! + level + pre/post flag) and in
//! `other_examples/.../routing.rs`'s `SendConfig`/`SendTapPoint`, whose
//! tap-point enum is the direct model for `SendMode` here.

use crate::dispatcher::{route_connect, route_disconnect_input, Dispatcher};
use crate::engine::{Engine, NodeId};
use crate::error::MixError;
use crate::node::NodeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    PreFader,
    PostFader,
}

/// Populated only once a send has been connected; all three fields are
/// always set together (spec §3's "wiring either absent or fully
/// populated" invariant).
pub struct Wired {
    pub gain_mixer: NodeHandle,
    pub bus_input: NodeId,
    pub bus_index: u32,
}

pub enum SendWiring {
    Unwired,
    Wired(Wired),
}

pub struct Send {
    name: String,
    mode: SendMode,
    level: f32,
    prev: f32,
    mute: bool,
    wiring: SendWiring,
}

impl Send {
    pub fn new(name: impl Into<String>, mode: SendMode, level: f32) -> Self {
        let level = level.clamp(0.0, 1.0);
        Self {
            name: name.into(),
            mode,
            level,
            prev: if level > 0.0 { level } else { 1.0 },
            mute: false,
            wiring: SendWiring::Unwired,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> SendMode {
        self.mode
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_wired(&self) -> bool {
        matches!(self.wiring, SendWiring::Wired(_))
    }

    pub fn gain_mixer(&self) -> Option<&NodeHandle> {
        match &self.wiring {
            SendWiring::Wired(w) => Some(&w.gain_mixer),
            SendWiring::Unwired => None,
        }
    }

    fn applied_gain(&self) -> f32 {
        if self.mute {
            0.0
        } else {
            self.level
        }
    }

    /// Source node selection for connection, per spec §4.6: PostFader
    /// taps the channel mixer; PreFader taps the chain output if the
    /// chain has effects, else also the channel mixer.
    pub fn select_source(
        mode: SendMode,
        channel_mixer: &NodeHandle,
        chain_output: Option<&NodeHandle>,
    ) -> NodeId {
        match mode {
            SendMode::PostFader => channel_mixer.id(),
            SendMode::PreFader => chain_output.map(|n| n.id()).unwrap_or_else(|| channel_mixer.id()),
        }
    }

    /// Connect (or re-point, or refresh) this send's wiring to
    /// `(dest_mixer, to_bus)`, implementing the five-step algorithm from
    /// spec §4.6. Every graph-touching step routes through `dispatcher`
    /// when one is bound, matching the rest of the wiring surface.
    pub fn connect(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        source: NodeId,
        dest_mixer: NodeId,
        to_bus: u32,
    ) -> Result<(), MixError> {
        if let SendWiring::Wired(w) = &self.wiring {
            if w.bus_input == dest_mixer && w.bus_index == to_bus {
                engine.set_mixer_volume(w.gain_mixer.id(), 0, self.applied_gain())?;
                return Ok(());
            }
        }

        if let SendWiring::Wired(w) = &mut self.wiring {
            log::debug!(target: "mixcore::send", "rewiring send {} to a new destination", self.name);
            route_disconnect_input(dispatcher, engine, w.bus_input, w.bus_index)?;
            route_disconnect_input(dispatcher, engine, w.gain_mixer.id(), 0)?;
        }

        let mut gain_mixer = match std::mem::replace(&mut self.wiring, SendWiring::Unwired) {
            SendWiring::Wired(w) => w.gain_mixer,
            SendWiring::Unwired => crate::node::create_mixer(engine)?,
        };
        gain_mixer.ensure_attached(engine)?;
        engine.set_mixer_volume(gain_mixer.id(), 0, self.applied_gain())?;

        route_connect(dispatcher, engine, source, gain_mixer.id(), 0, 0)?;
        route_connect(dispatcher, engine, gain_mixer.id(), dest_mixer, 0, to_bus)?;

        self.wiring = SendWiring::Wired(Wired {
            gain_mixer,
            bus_input: dest_mixer,
            bus_index: to_bus,
        });
        Ok(())
    }

    pub fn disconnect(&mut self, engine: &dyn Engine, dispatcher: Option<&Dispatcher>) -> Result<(), MixError> {
        if let SendWiring::Wired(w) = std::mem::replace(&mut self.wiring, SendWiring::Unwired) {
            route_disconnect_input(dispatcher, engine, w.bus_input, w.bus_index)?;
            let mut gain_mixer = w.gain_mixer;
            gain_mixer.release(engine)?;
        }
        Ok(())
    }

    /// Update the logical level and refresh wiring gain if connected.
    /// `level > 0` is remembered in `prev` so unmuting with a zeroed
    /// level can restore it.
    pub fn set_level(&mut self, engine: &dyn Engine, value: f32) -> Result<(), MixError> {
        crate::engine::validate_volume(value)?;
        if value > 0.0 {
            self.prev = value;
        }
        self.level = value;
        self.refresh_gain(engine)
    }

    pub fn set_mute(&mut self, engine: &dyn Engine, mute: bool) -> Result<(), MixError> {
        self.mute = mute;
        if !mute && self.level == 0.0 {
            self.level = self.prev;
        }
        self.refresh_gain(engine)
    }

    fn refresh_gain(&self, engine: &dyn Engine) -> Result<(), MixError> {
        if let SendWiring::Wired(w) = &self.wiring {
            engine.set_mixer_volume(w.gain_mixer.id(), 0, self.applied_gain())?;
        }
        Ok(())
    }
}
