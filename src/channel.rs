//! Base channel (C4): the composition root of a mixer strip — insert
//! chain, fader/pan mixer, send table, meter taps, and bindings to the
//! solo manager.
//!
//! Grounded in the teacher's `MixerTrack`/`Mixer` (`src/mixer/mod.rs`)
//! for the volume/mute/solo surface, and its `Arc<Mutex<AudioState>>`
//! locking style (`src/audio/mod.rs`) for `routeMu`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::chain::{Effect, PluginChain};
use crate::dispatcher::Dispatcher;
use crate::engine::Engine;
use crate::error::MixError;
use crate::meter::MeterRegistry;
use crate::node::NodeHandle;
use crate::plugin::{Plugin, PluginInfo, PluginProvider, SharedPlugin};
use crate::send::{Send, SendMode};
use crate::solo::{ChannelRef, SoloManager, SoloMember};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Reserved send name for the auxiliary-send convenience surface
/// (spec §4.4 "Aux convenience").
pub const AUX_SEND_NAME: &str = "aux";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Input,
    Player,
    Unknown,
}

struct ChannelState {
    name: String,
    display_name: String,
    kind: ChannelKind,
    chain: PluginChain,
    mixer: NodeHandle,
    sends: HashMap<String, Send>,
    last_volume: f32,
    user_muted: bool,
    solo_muted: bool,
    connected_to_master: bool,
    released: bool,
    invert_enabled: bool,
    output_tap_key: Option<String>,
    send_tap_keys: HashMap<String, String>,
}

impl ChannelState {
    fn effective_volume(&self) -> f32 {
        if self.user_muted || self.solo_muted {
            0.0
        } else {
            self.last_volume
        }
    }
}

struct ChannelCore {
    id: u64,
    engine: Arc<dyn Engine>,
    dispatcher: Option<Arc<Dispatcher>>,
    solo: Arc<SoloManager>,
    meters: Arc<MeterRegistry>,
    state: Mutex<ChannelState>,
}

impl SoloMember for ChannelCore {
    fn id(&self) -> u64 {
        self.id
    }

    fn set_solo_muted(&self, solo_muted: bool) {
        let mut state = self.state.lock().unwrap();
        if state.released {
            return;
        }
        state.solo_muted = solo_muted;
        let gain = state.effective_volume();
        let bus = state.mixer.id();
        drop(state);
        if let Err(e) = self.engine.set_mixer_volume(bus, 0, gain) {
            log::error!(target: "mixcore::channel", "failed to apply solo-muted gain on channel {}: {e}", self.id);
        }
    }
}

/// A mixer strip. Cheap to clone — clones share the same underlying
/// state and solo-manager registration.
#[derive(Clone)]
pub struct Channel {
    core: Arc<ChannelCore>,
}

impl Channel {
    pub fn new(
        engine: Arc<dyn Engine>,
        dispatcher: Option<Arc<Dispatcher>>,
        solo: Arc<SoloManager>,
        meters: Arc<MeterRegistry>,
        name: impl Into<String>,
        kind: ChannelKind,
    ) -> Result<Self, MixError> {
        let mut mixer = crate::node::create_mixer(engine.as_ref())?;
        mixer.ensure_attached(engine.as_ref())?;
        let name = name.into();
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        let state = ChannelState {
            display_name: name.clone(),
            name,
            kind,
            chain: PluginChain::new(),
            mixer,
            sends: HashMap::new(),
            last_volume: 1.0,
            user_muted: false,
            solo_muted: false,
            connected_to_master: false,
            released: false,
            invert_enabled: false,
            output_tap_key: None,
            send_tap_keys: HashMap::new(),
        };
        let core = Arc::new(ChannelCore {
            id,
            engine,
            dispatcher,
            solo,
            meters,
            state: Mutex::new(state),
        });
        core.solo.register(ChannelRef(core.clone() as Arc<dyn SoloMember>));
        Ok(Channel { core })
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        self.core.state.lock().unwrap()
    }

    fn ensure_live(state: &ChannelState) -> Result<(), MixError> {
        if state.released {
            Err(MixError::Released)
        } else {
            Ok(())
        }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn kind(&self) -> ChannelKind {
        self.guard().kind
    }

    // --- Identity/labels -------------------------------------------------

    pub fn name(&self) -> String {
        self.guard().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        state.name = name.into();
        Ok(())
    }

    pub fn display_name(&self) -> String {
        self.guard().display_name.clone()
    }

    pub fn set_display_name(&self, name: impl Into<String>) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        let name = name.into();
        state.display_name = name.clone();
        state.chain.set_label(name);
        Ok(())
    }

    // --- Volume / mute / pan ----------------------------------------------

    pub fn set_volume(&self, value: f32) -> Result<(), MixError> {
        crate::engine::validate_volume(value)?;
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        if value > 0.0 {
            state.last_volume = value;
        }
        self.apply_effective_volume(&mut state)
    }

    pub fn volume(&self) -> Result<f32, MixError> {
        let state = self.guard();
        Self::ensure_live(&state)?;
        self.core.engine.mixer_volume(state.mixer.id(), 0)
    }

    /// Toggle `userMuted` and re-apply effective volume. When a
    /// dispatcher is bound, the change is a two-step ~2ms linear ramp
    /// (half-step, then target) to avoid clicks; otherwise it applies
    /// immediately.
    pub fn set_mute(&self, muted: bool) -> Result<(), MixError> {
        let (target, mixer_id, dispatcher) = {
            let mut state = self.guard();
            Self::ensure_live(&state)?;
            state.user_muted = muted;
            let target = state.effective_volume();
            (target, state.mixer.id(), self.core.dispatcher.clone())
        };

        match dispatcher {
            Some(d) => {
                let current = self.core.engine.mixer_volume(mixer_id, 0).unwrap_or(target);
                let half = (current + target) / 2.0;
                let engine = self.core.engine.clone();
                let engine2 = engine.clone();
                d.run(move |_| engine.set_mixer_volume(mixer_id, 0, half))?;
                std::thread::sleep(std::time::Duration::from_millis(1));
                d.run(move |_| engine2.set_mixer_volume(mixer_id, 0, target))?;
                Ok(())
            }
            None => self.core.engine.set_mixer_volume(mixer_id, 0, target),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.guard().user_muted
    }

    pub fn set_pan(&self, value: f32) -> Result<(), MixError> {
        crate::engine::validate_pan(value)?;
        let state = self.guard();
        Self::ensure_live(&state)?;
        self.core.engine.set_mixer_pan(state.mixer.id(), 0, value)
    }

    pub fn pan(&self) -> Result<f32, MixError> {
        let state = self.guard();
        Self::ensure_live(&state)?;
        self.core.engine.mixer_pan(state.mixer.id(), 0)
    }

    fn apply_effective_volume(&self, state: &mut ChannelState) -> Result<(), MixError> {
        let gain = state.effective_volume();
        self.core.engine.set_mixer_volume(state.mixer.id(), 0, gain)
    }

    /// Route a connect through the bound [`Dispatcher`] when one exists,
    /// else apply it directly. Topology changes are supposed to flow
    /// through the single-writer dispatcher (spec §4.3/§5); this is the
    /// seam `Channel`'s own routing operations use to honor that whenever
    /// a dispatcher is bound, while still working engine-direct for
    /// dispatcher-less construction (e.g. synchronous unit tests).
    fn dispatch_connect(&self, src: crate::engine::NodeId, dst: crate::engine::NodeId, src_bus: u32, dst_bus: u32) -> Result<(), MixError> {
        crate::dispatcher::route_connect(self.core.dispatcher.as_deref(), self.core.engine.as_ref(), src, dst, src_bus, dst_bus)
    }

    fn dispatch_disconnect_input(&self, node: crate::engine::NodeId, bus: u32) -> Result<(), MixError> {
        crate::dispatcher::route_disconnect_input(self.core.dispatcher.as_deref(), self.core.engine.as_ref(), node, bus)
    }

    // --- Inserts -----------------------------------------------------------

    pub fn add_effect(&self, node: NodeHandle, plugin: SharedPlugin) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        state.chain.add_effect(
            self.core.engine.as_ref(),
            self.core.dispatcher.as_deref(),
            Effect::new(node, plugin),
        )?;
        self.connect_plugin_chain_to_mixer(&mut state)
    }

    pub fn add_effect_from_plugin_info(
        &self,
        provider: &dyn PluginProvider,
        info: &PluginInfo,
    ) -> Result<(), MixError> {
        let plugin: Plugin = provider.introspect(info)?;
        let node = crate::node::create_mixer(self.core.engine.as_ref())?;
        self.add_effect(node, Arc::new(Mutex::new(plugin)))
    }

    /// Implements spec §4.4's connect-plugin-chain-to-mixer algorithm.
    fn connect_plugin_chain_to_mixer(&self, state: &mut ChannelState) -> Result<(), MixError> {
        if state.chain.is_empty() {
            return Ok(());
        }
        state.mixer.ensure_attached(self.core.engine.as_ref())?;
        let chain_output = state
            .chain
            .output_node()
            .ok_or(MixError::NilRef)?
            .id();
        let mixer_id = state.mixer.id();
        self.dispatch_disconnect_input(mixer_id, 0)?;
        self.dispatch_connect(chain_output, mixer_id, 0, 0)
    }

    // --- Routing -------------------------------------------------------

    pub fn connect_to_master(&self) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        if state.connected_to_master {
            return Ok(());
        }
        state.mixer.ensure_attached(self.core.engine.as_ref())?;
        let master = self.core.engine.main_mixer_node();
        let mixer_id = state.mixer.id();
        self.dispatch_connect(mixer_id, master, 0, 0)?;
        state.connected_to_master = true;
        Ok(())
    }

    pub fn disconnect_from_master(&self) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        if !state.connected_to_master {
            return Ok(());
        }
        let master = self.core.engine.main_mixer_node();
        self.dispatch_disconnect_input(master, 0)?;
        state.connected_to_master = false;
        Ok(())
    }

    pub fn is_connected_to_master(&self) -> bool {
        self.guard().connected_to_master
    }

    /// Route this channel's output into `bus` at an auto-allocated input
    /// index. `Bus::connect_channel` always reads bus 0 off the channel
    /// mixer and allocates its own destination index (spec §4.5), so
    /// there is no `fromBus`/`toBus` pair to honor here.
    pub fn connect_to_bus(&self, bus: &mut crate::bus::Bus) -> Result<u32, MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        state.mixer.ensure_attached(self.core.engine.as_ref())?;
        bus.connect_channel(self.core.engine.as_ref(), self.core.dispatcher.as_deref(), &mut state.mixer)
    }

    // --- Sends -----------------------------------------------------------

    pub fn create_send(&self, name: &str, level: f32) -> Result<(), MixError> {
        self.create_send_with_mode(name, level, SendMode::PostFader)
    }

    pub fn create_send_with_mode(&self, name: &str, level: f32, mode: SendMode) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        if state.sends.contains_key(name) {
            return Err(MixError::Conflict(format!("send {name} already exists")));
        }
        state.sends.insert(name.to_string(), Send::new(name, mode, level));
        Ok(())
    }

    pub fn connect_send_to_bus(
        &self,
        name: &str,
        bus_mixer_id: crate::engine::NodeId,
        to_bus: u32,
    ) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        let mode = state
            .sends
            .get(name)
            .map(Send::mode)
            .ok_or_else(|| MixError::NotFound(name.to_string()))?;
        let source = {
            let chain_output = state.chain.output_node().cloned_handle();
            Send::select_source(mode, &state.mixer, chain_output.as_ref())
        };
        let engine = self.core.engine.clone();
        let dispatcher = self.core.dispatcher.clone();
        let send = state.sends.get_mut(name).ok_or_else(|| MixError::NotFound(name.to_string()))?;
        send.connect(engine.as_ref(), dispatcher.as_deref(), source, bus_mixer_id, to_bus)
    }

    pub fn create_and_connect_send(
        &self,
        name: &str,
        level: f32,
        mode: SendMode,
        bus_mixer_id: crate::engine::NodeId,
        to_bus: u32,
    ) -> Result<(), MixError> {
        self.create_send_with_mode(name, level, mode)?;
        self.connect_send_to_bus(name, bus_mixer_id, to_bus)
    }

    /// Connect a send to `bus`, auto-allocating its input index (spec
    /// §4.4 `connectSendTo(send,bus)`), rather than requiring the caller
    /// to pick one via [`Channel::connect_send_to_bus`].
    pub fn connect_send_to(&self, name: &str, bus: &mut crate::bus::Bus) -> Result<(), MixError> {
        let index = bus.allocate_input_index();
        self.connect_send_to_bus(name, bus.mixer().id(), index)?;
        let gain_id = {
            let state = self.guard();
            state
                .sends
                .get(name)
                .and_then(Send::gain_mixer)
                .ok_or_else(|| MixError::NotFound(format!("send {name} not wired")))?
                .id()
        };
        bus.record_input(index, gain_id);
        Ok(())
    }

    pub fn disconnect_send(&self, name: &str) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        let engine = self.core.engine.clone();
        let dispatcher = self.core.dispatcher.clone();
        let send = state.sends.get_mut(name).ok_or_else(|| MixError::NotFound(name.to_string()))?;
        send.disconnect(engine.as_ref(), dispatcher.as_deref())
    }

    pub fn remove_send(&self, name: &str) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        let engine = self.core.engine.clone();
        let dispatcher = self.core.dispatcher.clone();
        if let Some(mut send) = state.sends.remove(name) {
            send.disconnect(engine.as_ref(), dispatcher.as_deref())?;
        }
        Ok(())
    }

    pub fn set_send_level(&self, name: &str, level: f32) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        let engine = self.core.engine.clone();
        let send = state.sends.get_mut(name).ok_or_else(|| MixError::NotFound(name.to_string()))?;
        send.set_level(engine.as_ref(), level)
    }

    pub fn get_send_level(&self, name: &str) -> Result<f32, MixError> {
        let state = self.guard();
        Self::ensure_live(&state)?;
        state
            .sends
            .get(name)
            .map(Send::level)
            .ok_or_else(|| MixError::NotFound(name.to_string()))
    }

    pub fn set_send_mute(&self, name: &str, mute: bool) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        let engine = self.core.engine.clone();
        let send = state.sends.get_mut(name).ok_or_else(|| MixError::NotFound(name.to_string()))?;
        send.set_mute(engine.as_ref(), mute)
    }

    pub fn get_send_mute(&self, name: &str) -> Result<bool, MixError> {
        let state = self.guard();
        Self::ensure_live(&state)?;
        state
            .sends
            .get(name)
            .map(Send::is_muted)
            .ok_or_else(|| MixError::NotFound(name.to_string()))
    }

    pub fn send_names(&self) -> Vec<String> {
        self.guard().sends.keys().cloned().collect()
    }

    // --- Aux convenience -------------------------------------------------

    pub fn create_aux_send(&self, level: f32) -> Result<(), MixError> {
        {
            let state = self.guard();
            if state.kind != ChannelKind::Input {
                return Err(MixError::Conflict("aux sends are only permitted on Input channels".into()));
            }
        }
        self.create_send_with_mode(AUX_SEND_NAME, level, SendMode::PostFader)
    }

    /// Auto-allocates an input on `bus` for the reserved "aux" send (spec
    /// §4.4 `connectAux(aux)`).
    pub fn connect_aux(&self, bus: &mut crate::bus::Bus) -> Result<(), MixError> {
        self.connect_send_to(AUX_SEND_NAME, bus)
    }

    /// Connects the reserved "aux" send to an explicit bus input, for
    /// callers that already manage their own index allocation.
    pub fn connect_aux_to_bus(&self, bus_mixer_id: crate::engine::NodeId, to_bus: u32) -> Result<(), MixError> {
        self.connect_send_to_bus(AUX_SEND_NAME, bus_mixer_id, to_bus)
    }

    pub fn set_aux_send_level(&self, level: f32) -> Result<(), MixError> {
        self.set_send_level(AUX_SEND_NAME, level)
    }

    pub fn disconnect_aux(&self) -> Result<(), MixError> {
        self.disconnect_send(AUX_SEND_NAME)
    }

    // --- Metering ----------------------------------------------------------

    pub fn enable_output_metering(&self, on: bool) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        if on {
            if state.output_tap_key.is_none() {
                let key = format!("channel-{}-out", self.core.id);
                let spec = self.core.engine.default_audio_spec();
                self.core
                    .meters
                    .install(&key, state.mixer.id(), 0, spec.sample_rate, spec.channels)?;
                state.output_tap_key = Some(key);
            }
        } else if let Some(key) = state.output_tap_key.take() {
            self.core.meters.remove(&key);
        }
        Ok(())
    }

    pub fn output_rms(&self) -> Result<f32, MixError> {
        let state = self.guard();
        let key = state.output_tap_key.as_ref().ok_or(MixError::NotFound("output meter not enabled".into()))?;
        let tap = self.core.meters.get(key).ok_or_else(|| MixError::NotFound(key.clone()))?;
        Ok(tap.rms())
    }

    pub fn enable_send_metering(&self, name: &str, on: bool) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        if !state.sends.contains_key(name) {
            return Err(MixError::NotFound(name.to_string()));
        }
        if on {
            if !state.send_tap_keys.contains_key(name) {
                let gain_id = state
                    .sends
                    .get(name)
                    .and_then(Send::gain_mixer)
                    .ok_or_else(|| MixError::NotFound(format!("send {name} not wired")))?
                    .id();
                let key = format!("channel-{}-send-{}", self.core.id, name);
                let spec = self.core.engine.default_audio_spec();
                self.core.meters.install(&key, gain_id, 0, spec.sample_rate, spec.channels)?;
                state.send_tap_keys.insert(name.to_string(), key);
            }
        } else if let Some(key) = state.send_tap_keys.remove(name) {
            self.core.meters.remove(&key);
        }
        Ok(())
    }

    pub fn send_rms(&self, name: &str) -> Result<f32, MixError> {
        let state = self.guard();
        let key = state
            .send_tap_keys
            .get(name)
            .ok_or_else(|| MixError::NotFound(format!("send {name} metering not enabled")))?;
        let tap = self.core.meters.get(key).ok_or_else(|| MixError::NotFound(key.clone()))?;
        Ok(tap.rms())
    }

    // --- Solo --------------------------------------------------------------

    pub fn set_solo(&self, on: bool) {
        self.core.solo.set_solo(self.core.id, on);
    }

    pub fn is_soloed(&self) -> bool {
        self.core.solo.is_soloed(self.core.id)
    }

    // --- Lifecycle -----------------------------------------------------

    /// Idempotent teardown. `solo.unregister` triggers a `recompute()` that
    /// locks every other registered channel's state in turn, so it must
    /// not run while this channel's own guard is held — two channels
    /// releasing concurrently would otherwise each hold their own guard
    /// and wait on the other's, deadlocking. Claim `released` and drop the
    /// guard first; the rest of teardown re-acquires it.
    pub fn release(&self) -> Result<(), MixError> {
        {
            let mut state = self.guard();
            if state.released {
                return Ok(());
            }
            state.released = true;
        }
        self.core.solo.unregister(self.core.id);

        let mut state = self.guard();
        if let Some(key) = state.output_tap_key.take() {
            self.core.meters.remove(&key);
        }
        for key in state.send_tap_keys.values() {
            self.core.meters.remove(key);
        }
        state.send_tap_keys.clear();
        let names: Vec<String> = state.sends.keys().cloned().collect();
        for name in names {
            if let Some(mut send) = state.sends.remove(&name) {
                let _ = send.disconnect(self.core.engine.as_ref(), self.core.dispatcher.as_deref());
            }
        }
        state.chain.clear(self.core.engine.as_ref())?;
        state.mixer.release(self.core.engine.as_ref())
    }

    pub fn is_released(&self) -> bool {
        self.guard().released
    }

    pub fn summary(&self) -> String {
        let state = self.guard();
        format!(
            "{} [{} effects, {} sends]",
            state.name,
            state.chain.count(),
            state.sends.len()
        )
    }

    /// Reserved placeholder for the phase-invert stage (spec §9): the
    /// wiring contract (rewire through a placeholder when enabled,
    /// direct otherwise) is fixed by the spec, but the DSP itself is out
    /// of scope. Flipping this flag only records intent.
    pub fn set_invert_enabled(&self, enabled: bool) -> Result<(), MixError> {
        let mut state = self.guard();
        Self::ensure_live(&state)?;
        state.invert_enabled = enabled;
        Ok(())
    }

    pub fn is_invert_enabled(&self) -> bool {
        self.guard().invert_enabled
    }
}

trait OptionNodeHandleExt {
    fn cloned_handle(self) -> Option<NodeHandle>;
}

impl OptionNodeHandleExt for Option<&NodeHandle> {
    fn cloned_handle(self) -> Option<NodeHandle> {
        self.cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::FourCc;
    use crate::test_support::MockEngine;

    fn new_channel(engine: Arc<dyn Engine>, solo: Arc<SoloManager>, name: &str) -> Channel {
        let meters = Arc::new(MeterRegistry::new());
        Channel::new(engine, None, solo, meters, name, ChannelKind::Input).unwrap()
    }

    #[test]
    fn construct_and_route_scenario() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let lead = new_channel(engine.clone(), solo, "Lead");

        lead.connect_to_master().unwrap();
        assert!(lead.is_connected_to_master());

        lead.connect_to_master().unwrap();
        assert!(lead.is_connected_to_master());

        lead.disconnect_from_master().unwrap();
        assert!(!lead.is_connected_to_master());
    }

    #[test]
    fn volume_mute_roundtrip() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let ch = new_channel(engine, solo, "A");

        ch.set_volume(0.8).unwrap();
        assert_eq!(ch.volume().unwrap(), 0.8);

        ch.set_mute(true).unwrap();
        assert_eq!(ch.volume().unwrap(), 0.0);

        ch.set_mute(false).unwrap();
        assert_eq!(ch.volume().unwrap(), 0.8);
    }

    #[test]
    fn solo_arithmetic_across_channels() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let x = new_channel(engine.clone(), solo.clone(), "X");
        let y = new_channel(engine.clone(), solo.clone(), "Y");
        let z = new_channel(engine.clone(), solo.clone(), "Z");
        for c in [&x, &y, &z] {
            c.set_volume(0.8).unwrap();
        }

        y.set_solo(true);
        assert_eq!(x.volume().unwrap(), 0.0);
        assert_eq!(y.volume().unwrap(), 0.8);
        assert_eq!(z.volume().unwrap(), 0.0);

        z.set_solo(true);
        assert_eq!(x.volume().unwrap(), 0.0);
        assert_eq!(y.volume().unwrap(), 0.8);
        assert_eq!(z.volume().unwrap(), 0.8);

        y.set_solo(false);
        z.set_solo(false);
        assert_eq!(x.volume().unwrap(), 0.8);
        assert_eq!(y.volume().unwrap(), 0.8);
        assert_eq!(z.volume().unwrap(), 0.8);
    }

    #[test]
    fn sends_pre_post_fader_scenario() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let ch = new_channel(engine.clone(), solo, "Ch");

        let node = crate::node::create_mixer(engine.as_ref()).unwrap();
        let info = PluginInfo {
            name: "Insert".into(),
            kind: FourCc::from_str("tEst").unwrap(),
            subtype: FourCc::from_str("tEst").unwrap(),
            manufacturer_id: FourCc::from_str("mfgX").unwrap(),
            category: "Effect".into(),
            params: vec![],
        };
        let plugin = Arc::new(Mutex::new(Plugin::from_info(info)));
        ch.add_effect(node, plugin).unwrap();

        let bus_mixer = crate::node::create_mixer(engine.as_ref()).unwrap();
        let mut bus_mixer = bus_mixer;
        bus_mixer.ensure_attached(engine.as_ref()).unwrap();

        ch.create_send_with_mode("pre", 1.0, SendMode::PreFader).unwrap();
        ch.create_send_with_mode("post", 1.0, SendMode::PostFader).unwrap();
        ch.connect_send_to_bus("pre", bus_mixer.id(), 0).unwrap();
        ch.connect_send_to_bus("post", bus_mixer.id(), 1).unwrap();

        assert_eq!(ch.get_send_level("pre").unwrap(), 1.0);
        assert_eq!(ch.get_send_level("post").unwrap(), 1.0);

        ch.set_send_mute("pre", true).unwrap();
        assert!(ch.get_send_mute("pre").unwrap());

        ch.set_send_mute("pre", false).unwrap();
        assert!(!ch.get_send_mute("pre").unwrap());
    }

    #[test]
    fn connect_send_to_auto_allocates_bus_input() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let ch = new_channel(engine.clone(), solo, "Ch");
        let mut bus = crate::bus::Bus::new(engine.as_ref(), "Reverb").unwrap();

        ch.create_send_with_mode("verb", 0.5, SendMode::PostFader).unwrap();
        ch.connect_send_to("verb", &mut bus).unwrap();

        assert_eq!(ch.get_send_level("verb").unwrap(), 0.5);
        // A second send auto-allocates the next input, not index 0 again.
        ch.create_send_with_mode("verb2", 0.25, SendMode::PostFader).unwrap();
        ch.connect_send_to("verb2", &mut bus).unwrap();
        assert_eq!(ch.get_send_level("verb2").unwrap(), 0.25);
    }

    #[test]
    fn aux_send_is_input_only_and_auto_allocates() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let input_ch = new_channel(engine.clone(), solo.clone(), "In");
        let player_ch = Channel::new(
            engine.clone(),
            None,
            solo,
            Arc::new(MeterRegistry::new()),
            "Player",
            ChannelKind::Player,
        )
        .unwrap();
        let mut bus = crate::bus::Bus::new(engine.as_ref(), "Aux").unwrap();

        assert!(matches!(
            player_ch.create_aux_send(1.0),
            Err(MixError::Conflict(_))
        ));

        input_ch.create_aux_send(1.0).unwrap();
        input_ch.connect_aux(&mut bus).unwrap();
        assert_eq!(input_ch.get_send_level(AUX_SEND_NAME).unwrap(), 1.0);

        input_ch.set_aux_send_level(0.3).unwrap();
        assert_eq!(input_ch.get_send_level(AUX_SEND_NAME).unwrap(), 0.3);

        input_ch.disconnect_aux().unwrap();
    }

    #[test]
    fn connect_to_master_routes_through_bound_dispatcher() {
        use crate::dispatcher::{Dispatcher, MIN_QUEUE_CAPACITY};

        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let (dispatcher, worker) = Dispatcher::new(MIN_QUEUE_CAPACITY);
        let handle = worker.spawn(engine.clone(), dispatcher.clone());
        let solo = Arc::new(SoloManager::new());
        let meters = Arc::new(MeterRegistry::new());
        let ch = Channel::new(
            engine,
            Some(Arc::new(dispatcher.clone())),
            solo,
            meters,
            "Lead",
            ChannelKind::Input,
        )
        .unwrap();

        ch.connect_to_master().unwrap();
        assert!(ch.is_connected_to_master());
        ch.disconnect_from_master().unwrap();
        assert!(!ch.is_connected_to_master());

        dispatcher.close();
        handle.join().unwrap();
    }

    #[test]
    fn release_is_idempotent_and_terminal() {
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::new());
        let solo = Arc::new(SoloManager::new());
        let ch = new_channel(engine, solo, "Doomed");
        ch.release().unwrap();
        ch.release().unwrap();
        assert!(matches!(ch.set_volume(0.5), Err(MixError::Released)));
    }
}
