//! Plugin chain (C2): an ordered sequence of inserted effects sitting
//! between a channel's input and its mixer, rewired on every structural
//! change.
//!
//! Grounded in the teacher's `mixer/routing.rs` (ordered entity
//! management with explicit rebuild-on-change) and in
//! `other_examples/.../routing.rs`'s `RoutingGraph` (disconnect-then-
//! reconnect-adjacent-pairs rewiring after a topology edit).

use crate::dispatcher::{route_connect, route_disconnect_input, route_disconnect_output, Dispatcher};
use crate::engine::Engine;
use crate::error::MixError;
use crate::node::NodeHandle;
use crate::plugin::SharedPlugin;

/// One inserted effect: the native node doing the processing plus the
/// shared parameter-mirror descriptor for it.
pub struct Effect {
    node: NodeHandle,
    plugin: SharedPlugin,
}

impl Effect {
    pub fn new(node: NodeHandle, plugin: SharedPlugin) -> Self {
        Self { node, plugin }
    }

    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    pub fn plugin(&self) -> &SharedPlugin {
        &self.plugin
    }

    pub fn name(&self) -> String {
        self.plugin.lock().unwrap().name.clone()
    }
}

/// An ordered, reorderable list of inserts. Every structural mutation
/// (`add`/`insert`/`remove`/`clear`/`move`/`swap`) is followed by a full
/// rebuild of the chain's internal wiring so the engine graph always
/// matches `self.effects`'s order exactly (spec §4.2).
#[derive(Default)]
pub struct PluginChain {
    effects: Vec<Effect>,
    label: String,
}

impl PluginChain {
    pub fn new() -> Self {
        Self { effects: Vec::new(), label: String::new() }
    }

    /// Mirrors the owning channel's display name, per spec §4.4 ("setting
    /// either propagates the label to the owned chain").
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn count(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn effect_names(&self) -> Vec<String> {
        self.effects.iter().map(Effect::name).collect()
    }

    pub fn get_effect_at(&self, index: usize) -> Option<&Effect> {
        self.effects.get(index)
    }

    pub fn summary(&self) -> String {
        let body = if self.effects.is_empty() {
            "(empty)".to_string()
        } else {
            self.effect_names().join(" -> ")
        };
        if self.label.is_empty() {
            body
        } else {
            format!("{}: {}", self.label, body)
        }
    }

    /// The node a predecessor should connect its output into: the first
    /// effect's node if any, else `None` (caller should connect straight
    /// through to the channel mixer).
    pub fn input_node(&self) -> Option<&NodeHandle> {
        self.effects.first().map(Effect::node)
    }

    /// The node whose output should feed the channel mixer: the last
    /// effect's node if any, else `None`.
    pub fn output_node(&self) -> Option<&NodeHandle> {
        self.effects.last().map(Effect::node)
    }

    /// Spec §4.2's `getInputNode()`: errors rather than returning `None`
    /// when the chain is empty.
    pub fn get_input_node(&self) -> Result<&NodeHandle, MixError> {
        self.input_node().ok_or(MixError::NilRef)
    }

    /// Spec §4.2's `getOutputNode()`: errors rather than returning `None`
    /// when the chain is empty.
    pub fn get_output_node(&self) -> Result<&NodeHandle, MixError> {
        self.output_node().ok_or(MixError::NilRef)
    }

    pub fn add_effect(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        mut effect: Effect,
    ) -> Result<(), MixError> {
        effect.node.ensure_attached(engine)?;
        self.effects.push(effect);
        self.rebuild(engine, dispatcher)
    }

    pub fn insert_effect(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        index: usize,
        mut effect: Effect,
    ) -> Result<(), MixError> {
        if index > self.effects.len() {
            return Err(MixError::out_of_range(format!(
                "insert index {index} out of range (len {})",
                self.effects.len()
            )));
        }
        effect.node.ensure_attached(engine)?;
        self.effects.insert(index, effect);
        self.rebuild(engine, dispatcher)
    }

    pub fn remove_effect(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        index: usize,
    ) -> Result<Effect, MixError> {
        if index >= self.effects.len() {
            return Err(MixError::out_of_range(format!(
                "remove index {index} out of range (len {})",
                self.effects.len()
            )));
        }
        let mut removed = self.effects.remove(index);
        self.rebuild(engine, dispatcher)?;
        removed.node.release(engine)?;
        Ok(removed)
    }

    pub fn clear(&mut self, engine: &dyn Engine) -> Result<(), MixError> {
        let effects = std::mem::take(&mut self.effects);
        for mut effect in effects {
            effect.node.release(engine)?;
        }
        Ok(())
    }

    /// Move the effect at `from` to position `to`. Both indices are
    /// resolved against the list *before* removal, matching the
    /// "reorder a track" semantics users expect from drag-and-drop
    /// reordering: moving index 0 to index 2 in a 3-item chain makes it
    /// the new last element, not the new middle one (see DESIGN.md's
    /// note on this Open Question).
    pub fn move_effect(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        from: usize,
        to: usize,
    ) -> Result<(), MixError> {
        let len = self.effects.len();
        if from >= len || to >= len {
            return Err(MixError::out_of_range(format!(
                "move index out of range (len {len})"
            )));
        }
        if from == to {
            return Ok(());
        }
        let effect = self.effects.remove(from);
        self.effects.insert(to, effect);
        self.rebuild(engine, dispatcher)
    }

    pub fn swap_effects(
        &mut self,
        engine: &dyn Engine,
        dispatcher: Option<&Dispatcher>,
        a: usize,
        b: usize,
    ) -> Result<(), MixError> {
        let len = self.effects.len();
        if a >= len || b >= len {
            return Err(MixError::out_of_range(format!(
                "swap index out of range (len {len})"
            )));
        }
        self.effects.swap(a, b);
        self.rebuild(engine, dispatcher)
    }

    pub fn set_parameter(&self, index: usize, address: u32, value: f32) -> Result<(), MixError> {
        let effect = self
            .effects
            .get(index)
            .ok_or_else(|| MixError::out_of_range(format!("effect index {index} out of range")))?;
        effect.plugin.lock().unwrap().mirror_set(address, value)
    }

    pub fn get_parameter(&self, index: usize, address: u32) -> Result<f32, MixError> {
        let effect = self
            .effects
            .get(index)
            .ok_or_else(|| MixError::out_of_range(format!("effect index {index} out of range")))?;
        effect.plugin.lock().unwrap().mirror_get(address)
    }

    /// Disconnect every effect node's input/output, then reconnect them
    /// in order: `effects[i].output -> effects[i+1].input`. Stops and
    /// surfaces the first `RewireError` without attempting further
    /// connections, leaving the chain only partially wired — callers
    /// should treat a failed rebuild as requiring a fresh `clear`.
    fn rebuild(&mut self, engine: &dyn Engine, dispatcher: Option<&Dispatcher>) -> Result<(), MixError> {
        for effect in &mut self.effects {
            effect.node.ensure_attached(engine)?;
            route_disconnect_input(dispatcher, engine, effect.node.id(), 0)
                .map_err(|e| MixError::RewireError(e.to_string()))?;
            route_disconnect_output(dispatcher, engine, effect.node.id(), 0)
                .map_err(|e| MixError::RewireError(e.to_string()))?;
        }
        for pair in self.effects.windows(2) {
            let (src, dst) = (pair[0].node.id(), pair[1].node.id());
            if let Err(e) = route_connect(dispatcher, engine, src, dst, 0, 0) {
                log::error!(target: "mixcore::chain", "rebuild failed connecting adjacent effects: {e}");
                return Err(MixError::RewireError(e.to_string()));
            }
        }
        Ok(())
    }
}
