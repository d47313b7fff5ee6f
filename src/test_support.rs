//! Test doubles for the external engine and plugin-provider contracts.
//!
//! Mirrors the teacher's `MockPluginLoader` pattern
//! (`plugin_host/loader.rs`): a trait plus a hand-written mock so the
//! routing/mixing logic is testable without a real render engine or real
//! plugin binaries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::engine::{AudioSpec, Engine, NodeId, UNCONNECTED_FORMAT};
use crate::error::MixError;
use crate::plugin::{FourCc, Plugin, ParamDescriptor, PluginInfo};
use crate::plugin::PluginProvider;

#[derive(Debug, Clone, Copy, Default)]
struct MixerNode {
    input_buses: u32,
    output_buses: u32,
    volumes: [f32; 8],
    pans: [f32; 8],
}

/// In-process fake of the external audio engine. Every node is just a
/// mixer with 8 addressable buses; connections are tracked as a simple
/// edge set so tests can assert on topology.
pub struct MockEngine {
    next_id: AtomicU64,
    nodes: Mutex<HashMap<u64, MixerNode>>,
    attached: Mutex<std::collections::HashSet<u64>>,
    edges: Mutex<std::collections::HashSet<(u64, u64, u32, u32)>>,
    edge_gain: Mutex<HashMap<(u64, u64, u32), f32>>,
    main_mixer: NodeId,
    attach_calls: AtomicU32,
    connect_calls: AtomicU32,
    spec: AudioSpec,
}

impl MockEngine {
    pub fn new() -> Self {
        let main_mixer = NodeId::from_raw(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            0,
            MixerNode {
                input_buses: 16,
                output_buses: 1,
                volumes: [1.0; 8],
                pans: [0.0; 8],
            },
        );
        let mut attached = std::collections::HashSet::new();
        attached.insert(0);
        Self {
            next_id: AtomicU64::new(1),
            nodes: Mutex::new(nodes),
            attached: Mutex::new(attached),
            edges: Mutex::new(std::collections::HashSet::new()),
            edge_gain: Mutex::new(HashMap::new()),
            main_mixer,
            attach_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            spec: AudioSpec {
                sample_rate: 48_000,
                channels: 2,
                buffer_size: 512,
            },
        }
    }

    pub fn attach_call_count(&self) -> u32 {
        self.attach_calls.load(Ordering::Relaxed)
    }

    pub fn connect_call_count(&self) -> u32 {
        self.connect_calls.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self, src: NodeId, dst: NodeId, src_bus: u32, dst_bus: u32) -> bool {
        self.edges
            .lock()
            .unwrap()
            .contains(&(src.raw(), dst.raw(), src_bus, dst_bus))
    }

    fn create_node(&self, input_buses: u32, output_buses: u32) -> NodeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.nodes.lock().unwrap().insert(
            id,
            MixerNode {
                input_buses,
                output_buses,
                volumes: [1.0; 8],
                pans: [0.0; 8],
            },
        );
        NodeId::from_raw(id)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    fn attach(&self, node: NodeId) -> Result<(), MixError> {
        self.attach_calls.fetch_add(1, Ordering::Relaxed);
        if !self.nodes.lock().unwrap().contains_key(&node.raw()) {
            return Err(MixError::NilRef);
        }
        self.attached.lock().unwrap().insert(node.raw());
        Ok(())
    }

    fn connect(&self, src: NodeId, dst: NodeId, src_bus: u32, dst_bus: u32) -> Result<(), MixError> {
        self.connect_calls.fetch_add(1, Ordering::Relaxed);
        if !self.attached.lock().unwrap().contains(&src.raw())
            || !self.attached.lock().unwrap().contains(&dst.raw())
        {
            return Err(MixError::EngineError("node not attached".into()));
        }
        self.edges
            .lock()
            .unwrap()
            .insert((src.raw(), dst.raw(), src_bus, dst_bus));
        Ok(())
    }

    fn disconnect_node_input(&self, node: NodeId, bus: u32) -> Result<(), MixError> {
        self.edges
            .lock()
            .unwrap()
            .retain(|&(_, d, _, db)| !(d == node.raw() && db == bus));
        Ok(())
    }

    fn disconnect_node_output(&self, node: NodeId, bus: u32) -> Result<(), MixError> {
        self.edges
            .lock()
            .unwrap()
            .retain(|&(s, _, sb, _)| !(s == node.raw() && sb == bus));
        Ok(())
    }

    fn main_mixer_node(&self) -> NodeId {
        self.main_mixer
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.attached.lock().unwrap().contains(&node.raw())
    }

    fn create_mixer(&self) -> Result<NodeId, MixError> {
        Ok(self.create_node(8, 1))
    }

    fn create_matrix_mixer(&self) -> Result<NodeId, MixError> {
        Ok(self.create_node(8, 8))
    }

    fn configure_matrix_invert(&self, _node: NodeId) -> Result<(), MixError> {
        Ok(())
    }

    fn input_bus_count(&self, node: NodeId) -> Result<u32, MixError> {
        self.nodes
            .lock()
            .unwrap()
            .get(&node.raw())
            .map(|n| n.input_buses)
            .ok_or(MixError::NilRef)
    }

    fn output_bus_count(&self, node: NodeId) -> Result<u32, MixError> {
        self.nodes
            .lock()
            .unwrap()
            .get(&node.raw())
            .map(|n| n.output_buses)
            .ok_or(MixError::NilRef)
    }

    fn input_format_for_bus(&self, node: NodeId, bus: u32) -> Result<AudioSpec, MixError> {
        if !self.nodes.lock().unwrap().contains_key(&node.raw()) {
            return Err(MixError::NilRef);
        }
        if !self.is_attached(node) {
            return Ok(UNCONNECTED_FORMAT);
        }
        let _ = bus;
        Ok(self.spec)
    }

    fn output_format_for_bus(&self, node: NodeId, bus: u32) -> Result<AudioSpec, MixError> {
        self.input_format_for_bus(node, bus)
    }

    fn set_mixer_volume(&self, node: NodeId, bus: u32, value: f32) -> Result<(), MixError> {
        let mut nodes = self.nodes.lock().unwrap();
        let n = nodes.get_mut(&node.raw()).ok_or(MixError::NilRef)?;
        n.volumes[bus as usize] = value;
        Ok(())
    }

    fn mixer_volume(&self, node: NodeId, bus: u32) -> Result<f32, MixError> {
        let nodes = self.nodes.lock().unwrap();
        let n = nodes.get(&node.raw()).ok_or(MixError::NilRef)?;
        Ok(n.volumes[bus as usize])
    }

    fn set_mixer_pan(&self, node: NodeId, bus: u32, value: f32) -> Result<(), MixError> {
        let mut nodes = self.nodes.lock().unwrap();
        let n = nodes.get_mut(&node.raw()).ok_or(MixError::NilRef)?;
        n.pans[bus as usize] = value;
        Ok(())
    }

    fn mixer_pan(&self, node: NodeId, bus: u32) -> Result<f32, MixError> {
        let nodes = self.nodes.lock().unwrap();
        let n = nodes.get(&node.raw()).ok_or(MixError::NilRef)?;
        Ok(n.pans[bus as usize])
    }

    fn set_connection_input_volume(
        &self,
        src: NodeId,
        dst: NodeId,
        dst_bus: u32,
        value: f32,
    ) -> Result<(), MixError> {
        self.edge_gain
            .lock()
            .unwrap()
            .insert((src.raw(), dst.raw(), dst_bus), value);
        Ok(())
    }

    fn connection_input_volume(&self, src: NodeId, dst: NodeId, dst_bus: u32) -> Result<f32, MixError> {
        self.edge_gain
            .lock()
            .unwrap()
            .get(&(src.raw(), dst.raw(), dst_bus))
            .copied()
            .ok_or_else(|| MixError::EngineError("unsupported: no per-edge gain recorded".into()))
    }

    fn release_mixer(&self, node: NodeId) -> Result<(), MixError> {
        self.attached.lock().unwrap().remove(&node.raw());
        self.nodes.lock().unwrap().remove(&node.raw());
        Ok(())
    }

    fn default_audio_spec(&self) -> AudioSpec {
        self.spec
    }
}

/// Fake plugin discovery/introspection provider (spec §6 "Plugin provider
/// contract"), analogous to the teacher's `MockPluginLoader`.
pub struct FakePluginProvider {
    infos: Vec<PluginInfo>,
}

impl FakePluginProvider {
    pub fn new() -> Self {
        Self { infos: Vec::new() }
    }

    /// Register a plugin with a single writable parameter at `address`,
    /// ranging `[min, max]`, defaulting to `default`.
    pub fn with_test_plugin(
        mut self,
        name: &str,
        four_cc: FourCc,
        address: u32,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        self.infos.push(PluginInfo {
            name: name.to_string(),
            kind: four_cc,
            subtype: four_cc,
            manufacturer_id: four_cc,
            category: "Effect".to_string(),
            params: vec![ParamDescriptor {
                address,
                display_name: "Amount".to_string(),
                min_value: min,
                max_value: max,
                default_value: default,
                is_writable: true,
            }],
        });
        self
    }
}

impl Default for FakePluginProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginProvider for FakePluginProvider {
    fn list(&self) -> Vec<PluginInfo> {
        self.infos.clone()
    }

    fn introspect(&self, info: &PluginInfo) -> Result<Plugin, MixError> {
        if !self.infos.iter().any(|p| p.name == info.name) {
            return Err(MixError::NotFound(info.name.clone()));
        }
        Ok(Plugin::from_info(info.clone()))
    }
}
