//! Plugin descriptor and parameter mirror (spec §3, §6).
//!
//! Plugin discovery/introspection and the concrete effect DSP are external
//! collaborators (spec §1); this module only defines the shapes the core
//! needs to carry a plugin's identity and a mutable mirror of its
//! parameter values.

use std::sync::{Arc, Mutex};

use crate::error::MixError;

/// A four-character code packed MSB-first into a 32-bit identifier, used
/// to identify plugin type/subtype/manufacturer (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(u32);

impl FourCc {
    pub fn pack(bytes: [u8; 4]) -> Self {
        FourCc(
            (bytes[0] as u32) << 24
                | (bytes[1] as u32) << 16
                | (bytes[2] as u32) << 8
                | (bytes[3] as u32),
        )
    }

    /// Pack from a 4-byte ASCII string. Returns `None` if `s` is not
    /// exactly 4 bytes.
    pub fn from_str(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return None;
        }
        Some(Self::pack([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// One parameter exposed by a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub address: u32,
    pub display_name: String,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    pub is_writable: bool,
}

/// Static plugin identity as returned by discovery, before introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInfo {
    pub name: String,
    pub kind: FourCc,
    pub subtype: FourCc,
    pub manufacturer_id: FourCc,
    pub category: String,
    pub params: Vec<ParamDescriptor>,
}

/// One parameter's live mirror: identity plus the last value observed
/// from (or written to) the native effect.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamState {
    pub descriptor: ParamDescriptor,
    pub current_value: f32,
}

/// Immutable identity plus a mutable mirror of parameter values, shared
/// by reference between a `Channel`'s chain and the `Effect` entry that
/// owns the native node (spec §3(d), §9).
#[derive(Debug, Clone)]
pub struct Plugin {
    pub name: String,
    pub kind: FourCc,
    pub subtype: FourCc,
    pub manufacturer_id: FourCc,
    pub category: String,
    pub parameters: Vec<ParamState>,
}

impl Plugin {
    pub fn from_info(info: PluginInfo) -> Self {
        let parameters = info
            .params
            .iter()
            .map(|d| ParamState {
                descriptor: d.clone(),
                current_value: d.default_value,
            })
            .collect();
        Plugin {
            name: info.name,
            kind: info.kind,
            subtype: info.subtype,
            manufacturer_id: info.manufacturer_id,
            category: info.category,
            parameters,
        }
    }

    pub fn param_index(&self, address: u32) -> Option<usize> {
        self.parameters.iter().position(|p| p.descriptor.address == address)
    }

    /// Mirror a value written to (or read from) the native effect, after
    /// clamping to the descriptor's range.
    pub fn mirror_set(&mut self, address: u32, value: f32) -> Result<(), MixError> {
        let idx = self
            .param_index(address)
            .ok_or_else(|| MixError::NotFound(format!("param address {address}")))?;
        let d = &self.parameters[idx].descriptor;
        let clamped = value.clamp(d.min_value, d.max_value);
        self.parameters[idx].current_value = clamped;
        Ok(())
    }

    pub fn mirror_get(&self, address: u32) -> Result<f32, MixError> {
        let idx = self
            .param_index(address)
            .ok_or_else(|| MixError::NotFound(format!("param address {address}")))?;
        Ok(self.parameters[idx].current_value)
    }
}

/// Shared, ref-counted, lock-guarded plugin descriptor — the concrete
/// representation of "shared ownership" from spec §3(d).
pub type SharedPlugin = Arc<Mutex<Plugin>>;

/// Plugin discovery/introspection provider (spec §6). The concrete
/// implementation (scanning a plugin format on disk) is out of scope;
/// only the contract lives here.
pub trait PluginProvider: Send + Sync {
    fn list(&self) -> Vec<PluginInfo>;
    fn introspect(&self, info: &PluginInfo) -> Result<Plugin, MixError>;

    fn by_type(&self, kind: FourCc) -> Vec<PluginInfo> {
        self.list().into_iter().filter(|p| p.kind == kind).collect()
    }

    fn by_manufacturer(&self, manufacturer_id: FourCc) -> Vec<PluginInfo> {
        self.list()
            .into_iter()
            .filter(|p| p.manufacturer_id == manufacturer_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_cc_packs_msb_first() {
        let code = FourCc::from_str("abcd").unwrap();
        assert_eq!(code.as_u32(), 0x61626364);
    }

    #[test]
    fn four_cc_rejects_wrong_length() {
        assert!(FourCc::from_str("ab").is_none());
        assert!(FourCc::from_str("abcde").is_none());
    }

    #[test]
    fn mirror_set_clamps_and_reads_back() {
        let info = PluginInfo {
            name: "Test".into(),
            kind: FourCc::from_str("tEst").unwrap(),
            subtype: FourCc::from_str("tEst").unwrap(),
            manufacturer_id: FourCc::from_str("mfgX").unwrap(),
            category: "Effect".into(),
            params: vec![ParamDescriptor {
                address: 42,
                display_name: "Amount".into(),
                min_value: 100.0,
                max_value: 5000.0,
                default_value: 100.0,
                is_writable: true,
            }],
        };
        let mut plugin = Plugin::from_info(info);
        plugin.mirror_set(42, 2500.0).unwrap();
        assert_eq!(plugin.mirror_get(42).unwrap(), 2500.0);

        plugin.mirror_set(42, 9999.0).unwrap();
        assert_eq!(plugin.mirror_get(42).unwrap(), 5000.0);
    }

    #[test]
    fn mirror_unknown_address_is_not_found() {
        let plugin = Plugin::from_info(PluginInfo {
            name: "Test".into(),
            kind: FourCc::from_str("tEst").unwrap(),
            subtype: FourCc::from_str("tEst").unwrap(),
            manufacturer_id: FourCc::from_str("mfgX").unwrap(),
            category: "Effect".into(),
            params: vec![],
        });
        assert!(matches!(plugin.mirror_get(1), Err(MixError::NotFound(_))));
    }
}
