//! Solo manager (C7): process-wide coordinator enforcing solo-in-place
//! semantics across channels.
//!
//! Grounded in the teacher's `Mixer::has_solo`/`is_track_audible`
//! (`src/mixer/mod.rs`), generalized from a single `Mixer`'s in-memory
//! track list into a manager that channels register with explicitly (spec
//! §9: "provide an explicit ctor for tests to obtain isolated instances").

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// Anything the solo manager can recompute and notify. `Channel`
/// implements this directly; the manager holds members as
/// `Arc<dyn SoloMember>` so it never owns channel state outright (spec
/// §9's cyclic-reference note).
pub trait SoloMember: Send + Sync {
    /// Stable identity used for set membership; must be unique per
    /// registered member for the manager's lifetime.
    fn id(&self) -> u64;

    /// Called with the freshly recomputed `soloMuted` flag. Implementors
    /// must re-assert their effective volume from this, and must not
    /// call back into the `SoloManager` from within this method.
    fn set_solo_muted(&self, solo_muted: bool);
}

/// A cheap, cloneable handle the manager stores; equality/hash are by
/// identity only, so two refs to the same member compare equal.
#[derive(Clone)]
pub struct ChannelRef(pub Arc<dyn SoloMember>);

impl PartialEq for ChannelRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}
impl Eq for ChannelRef {}
impl Hash for ChannelRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

#[derive(Default)]
pub struct SoloManager {
    members: Mutex<HashMap<u64, ChannelRef>>,
    soloed: Mutex<HashSet<u64>>,
}

impl SoloManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, member: ChannelRef) {
        self.members.lock().unwrap().insert(member.0.id(), member);
        self.recompute();
    }

    pub fn unregister(&self, id: u64) {
        self.members.lock().unwrap().remove(&id);
        self.soloed.lock().unwrap().remove(&id);
        self.recompute();
    }

    pub fn set_solo(&self, id: u64, on: bool) {
        {
            let mut soloed = self.soloed.lock().unwrap();
            if on {
                soloed.insert(id);
            } else {
                soloed.remove(&id);
            }
        }
        self.recompute();
    }

    pub fn is_soloed(&self, id: u64) -> bool {
        self.soloed.lock().unwrap().contains(&id)
    }

    pub fn has_solo(&self) -> bool {
        !self.soloed.lock().unwrap().is_empty()
    }

    /// Recompute `soloMuted` for every registered member and notify each
    /// one, without holding either lock while the callback runs.
    fn recompute(&self) {
        let snapshot: Vec<ChannelRef> = self.members.lock().unwrap().values().cloned().collect();
        let soloed = self.soloed.lock().unwrap().clone();
        let has_solo = !soloed.is_empty();
        for member in snapshot {
            let id = member.0.id();
            let solo_muted = has_solo && !soloed.contains(&id);
            member.0.set_solo_muted(solo_muted);
        }
    }
}
