//! Object identities and the object → worker ownership table.

use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::DispatchError;

/// Category of a game object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Player,
    Entity,
    World,
    Plugin,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Player => "player",
            Self::Entity => "entity",
            Self::World => "world",
            Self::Plugin => "plugin",
        })
    }
}

/// A routable game object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId {
    pub kind: ObjectKind,
    pub id: u64,
}

impl ObjectId {
    pub const fn new(kind: ObjectKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub const fn player(id: u64) -> Self {
        Self::new(ObjectKind::Player, id)
    }

    pub const fn entity(id: u64) -> Self {
        Self::new(ObjectKind::Entity, id)
    }

    pub const fn world(id: u64) -> Self {
        Self::new(ObjectKind::World, id)
    }

    pub const fn plugin(id: u64) -> Self {
        Self::new(ObjectKind::Plugin, id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Index of a worker thread in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Ownership record for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Owned(WorkerId),
    /// `from` still executes messages queued before the hand-off barrier;
    /// new messages go to `to`, which holds them until activated.
    Transferring { from: WorkerId, to: WorkerId },
}

impl Affinity {
    /// Worker that newly routed messages should go to.
    pub fn route_target(&self) -> WorkerId {
        match *self {
            Self::Owned(worker) => worker,
            Self::Transferring { to, .. } => to,
        }
    }
}

/// Concurrent object → worker table.
#[derive(Debug, Default)]
pub struct AffinityTable {
    entries: DashMap<ObjectId, Affinity>,
}

impl AffinityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `object` to `worker`. An object has at most one owner.
    pub fn assign(&self, object: ObjectId, worker: WorkerId) -> Result<(), DispatchError> {
        match self.entries.entry(object) {
            Entry::Occupied(existing) => Err(DispatchError::AlreadyAssigned {
                object,
                owner: existing.get().route_target(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Affinity::Owned(worker));
                Ok(())
            }
        }
    }

    /// Forget `object`, returning its last record.
    pub fn release(&self, object: ObjectId) -> Option<Affinity> {
        self.entries.remove(&object).map(|(_, affinity)| affinity)
    }

    pub fn get(&self, object: ObjectId) -> Option<Affinity> {
        self.entries.get(&object).map(|entry| *entry)
    }

    /// Where new messages for `object` should go.
    pub fn owner(&self, object: ObjectId) -> Option<WorkerId> {
        self.get(object).map(|a| a.route_target())
    }

    /// Run `f` with the routing target while the entry is read-locked, so a
    /// concurrent [`begin_hand_off`](Self::begin_hand_off) is ordered
    /// entirely before or after it.
    pub(crate) fn with_route<R>(&self, object: ObjectId, f: impl FnOnce(WorkerId) -> R) -> Option<R> {
        self.entries
            .get(&object)
            .map(|entry| f(entry.route_target()))
    }

    /// Mark `object` as moving from `from` to `to`.
    pub fn begin_hand_off(
        &self,
        object: ObjectId,
        from: WorkerId,
        to: WorkerId,
    ) -> Result<(), DispatchError> {
        let mut entry = self
            .entries
            .get_mut(&object)
            .ok_or(DispatchError::Unassigned(object))?;
        match *entry {
            Affinity::Owned(owner) if owner == from => {
                if from != to {
                    *entry = Affinity::Transferring { from, to };
                }
                Ok(())
            }
            _ => Err(DispatchError::NotOwner {
                object,
                worker: from,
            }),
        }
    }

    /// Finish a transfer started by `from`; `to` becomes the sole owner.
    pub fn complete_hand_off(
        &self,
        object: ObjectId,
        from: WorkerId,
        to: WorkerId,
    ) -> Result<(), DispatchError> {
        let mut entry = self
            .entries
            .get_mut(&object)
            .ok_or(DispatchError::Unassigned(object))?;
        match *entry {
            Affinity::Transferring { from: f, to: t } if f == from && t == to => {
                *entry = Affinity::Owned(to);
                Ok(())
            }
            _ => Err(DispatchError::NotTransferring(object)),
        }
    }

    /// Objects whose records currently point at `worker` for new messages.
    pub fn owned_by(&self, worker: WorkerId) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|entry| entry.value().route_target() == worker)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W0: WorkerId = WorkerId(0);
    const W1: WorkerId = WorkerId(1);

    #[test]
    fn assign_once() {
        let table = AffinityTable::new();
        let p = ObjectId::player(1);
        table.assign(p, W0).unwrap();
        assert_eq!(table.owner(p), Some(W0));
        assert_eq!(
            table.assign(p, W1),
            Err(DispatchError::AlreadyAssigned {
                object: p,
                owner: W0
            })
        );
    }

    #[test]
    fn kinds_do_not_collide() {
        let table = AffinityTable::new();
        table.assign(ObjectId::player(7), W0).unwrap();
        table.assign(ObjectId::world(7), W1).unwrap();
        assert_eq!(table.owner(ObjectId::player(7)), Some(W0));
        assert_eq!(table.owner(ObjectId::world(7)), Some(W1));
        assert_eq!(table.owner(ObjectId::entity(7)), None);
    }

    #[test]
    fn release_forgets() {
        let table = AffinityTable::new();
        let e = ObjectId::entity(3);
        table.assign(e, W1).unwrap();
        assert_eq!(table.release(e), Some(Affinity::Owned(W1)));
        assert_eq!(table.owner(e), None);
        assert!(table.is_empty());
        table.assign(e, W0).unwrap();
    }

    #[test]
    fn hand_off_lifecycle() {
        let table = AffinityTable::new();
        let p = ObjectId::player(9);
        table.assign(p, W0).unwrap();

        assert_eq!(
            table.begin_hand_off(p, W1, W0),
            Err(DispatchError::NotOwner {
                object: p,
                worker: W1
            })
        );
        table.begin_hand_off(p, W0, W1).unwrap();
        assert_eq!(
            table.get(p),
            Some(Affinity::Transferring { from: W0, to: W1 })
        );
        // New messages already go to the destination.
        assert_eq!(table.owner(p), Some(W1));
        // A second hand-off cannot start mid-transfer.
        assert!(table.begin_hand_off(p, W0, W1).is_err());

        table.complete_hand_off(p, W0, W1).unwrap();
        assert_eq!(table.get(p), Some(Affinity::Owned(W1)));
        assert_eq!(
            table.complete_hand_off(p, W0, W1),
            Err(DispatchError::NotTransferring(p))
        );
    }

    #[test]
    fn hand_off_to_self_is_noop() {
        let table = AffinityTable::new();
        let p = ObjectId::player(2);
        table.assign(p, W0).unwrap();
        table.begin_hand_off(p, W0, W0).unwrap();
        assert_eq!(table.get(p), Some(Affinity::Owned(W0)));
    }

    #[test]
    fn hand_off_of_unknown_object() {
        let table = AffinityTable::new();
        let p = ObjectId::player(5);
        assert_eq!(
            table.begin_hand_off(p, W0, W1),
            Err(DispatchError::Unassigned(p))
        );
    }

    #[test]
    fn owned_by_lists_objects() {
        let table = AffinityTable::new();
        table.assign(ObjectId::world(0), W0).unwrap();
        table.assign(ObjectId::world(1), W1).unwrap();
        table.assign(ObjectId::player(1), W0).unwrap();
        let mut owned = table.owned_by(W0);
        owned.sort_by_key(|o| (o.kind as u8, o.id));
        assert_eq!(owned, vec![ObjectId::player(1), ObjectId::world(0)]);
    }

    #[test]
    fn display_forms() {
        assert_eq!(ObjectId::player(42).to_string(), "player#42");
        assert_eq!(WorkerId(3).to_string(), "worker-3");
    }
}
