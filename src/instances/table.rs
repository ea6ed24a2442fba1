//! CPU-side instance table bookkeeping.

use super::{InstanceData, InstanceError, InstanceSlot};
use crate::core::Id;
use crate::math::Matrix4;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A growable table of instance slots for one mesh.
///
/// Released indices sit in a min-heap so an attach always claims the lowest
/// free slot, keeping the occupied region dense at the front of the table.
/// `max_instance_index` bounds the range the culling stage has to scan, so
/// per-frame GPU work tracks the live population rather than the historical
/// peak.
pub struct InstanceTable {
    mesh: Id,
    data: Vec<InstanceData>,
    owners: Vec<Option<Id>>,
    free: BinaryHeap<Reverse<u32>>,
    live_count: u32,
    max_instance_index: u32,
}

impl InstanceTable {
    /// Create a table with the given starting capacity (at least 1 slot).
    pub fn new(mesh: Id, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            mesh,
            data: vec![InstanceData::default(); capacity as usize],
            owners: vec![None; capacity as usize],
            free: (0..capacity).map(Reverse).collect(),
            live_count: 0,
            max_instance_index: 0,
        }
    }

    /// The mesh this table belongs to.
    #[inline]
    pub fn mesh(&self) -> Id {
        self.mesh
    }

    /// Current slot capacity.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    /// Number of attached instances.
    #[inline]
    pub fn live_count(&self) -> u32 {
        self.live_count
    }

    /// Highest slot index ever attached and not since vacated; the culling
    /// and draw stages never read past it.
    #[inline]
    pub fn max_instance_index(&self) -> u32 {
        self.max_instance_index
    }

    /// The lowest currently free slot, if any.
    #[inline]
    pub fn lowest_free_index(&self) -> Option<u32> {
        self.free.peek().map(|Reverse(i)| *i)
    }

    /// All records, for mirror upload.
    #[inline]
    pub fn records(&self) -> &[InstanceData] {
        &self.data
    }

    /// One record, for mirror write-through.
    #[inline]
    pub fn record(&self, slot: u32) -> &InstanceData {
        &self.data[slot as usize]
    }

    /// Claim a slot for an owner, growing the table if it is full.
    /// Returns the slot and whether the capacity changed (the GPU mirror
    /// must be reallocated when it did).
    pub fn attach(&mut self, owner: Id, world: &Matrix4) -> (InstanceSlot, bool) {
        let (slot, grown) = match self.free.pop() {
            Some(Reverse(slot)) => (slot, false),
            // A full table doubles; the first new slot is taken directly.
            None => (self.grow(), true),
        };

        if slot > self.max_instance_index {
            self.max_instance_index = slot;
        }
        self.data[slot as usize] = InstanceData::new(owner, world);
        self.owners[slot as usize] = Some(owner);
        self.live_count += 1;

        (InstanceSlot::new(slot), grown)
    }

    /// Release a slot previously claimed by `owner`.
    ///
    /// A slot that is out of range, already free, or held by a different
    /// entity is an internal-consistency violation and is reported, never
    /// ignored.
    pub fn detach(&mut self, owner: Id, slot: InstanceSlot) -> Result<(), InstanceError> {
        let index = slot.index();
        let held = index < self.capacity() && self.owners[index as usize] == Some(owner);
        if !held {
            return Err(InstanceError::SlotNotOwned {
                mesh: self.mesh,
                owner,
                slot: index,
            });
        }

        self.data[index as usize].live = 0;
        self.owners[index as usize] = None;
        self.free.push(Reverse(index));
        self.live_count -= 1;

        if index == self.max_instance_index {
            self.shrink_high_water();
        }
        Ok(())
    }

    /// Overwrite the transform of a live slot.
    pub fn write_transform(
        &mut self,
        owner: Id,
        slot: InstanceSlot,
        world: &Matrix4,
    ) -> Result<(), InstanceError> {
        let index = slot.index();
        let held = index < self.capacity() && self.owners[index as usize] == Some(owner);
        if !held {
            return Err(InstanceError::SlotNotOwned {
                mesh: self.mesh,
                owner,
                slot: index,
            });
        }
        self.data[index as usize].transform = world.transposed().to_cols_array_2d();
        Ok(())
    }

    /// Double the table, returning the lowest newly added slot. The other
    /// new slots join the free-list.
    fn grow(&mut self) -> u32 {
        let old = self.capacity();
        let new = old * 2;
        self.data.resize(new as usize, InstanceData::default());
        self.owners.resize(new as usize, None);
        for slot in old + 1..new {
            self.free.push(Reverse(slot));
        }
        old
    }

    /// Walk the high-water mark back to the highest occupied slot.
    fn shrink_high_water(&mut self) {
        let mut index = self.max_instance_index;
        while index > 0 && self.owners[index as usize].is_none() {
            index -= 1;
        }
        self.max_instance_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(capacity: u32) -> InstanceTable {
        InstanceTable::new(Id::new(), capacity)
    }

    fn attach(t: &mut InstanceTable, owner: Id) -> InstanceSlot {
        t.attach(owner, &Matrix4::IDENTITY).0
    }

    #[test]
    fn test_basic_reuse() {
        let mut t = table(8);
        let owner = Id::new();
        let s0 = attach(&mut t, owner);
        let s1 = attach(&mut t, owner);
        let s2 = attach(&mut t, owner);
        assert_eq!((s0.index(), s1.index(), s2.index()), (0, 1, 2));

        t.detach(owner, s1).unwrap();
        assert_eq!(t.max_instance_index(), 2);

        // The freed middle slot is reclaimed before anything beyond it.
        let again = attach(&mut t, owner);
        assert_eq!(again.index(), 1);
        assert_eq!(t.max_instance_index(), 2);
    }

    #[test]
    fn test_growth_preserves_records() {
        let mut t = table(4);
        let owner = Id::new();
        let mut slots = Vec::new();
        for i in 0..5u32 {
            let world = Matrix4::from_translation(&crate::math::Vector3::new(i as f32, 0.0, 0.0));
            let (slot, grown) = t.attach(owner, &world);
            assert_eq!(grown, i == 4);
            slots.push(slot);
        }

        assert_eq!(t.capacity(), 8);
        assert_eq!(slots[4].index(), 4);
        for (i, slot) in slots.iter().enumerate() {
            // Translation lands in the last column, row 3 after transposition.
            let record = t.record(slot.index());
            assert_eq!(record.transform[0][3], i as f32);
            assert_eq!(record.live, 1);
        }
    }

    #[test]
    fn test_capacity_growth_bound() {
        // 30 attach/detach pairs with at most 5 simultaneously live must
        // never push capacity past the first doubling that fits 5.
        let mut t = table(4);
        let owner = Id::new();
        let mut live = Vec::new();
        for round in 0..30 {
            if live.len() == 5 {
                let slot = live.remove(round % live.len());
                t.detach(owner, slot).unwrap();
            }
            live.push(attach(&mut t, owner));
        }
        assert_eq!(t.capacity(), 8);
        assert!(t.max_instance_index() <= 5);
    }

    #[test]
    fn test_occupied_prefix_invariant() {
        let mut t = table(4);
        let owner = Id::new();
        let slots: Vec<_> = (0..4).map(|_| attach(&mut t, owner)).collect();
        t.detach(owner, slots[2]).unwrap();
        t.detach(owner, slots[0]).unwrap();

        // Every index below the lowest free slot is occupied.
        let lowest = t.lowest_free_index().unwrap();
        assert_eq!(lowest, 0);
        for i in 0..lowest {
            assert!(t.record(i).live == 1);
        }

        let s = attach(&mut t, owner);
        assert_eq!(s.index(), 0);
        let lowest = t.lowest_free_index().unwrap();
        assert_eq!(lowest, 2);
        for i in 0..lowest {
            assert!(t.record(i).live == 1);
        }
    }

    #[test]
    fn test_high_water_shrinks_on_detach() {
        let mut t = table(8);
        let owner = Id::new();
        let slots: Vec<_> = (0..6).map(|_| attach(&mut t, owner)).collect();
        assert_eq!(t.max_instance_index(), 5);

        t.detach(owner, slots[5]).unwrap();
        assert_eq!(t.max_instance_index(), 4);

        // Vacate 3 and 4; removing 4 must skip over the hole at 3.
        t.detach(owner, slots[3]).unwrap();
        t.detach(owner, slots[4]).unwrap();
        assert_eq!(t.max_instance_index(), 2);
    }

    #[test]
    fn test_detach_not_owned_is_reported() {
        let mut t = table(4);
        let owner = Id::new();
        let intruder = Id::new();
        let slot = attach(&mut t, owner);

        assert!(matches!(
            t.detach(intruder, slot),
            Err(InstanceError::SlotNotOwned { .. })
        ));

        t.detach(owner, slot).unwrap();
        // Double detach is the same violation.
        assert!(t.detach(owner, slot).is_err());
    }
}
