use std::hash::BuildHasher;
use std::path::Path;

use rustc_hash::FxBuildHasher;

use crate::error::{Result, ShmMapError};
use crate::segment::Segment;
use crate::slot::{HEADER_SIZE, Header, Slot, Status, buffer_len};

/// Whether a table may reallocate or stays pinned at its creation size.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Growth {
    Growable,
    Fixed,
}

/// Untyped probing engine over one contiguous header+slots buffer.
///
/// Values are stored as raw 64-bit patterns; the typed layer above decides
/// what the bits mean. All probing is linear with wraparound, bounded to a
/// single sweep of the slot array, with tombstones skipped on lookup and
/// reclaimed on insert. The hasher is unseeded, so a writer and any reader
/// attached to its frozen buffer compute identical probe sequences.
pub(crate) struct RawTable {
    seg: Segment,
    growth: Growth,
    hasher: FxBuildHasher,
}

fn write_initial_header(seg: &mut Segment, slots: usize) {
    let header = Header {
        capacity: slots as u64,
        len: 0,
        slots: slots as u64,
        readonly: 0,
    };
    seg.as_mut_slice()[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
}

impl RawTable {
    /// Heap-backed table with `slots` slots (at least one).
    pub(crate) fn new(slots: usize, growth: Growth) -> Self {
        let slots = slots.max(1);
        let mut seg = Segment::heap(buffer_len(slots));
        write_initial_header(&mut seg, slots);
        Self::with_segment(seg, growth)
    }

    /// Table whose buffer lives in a freshly created file at `path`.
    pub(crate) fn create_in(path: &Path, slots: usize) -> Result<Self> {
        let slots = slots.max(1);
        let mut seg = Segment::create_file(path, buffer_len(slots))?;
        write_initial_header(&mut seg, slots);
        Ok(Self::with_segment(seg, Growth::Growable))
    }

    /// Wrap an already initialized segment. The header must be in place.
    pub(crate) fn with_segment(seg: Segment, growth: Growth) -> Self {
        Self {
            seg,
            growth,
            hasher: FxBuildHasher::default(),
        }
    }

    pub(crate) fn header(&self) -> Header {
        *bytemuck::from_bytes(&self.seg.as_slice()[..HEADER_SIZE])
    }

    fn header_mut(&mut self) -> &mut Header {
        bytemuck::from_bytes_mut(&mut self.seg.as_mut_slice()[..HEADER_SIZE])
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        bytemuck::cast_slice(&self.seg.as_slice()[HEADER_SIZE..])
    }

    fn slots_mut(&mut self) -> &mut [Slot] {
        bytemuck::cast_slice_mut(&mut self.seg.as_mut_slice()[HEADER_SIZE..])
    }

    /// Probe for `key` starting at its home slot.
    ///
    /// `Ok(index)` is the occupied slot holding the key. `Err(Some(index))`
    /// means absent, with the first reusable slot (tombstone or empty) seen
    /// on the probe path. `Err(None)` means absent with nothing reusable,
    /// which only happens when every slot is occupied.
    fn find_slot(&self, key: u64) -> std::result::Result<usize, Option<usize>> {
        let slot_count = self.header().slots as usize;
        let slots = self.slots();
        let mut index = (self.hasher.hash_one(key) % slot_count as u64) as usize;
        let mut reuse = None;

        // Linear probing, bounded to one full sweep
        for _ in 0..slot_count {
            let slot = &slots[index];
            if slot.is_empty() {
                // empty terminates the search; an earlier tombstone wins for reuse
                return Err(Some(reuse.unwrap_or(index)));
            }
            if slot.is_occupied() && slot.key == key {
                return Ok(index);
            }
            if slot.is_tombstone() && reuse.is_none() {
                reuse = Some(index);
            }
            index = (index + 1) % slot_count;
        }

        Err(reuse)
    }

    pub(crate) fn get_bits(&self, key: u64) -> Option<u64> {
        match self.find_slot(key) {
            Ok(index) => Some(self.slots()[index].value_bits),
            Err(_) => None,
        }
    }

    pub(crate) fn contains(&self, key: u64) -> bool {
        self.find_slot(key).is_ok()
    }

    /// Insert or overwrite. The growth check runs before the probe, so the
    /// probe always sees a table with room for one more entry.
    pub(crate) fn insert_bits(&mut self, key: u64, value_bits: u64) -> Result<()> {
        if self.is_readonly() {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        let header = self.header();
        if header.len == header.capacity {
            match self.growth {
                Growth::Growable => self.grow()?,
                Growth::Fixed => {
                    // a full fixed table can still overwrite an existing key
                    return match self.find_slot(key) {
                        Ok(index) => {
                            self.slots_mut()[index].value_bits = value_bits;
                            Ok(())
                        }
                        Err(_) => Err(ShmMapError::CapacityExceeded),
                    };
                }
            }
        }
        match self.find_slot(key) {
            Ok(index) => {
                self.slots_mut()[index].value_bits = value_bits;
            }
            Err(Some(index)) => {
                self.slots_mut()[index] = Slot::occupied(key, value_bits);
                self.header_mut().len += 1;
            }
            Err(None) => return Err(ShmMapError::CapacityExceeded),
        }
        Ok(())
    }

    /// Double the slot array and rebuild it, re-inserting occupied entries
    /// and dropping tombstones. The live count is unchanged.
    fn grow(&mut self) -> Result<()> {
        let header = self.header();
        let new_slots = (header.slots as usize) * 2;
        let mut image = vec![0u64; buffer_len(new_slots) / 8];
        {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut image);
            let new_header = Header {
                capacity: header.capacity * 2,
                len: header.len,
                slots: new_slots as u64,
                readonly: 0,
            };
            bytes[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&new_header));

            let new_slot_arr: &mut [Slot] = bytemuck::cast_slice_mut(&mut bytes[HEADER_SIZE..]);
            for slot in self.slots() {
                if slot.is_occupied() {
                    let mut index = (self.hasher.hash_one(slot.key) % new_slots as u64) as usize;
                    // the new array is half empty, so a free slot always turns up
                    loop {
                        if new_slot_arr[index].is_empty() {
                            new_slot_arr[index] = *slot;
                            break;
                        }
                        index = (index + 1) % new_slots;
                    }
                }
            }
        }
        self.seg.replace(bytemuck::cast_slice(&image))?;
        Ok(())
    }

    /// Mark the key's slot as a tombstone. Unavailable in fixed mode.
    pub(crate) fn remove(&mut self, key: u64) -> Result<()> {
        if self.is_readonly() {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        if self.growth == Growth::Fixed {
            return Err(ShmMapError::UnsupportedOperation("remove"));
        }
        match self.find_slot(key) {
            Ok(index) => {
                self.slots_mut()[index].meta.set_status(Status::Tombstone);
                self.header_mut().len -= 1;
                Ok(())
            }
            Err(_) => Err(ShmMapError::KeyNotFound),
        }
    }

    /// Remove the key and hand back its value bits. Looks the key up before
    /// any gate, so a missing key reports KeyNotFound even on frozen tables.
    pub(crate) fn take_bits(&mut self, key: u64) -> Result<u64> {
        let index = match self.find_slot(key) {
            Ok(index) => index,
            Err(_) => return Err(ShmMapError::KeyNotFound),
        };
        if self.is_readonly() {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        if self.growth == Growth::Fixed {
            return Err(ShmMapError::UnsupportedOperation("pop"));
        }
        let bits = self.slots()[index].value_bits;
        self.slots_mut()[index].meta.set_status(Status::Tombstone);
        self.header_mut().len -= 1;
        Ok(bits)
    }

    /// Remove and return the first occupied slot in slot order.
    pub(crate) fn take_first(&mut self) -> Result<(u64, u64)> {
        if self.is_readonly() {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        if self.growth == Growth::Fixed {
            return Err(ShmMapError::UnsupportedOperation("pop_first"));
        }
        let slot_count = self.header().slots as usize;
        for index in 0..slot_count {
            let slot = self.slots()[index];
            if slot.is_occupied() {
                self.slots_mut()[index].meta.set_status(Status::Tombstone);
                self.header_mut().len -= 1;
                return Ok((slot.key, slot.value_bits));
            }
        }
        Err(ShmMapError::KeyNotFound)
    }

    /// Reset every slot to empty.
    pub(crate) fn clear(&mut self) -> Result<()> {
        if self.is_readonly() {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        for slot in self.slots_mut() {
            *slot = bytemuck::Zeroable::zeroed();
        }
        self.header_mut().len = 0;
        Ok(())
    }

    /// One-way transition to read-only. Idempotent; file-backed buffers are
    /// flushed at this point since it is the publish moment.
    pub(crate) fn freeze(&mut self) -> Result<()> {
        if !self.is_readonly() {
            self.header_mut().readonly = 1;
            self.seg.flush()?;
        }
        Ok(())
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.header().readonly != 0
    }

    pub(crate) fn len(&self) -> usize {
        self.header().len as usize
    }

    pub(crate) fn capacity(&self) -> usize {
        self.header().capacity as usize
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.header().slots as usize
    }

    pub(crate) fn growth(&self) -> Growth {
        self.growth
    }

    pub(crate) fn is_borrowed(&self) -> bool {
        self.seg.is_borrowed()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.seg.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn growable(slots: usize) -> RawTable {
        RawTable::new(slots, Growth::Growable)
    }

    fn tombstone_count(table: &RawTable) -> usize {
        table.slots().iter().filter(|s| s.is_tombstone()).count()
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = growable(8);
        table.insert_bits(1, 101).unwrap();
        table.insert_bits(2, 102).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get_bits(1), Some(101));
        assert_eq!(table.get_bits(2), Some(102));
        assert_eq!(table.get_bits(3), None);
        assert!(table.contains(1));
        assert!(!table.contains(3));
    }

    #[test]
    fn test_overwrite_keeps_len() {
        let mut table = growable(8);
        table.insert_bits(7, 1).unwrap();
        table.insert_bits(7, 2).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get_bits(7), Some(2));
    }

    #[test]
    fn test_new_table_counters() {
        let table = growable(8);
        assert_eq!(table.len(), 0);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.slot_count(), 8);
        assert!(!table.is_readonly());
        assert_eq!(table.as_bytes().len(), buffer_len(8));
    }

    #[test]
    fn test_zero_slots_clamps_to_one() {
        let mut table = growable(0);
        assert_eq!(table.slot_count(), 1);
        table.insert_bits(9, 9).unwrap();
        assert_eq!(table.get_bits(9), Some(9));
    }

    #[test]
    fn test_remove_then_reinsert_reuses_tombstone() {
        let mut table = growable(8);
        table.insert_bits(5, 500).unwrap();
        table.remove(5).unwrap();

        assert_eq!(table.len(), 0);
        assert_eq!(table.get_bits(5), None);
        assert_eq!(tombstone_count(&table), 1);

        table.insert_bits(5, 501).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_bits(5), Some(501));
        assert_eq!(tombstone_count(&table), 0, "tombstone slot is reclaimed");
    }

    #[test]
    fn test_remove_missing_key() {
        let mut table = growable(8);
        assert!(matches!(table.remove(1), Err(ShmMapError::KeyNotFound)));
    }

    #[test]
    fn test_growth_doubles_at_threshold() {
        let mut table = growable(8);
        for key in 0..16 {
            table.insert_bits(key, key + 100).unwrap();
        }

        assert_eq!(table.len(), 16);
        assert_eq!(table.capacity(), 16);
        assert_eq!(table.slot_count(), 16);
        for key in 0..16 {
            assert_eq!(table.get_bits(key), Some(key + 100));
        }
    }

    #[test]
    fn test_growth_drops_tombstones() {
        let mut table = growable(8);
        for key in 0..8 {
            table.insert_bits(key, key).unwrap();
        }
        for key in 0..4 {
            table.remove(key).unwrap();
        }
        assert_eq!(tombstone_count(&table), 4);

        // len runs 4 -> 8, then the next insert triggers the rehash
        for key in 100..105 {
            table.insert_bits(key, key).unwrap();
        }

        assert_eq!(table.len(), 9);
        assert_eq!(table.slot_count(), 16);
        assert_eq!(tombstone_count(&table), 0, "rehash drops tombstones");
        for key in 4..8 {
            assert_eq!(table.get_bits(key), Some(key));
        }
        for key in 100..105 {
            assert_eq!(table.get_bits(key), Some(key));
        }
    }

    #[test]
    fn test_single_slot_growth() {
        let mut table = growable(1);
        table.insert_bits(1, 1).unwrap();
        table.insert_bits(2, 2).unwrap();
        table.insert_bits(3, 3).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.slot_count(), 4);
        assert_eq!(table.get_bits(2), Some(2));
    }

    #[test]
    fn test_fixed_mode_rejects_overflow() {
        let mut table = RawTable::new(4, Growth::Fixed);
        for key in 0..4 {
            table.insert_bits(key, key).unwrap();
        }

        assert!(matches!(
            table.insert_bits(99, 99),
            Err(ShmMapError::CapacityExceeded)
        ));
        assert_eq!(table.len(), 4);
        assert_eq!(table.slot_count(), 4, "fixed tables never grow");

        // overwriting an existing key still works at full capacity
        table.insert_bits(2, 22).unwrap();
        assert_eq!(table.get_bits(2), Some(22));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_fixed_mode_disables_remove() {
        let mut table = RawTable::new(4, Growth::Fixed);
        table.insert_bits(1, 1).unwrap();
        assert!(matches!(
            table.remove(1),
            Err(ShmMapError::UnsupportedOperation("remove"))
        ));
        assert!(matches!(
            table.take_bits(1),
            Err(ShmMapError::UnsupportedOperation("pop"))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_full_fixed_table_lookup_terminates() {
        let mut table = RawTable::new(4, Growth::Fixed);
        for key in 0..4 {
            table.insert_bits(key, key).unwrap();
        }
        // no empty slot left; the bounded sweep must still report absence
        assert_eq!(table.get_bits(1234), None);
        assert!(!table.contains(1234));
    }

    #[test]
    fn test_probe_past_tombstones_without_empty_slots() {
        let mut table = growable(1);
        table.insert_bits(1, 1).unwrap();
        table.remove(1).unwrap();

        // the only slot is a tombstone: lookups must terminate and miss
        assert_eq!(table.get_bits(1), None);
        assert_eq!(table.get_bits(2), None);

        // and an insert reclaims it instead of growing
        table.insert_bits(2, 20).unwrap();
        assert_eq!(table.slot_count(), 1);
        assert_eq!(table.get_bits(2), Some(20));
    }

    #[test]
    fn test_readonly_gates_mutation() {
        let mut table = growable(8);
        table.insert_bits(1, 1).unwrap();
        table.freeze().unwrap();
        assert!(table.is_readonly());

        assert!(matches!(
            table.insert_bits(2, 2),
            Err(ShmMapError::ReadOnlyViolation)
        ));
        assert!(matches!(
            table.remove(1),
            Err(ShmMapError::ReadOnlyViolation)
        ));
        assert!(matches!(
            table.clear(),
            Err(ShmMapError::ReadOnlyViolation)
        ));
        assert!(matches!(
            table.take_first(),
            Err(ShmMapError::ReadOnlyViolation)
        ));

        // lookups keep working, and freezing again is a no-op
        assert_eq!(table.get_bits(1), Some(1));
        table.freeze().unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_take_bits_gating() {
        let mut table = growable(8);
        table.insert_bits(1, 10).unwrap();
        table.freeze().unwrap();

        // missing key reports KeyNotFound even though the table is frozen
        assert!(matches!(table.take_bits(2), Err(ShmMapError::KeyNotFound)));
        assert!(matches!(
            table.take_bits(1),
            Err(ShmMapError::ReadOnlyViolation)
        ));
    }

    #[test]
    fn test_take_first_in_slot_order() {
        let mut table = growable(8);
        for key in [3u64, 11, 27] {
            table.insert_bits(key, key * 10).unwrap();
        }

        let first_occupied = table
            .slots()
            .iter()
            .find(|s| s.is_occupied())
            .map(|s| (s.key, s.value_bits))
            .unwrap();
        assert_eq!(table.take_first().unwrap(), first_occupied);
        assert_eq!(table.len(), 2);

        table.take_first().unwrap();
        table.take_first().unwrap();
        assert!(matches!(table.take_first(), Err(ShmMapError::KeyNotFound)));
    }

    #[test]
    fn test_clear_resets_slots() {
        let mut table = growable(8);
        for key in 0..6 {
            table.insert_bits(key, key).unwrap();
        }
        table.remove(3).unwrap();
        table.clear().unwrap();

        assert_eq!(table.len(), 0);
        assert_eq!(tombstone_count(&table), 0);
        assert_eq!(table.get_bits(1), None);

        table.insert_bits(1, 100).unwrap();
        assert_eq!(table.get_bits(1), Some(100));
    }

    fn check_prop(expected: HashMap<u64, u64>) {
        let mut table = growable(8);
        for (k, v) in expected.iter() {
            table.insert_bits(*k, *v).unwrap();
        }

        assert_eq!(table.len(), expected.len());
        for (k, v) in expected.iter() {
            assert_eq!(table.get_bits(*k), Some(*v), "key: {k}");
        }
    }

    #[test]
    fn it_s_a_hash_table() {
        let pairs = proptest::collection::hash_map(any::<u64>(), any::<u64>(), 1..250);
        proptest!(|(values in pairs)| {
            check_prop(values);
        });
    }

    fn check_churn(ops: Vec<(u64, u64, bool)>) {
        let mut table = growable(8);
        let mut oracle: HashMap<u64, u64> = HashMap::new();

        for (key, value, remove) in ops {
            if remove {
                let expected = oracle.remove(&key).is_some();
                assert_eq!(table.remove(key).is_ok(), expected, "remove key: {key}");
            } else {
                table.insert_bits(key, value).unwrap();
                oracle.insert(key, value);
            }
        }

        assert_eq!(table.len(), oracle.len());
        for (k, v) in oracle.iter() {
            assert_eq!(table.get_bits(*k), Some(*v), "key: {k}");
        }
    }

    #[test]
    fn it_survives_insert_remove_churn() {
        // a small key range forces collisions and tombstone traffic
        let ops = proptest::collection::vec((0u64..64, any::<u64>(), any::<bool>()), 0..300);
        proptest!(|(ops in ops)| {
            check_churn(ops);
        });
    }

    #[test]
    fn churn_regression_dense_interleave() {
        let mut ops = Vec::new();
        for round in 0..4u64 {
            for key in 0..40u64 {
                ops.push((key, key * 1000 + round, round % 2 == 1));
            }
        }
        check_churn(ops);
    }
}
