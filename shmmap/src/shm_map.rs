use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::path::Path;

use crate::error::{Result, ShmMapError};
use crate::iter::{Iter, Keys, Values};
use crate::raw_table::{Growth, RawTable};
use crate::types::TableValue;

/// Slot count used when no capacity is requested.
pub const INITIAL_CAPACITY: usize = 8;

// Type aliases for the two supported value types
pub type U64Map = ShmHashMap<u64>;
pub type F64Map = ShmHashMap<f64>;

/// Open-addressing hash table from u64 keys to fixed-width numeric values,
/// kept in one contiguous header+slots buffer.
///
/// The buffer is the whole story: it can be copied, written to a file, or
/// mapped into another address space byte for byte, and a reader attaches
/// to it with [`ShmHashMap::from_ptr`] or [`ShmHashMap::open`] once the
/// writer has called [`ShmHashMap::make_readonly`]. Freezing is one-way;
/// after it every mutating operation fails, which is what makes the shared
/// readers safe without coordination.
///
/// An optional default value turns indexed reads into inserts: see
/// [`ShmHashMap::get_or_insert_default`] versus the never-inserting
/// [`ShmHashMap::get_or`].
pub struct ShmHashMap<V: TableValue> {
    raw: RawTable,
    default: Option<V>,
}

impl<V: TableValue> ShmHashMap<V> {
    /// Empty growable table with the standard initial capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Empty growable table with room for `capacity` entries before the
    /// first rehash. Requests below one slot are clamped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_parts(RawTable::new(capacity, Growth::Growable), None)
    }

    /// Growable table whose indexed reads materialize `default` for absent
    /// keys.
    pub fn with_default(default: V) -> Self {
        Self::with_capacity_and_default(INITIAL_CAPACITY, default)
    }

    pub fn with_capacity_and_default(capacity: usize, default: V) -> Self {
        Self::from_parts(RawTable::new(capacity, Growth::Growable), Some(default))
    }

    /// Fixed-capacity table: holds at most `max_size` entries, never grows,
    /// and does not support removal.
    pub fn fixed(max_size: usize) -> Self {
        Self::from_parts(RawTable::new(max_size, Growth::Fixed), None)
    }

    pub fn fixed_with_default(max_size: usize, default: V) -> Self {
        Self::from_parts(RawTable::new(max_size, Growth::Fixed), Some(default))
    }

    /// Growable table whose buffer lives in a freshly created file at
    /// `path`, so the published image can be mapped by other processes
    /// (a path under /dev/shm keeps it off the disk entirely).
    pub fn new_in(path: &Path) -> Result<Self> {
        Self::with_capacity_in(INITIAL_CAPACITY, path)
    }

    pub fn with_capacity_in(capacity: usize, path: &Path) -> Result<Self> {
        Ok(Self::from_parts(
            RawTable::create_in(path, capacity)?,
            None,
        ))
    }

    pub(crate) fn from_parts(raw: RawTable, default: Option<V>) -> Self {
        Self { raw, default }
    }

    pub(crate) fn raw(&self) -> &RawTable {
        &self.raw
    }

    /// Look the key up without touching the table.
    pub fn get(&self, key: u64) -> Result<V> {
        self.raw
            .get_bits(key)
            .map(V::from_bits)
            .ok_or(ShmMapError::KeyNotFound)
    }

    /// Look the key up, falling back to `fallback` when absent. Never
    /// inserts anything, in contrast to [`Self::get_or_insert_default`].
    pub fn get_or(&self, key: u64, fallback: V) -> V {
        self.raw
            .get_bits(key)
            .map(V::from_bits)
            .unwrap_or(fallback)
    }

    /// Indexed read: absent keys are materialized with the configured
    /// default, which is inserted and returned. Without a default an absent
    /// key reports KeyNotFound. Fails on frozen tables like any mutation.
    pub fn get_or_insert_default(&mut self, key: u64) -> Result<V> {
        if self.raw.is_readonly() {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        if let Some(bits) = self.raw.get_bits(key) {
            return Ok(V::from_bits(bits));
        }
        match self.default {
            Some(default) => {
                self.raw.insert_bits(key, default.to_bits())?;
                Ok(default)
            }
            None => Err(ShmMapError::KeyNotFound),
        }
    }

    /// Return the existing value, or insert `value` and return that. An
    /// existing value wins even on a frozen table; only the insert path is
    /// gated.
    pub fn get_or_insert(&mut self, key: u64, value: V) -> Result<V> {
        if let Some(bits) = self.raw.get_bits(key) {
            return Ok(V::from_bits(bits));
        }
        self.raw.insert_bits(key, value.to_bits())?;
        Ok(value)
    }

    /// Insert or overwrite one pair.
    pub fn set(&mut self, key: u64, value: V) -> Result<()> {
        self.raw.insert_bits(key, value.to_bits())
    }

    /// Remove one key, leaving a tombstone for later probes.
    pub fn remove(&mut self, key: u64) -> Result<()> {
        self.raw.remove(key)
    }

    /// Remove one key and hand back its value.
    pub fn pop(&mut self, key: u64) -> Result<V> {
        self.raw.take_bits(key).map(V::from_bits)
    }

    /// Remove and return the first pair in slot order.
    pub fn pop_first(&mut self) -> Result<(u64, V)> {
        self.raw
            .take_first()
            .map(|(key, bits)| (key, V::from_bits(bits)))
    }

    /// Bulk insert. Stops at the first failing pair; the pairs before it
    /// stay applied, each one atomically.
    pub fn update<I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (u64, V)>,
    {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.raw.contains(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every slot. Fails on frozen tables.
    pub fn clear(&mut self) -> Result<()> {
        self.raw.clear()
    }

    /// Live-entry count at which the next insert triggers growth.
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Total slots in the array, tombstones and empties included.
    pub fn slot_count(&self) -> usize {
        self.raw.slot_count()
    }

    /// The configured materialization default, if any.
    pub fn default_value(&self) -> Option<V> {
        self.default
    }

    /// One-way transition to read-only; idempotent. File-backed buffers are
    /// flushed here, since this is the publish point.
    pub fn make_readonly(&mut self) -> Result<()> {
        self.raw.freeze()
    }

    pub fn is_readonly(&self) -> bool {
        self.raw.is_readonly()
    }

    pub fn is_fixed(&self) -> bool {
        self.raw.growth() == Growth::Fixed
    }

    /// True when the table reads caller-owned memory it must not free.
    pub fn is_borrowed(&self) -> bool {
        self.raw.is_borrowed()
    }

    /// Live address of the header+slots buffer.
    pub fn buffer_ptr(&self) -> *const u8 {
        self.raw.as_bytes().as_ptr()
    }

    /// Exact byte length of the buffer.
    pub fn buffer_size(&self) -> usize {
        self.raw.as_bytes().len()
    }

    /// Pairs in slot order. Each call starts a fresh pass.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self)
    }

    pub fn keys(&self) -> Keys<'_, V> {
        Keys::new(self)
    }

    pub fn values(&self) -> Values<'_, V> {
        Values::new(self)
    }
}

impl<V: TableValue> Default for ShmHashMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: TableValue> fmt::Debug for ShmHashMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Tables are equal when they hold the same (key, value) set; capacity,
/// slot layout, and freeze state are ignored. There is deliberately no
/// ordering between tables.
impl<V: TableValue> PartialEq for ShmHashMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).map_or(false, |o| o == value))
    }
}

impl<V: TableValue, S: BuildHasher> PartialEq<HashMap<u64, V, S>> for ShmHashMap<V> {
    fn eq(&self, other: &HashMap<u64, V, S>) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(&key).is_some_and(|o| *o == value))
    }
}

impl<V: TableValue, S: BuildHasher> PartialEq<ShmHashMap<V>> for HashMap<u64, V, S> {
    fn eq(&self, other: &ShmHashMap<V>) -> bool {
        other == self
    }
}

impl<V: TableValue> FromIterator<(u64, V)> for ShmHashMap<V> {
    fn from_iter<I: IntoIterator<Item = (u64, V)>>(pairs: I) -> Self {
        let mut map = Self::new();
        for (key, value) in pairs {
            map.set(key, value)
                .expect("a fresh growable map accepts any insert");
        }
        map
    }
}

impl<V: TableValue, S: BuildHasher> From<&HashMap<u64, V, S>> for ShmHashMap<V> {
    fn from(mapping: &HashMap<u64, V, S>) -> Self {
        mapping.iter().map(|(k, v)| (*k, *v)).collect()
    }
}
