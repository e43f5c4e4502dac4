use std::iter::FusedIterator;

use crate::shm_map::ShmHashMap;
use crate::types::TableValue;

/// Iterator over the live pairs of a table, in slot order.
///
/// Slot order is the physical order of the backing buffer, so two tables
/// holding the same pairs can yield them differently once their growth
/// histories diverge.
pub struct Iter<'a, V: TableValue> {
    map: &'a ShmHashMap<V>,
    index: usize,
    remaining: usize,
}

impl<'a, V: TableValue> Iter<'a, V> {
    pub(crate) fn new(map: &'a ShmHashMap<V>) -> Self {
        Self {
            map,
            index: 0,
            remaining: map.len(),
        }
    }
}

impl<V: TableValue> Iterator for Iter<'_, V> {
    type Item = (u64, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        while self.index < self.map.slot_count() {
            let slot = self.map.raw().slots()[self.index];
            self.index += 1;
            if slot.is_occupied() {
                self.remaining -= 1;
                return Some((slot.key, V::from_bits(slot.value_bits)));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V: TableValue> ExactSizeIterator for Iter<'_, V> {}
impl<V: TableValue> FusedIterator for Iter<'_, V> {}

/// Iterator over keys, in slot order.
pub struct Keys<'a, V: TableValue> {
    inner: Iter<'a, V>,
}

impl<'a, V: TableValue> Keys<'a, V> {
    pub(crate) fn new(map: &'a ShmHashMap<V>) -> Self {
        Self {
            inner: Iter::new(map),
        }
    }
}

impl<V: TableValue> Iterator for Keys<'_, V> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V: TableValue> ExactSizeIterator for Keys<'_, V> {}
impl<V: TableValue> FusedIterator for Keys<'_, V> {}

/// Iterator over values, in slot order.
pub struct Values<'a, V: TableValue> {
    inner: Iter<'a, V>,
}

impl<'a, V: TableValue> Values<'a, V> {
    pub(crate) fn new(map: &'a ShmHashMap<V>) -> Self {
        Self {
            inner: Iter::new(map),
        }
    }
}

impl<V: TableValue> Iterator for Values<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<V: TableValue> ExactSizeIterator for Values<'_, V> {}
impl<V: TableValue> FusedIterator for Values<'_, V> {}

impl<'a, V: TableValue> IntoIterator for &'a ShmHashMap<V> {
    type Item = (u64, V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
