use std::path::Path;
use std::ptr::NonNull;

use crate::error::{Result, ShmMapError};
use crate::raw_table::{Growth, RawTable};
use crate::segment::Segment;
use crate::shm_map::ShmHashMap;
use crate::slot::{HEADER_SIZE, Header, buffer_len, checked_buffer_len};
use crate::types::TableValue;

/// Everything needed to rebuild a table around its raw buffer.
///
/// The buffer embeds its own header; the metadata repeats those counters so
/// an importer can cross-check them, and carries the materialization
/// default, which lives outside the buffer.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct TableMetadata<V> {
    pub default: Option<V>,
    pub capacity: u64,
    pub slots: u64,
    pub len: u64,
    pub readonly: bool,
}

impl<V: TableValue> ShmHashMap<V> {
    /// Snapshot the table as (metadata, buffer bytes).
    pub fn export(&self) -> (TableMetadata<V>, Vec<u8>) {
        let header = self.raw().header();
        let metadata = TableMetadata {
            default: self.default_value(),
            capacity: header.capacity,
            slots: header.slots,
            len: header.len,
            readonly: header.readonly != 0,
        };
        (metadata, self.raw().as_bytes().to_vec())
    }

    /// Rebuild a table from an exported snapshot, copying the bytes into a
    /// fresh heap buffer. The copy owns its memory, so the rebuilt table is
    /// independent of the source and always growable.
    pub fn import(metadata: TableMetadata<V>, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "{} bytes is shorter than a table header",
                bytes.len()
            )));
        }
        let embedded: Header = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
        let expected = Header {
            capacity: metadata.capacity,
            len: metadata.len,
            slots: metadata.slots,
            readonly: metadata.readonly as u64,
        };
        if embedded != expected {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "embedded header {embedded:?} disagrees with the metadata"
            )));
        }
        if metadata.slots == 0
            || metadata.capacity > metadata.slots
            || metadata.len > metadata.capacity
        {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "counters out of range: len {} capacity {} slots {}",
                metadata.len, metadata.capacity, metadata.slots
            )));
        }
        if checked_buffer_len(metadata.slots) != Some(bytes.len() as u64) {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "{} bytes cannot hold {} slots",
                bytes.len(),
                metadata.slots
            )));
        }

        // The input may be arbitrarily aligned; the heap segment is not.
        let mut seg = Segment::heap(bytes.len());
        seg.as_mut_slice().copy_from_slice(bytes);
        let raw = RawTable::with_segment(seg, Growth::Growable);

        let live = raw.slots().iter().filter(|s| s.is_occupied()).count() as u64;
        if live != metadata.len {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "{} occupied slots but len says {}",
                live, metadata.len
            )));
        }
        Ok(Self::from_parts(raw, metadata.default))
    }

    /// Attach to a frozen table image owned by someone else, without copying.
    ///
    /// The attached table borrows the memory: it never frees it and never
    /// writes through it. Attachment is refused unless the image is already
    /// read-only, so no writer can reshape the buffer under a reader.
    ///
    /// # Safety
    ///
    /// `ptr` must point to the first byte of a complete table buffer (as
    /// exposed by [`Self::buffer_ptr`]), be 8-byte aligned, stay valid for
    /// reads of the full buffer length, and stay unmodified for the lifetime
    /// of the returned table.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self> {
        let header = unsafe { ptr.cast::<Header>().read() };
        if header.readonly == 0 {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        let seg = unsafe {
            Segment::raw(
                NonNull::new_unchecked(ptr.cast_mut()),
                buffer_len(header.slots as usize),
            )
        };
        Ok(Self::from_parts(
            RawTable::with_segment(seg, Growth::Growable),
            None,
        ))
    }

    /// Map a table published to a file with [`Self::new_in`] followed by
    /// [`Self::make_readonly`]. Refused while the file is still writable.
    pub fn open(path: &Path) -> Result<Self> {
        let seg = Segment::open_file(path)?;
        if seg.len() < HEADER_SIZE {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "{} bytes is shorter than a table header",
                seg.len()
            )));
        }
        let raw = RawTable::with_segment(seg, Growth::Growable);
        let header = raw.header();
        if header.readonly == 0 {
            return Err(ShmMapError::ReadOnlyViolation);
        }
        if header.slots == 0 || header.capacity > header.slots || header.len > header.capacity {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "counters out of range: len {} capacity {} slots {}",
                header.len, header.capacity, header.slots
            )));
        }
        if checked_buffer_len(header.slots) != Some(raw.as_bytes().len() as u64) {
            return Err(ShmMapError::InconsistentSerializedState(format!(
                "file holds {} bytes but the header says {} slots",
                raw.as_bytes().len(),
                header.slots
            )));
        }
        Ok(Self::from_parts(raw, None))
    }
}
