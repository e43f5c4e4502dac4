use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::ptr::NonNull;

use memmap2::{Mmap, MmapMut};

/// Storage strategy for a table's single contiguous buffer.
///
/// `Heap` and `File` are owned and writable. `Mapped` is an owned read-only
/// mapping of a frozen table file. `Raw` borrows caller memory and never
/// frees it. Heap storage is kept as 64-bit words so every byte view handed
/// out is 8-byte aligned, which the header and slot casts rely on.
pub(crate) enum Segment {
    Heap(Box<[u64]>),
    File { map: MmapMut, file: File },
    Mapped(Mmap),
    Raw { ptr: NonNull<u8>, len: usize },
}

impl Segment {
    /// Zero-filled heap segment. `len` must be a whole number of words,
    /// which every header+slots image is.
    pub(crate) fn heap(len: usize) -> Self {
        debug_assert!(len % 8 == 0);
        Segment::Heap(vec![0u64; len / 8].into_boxed_slice())
    }

    /// Create (or truncate) a file of `len` zero bytes and map it writable.
    pub(crate) fn create_file(path: &Path, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Segment::File { map, file })
    }

    /// Map an existing file read-only.
    pub(crate) fn open_file(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        Ok(Segment::Mapped(map))
    }

    /// Borrow `len` bytes of caller-owned memory.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads of `len` bytes, 8-byte aligned, for
    /// the lifetime of the segment.
    pub(crate) unsafe fn raw(ptr: NonNull<u8>, len: usize) -> Self {
        Segment::Raw { ptr, len }
    }

    pub(crate) fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Segment::Heap(words) => bytemuck::cast_slice(words),
            Segment::File { map, .. } => map,
            Segment::Mapped(map) => map,
            Segment::Raw { ptr, len } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Segment::Heap(words) => bytemuck::cast_slice_mut(words),
            Segment::File { map, .. } => map,
            // attach paths only admit frozen tables, so no mutating call gets here
            Segment::Mapped(_) | Segment::Raw { .. } => unreachable!("read-only segment"),
        }
    }

    /// True when the segment borrows memory owned by someone else.
    pub(crate) fn is_borrowed(&self) -> bool {
        matches!(self, Segment::Raw { .. })
    }

    /// Swap in a freshly built image. Heap segments reallocate; file
    /// segments resize and remap the same file.
    pub(crate) fn replace(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Segment::Heap(words) => {
                debug_assert!(bytes.len() % 8 == 0);
                let mut new_words = vec![0u64; bytes.len() / 8];
                bytemuck::cast_slice_mut(&mut new_words).copy_from_slice(bytes);
                *words = new_words.into_boxed_slice();
                Ok(())
            }
            Segment::File { map, file } => {
                file.set_len(bytes.len() as u64)?;
                let mut new_map = unsafe { MmapMut::map_mut(&*file)? };
                new_map.copy_from_slice(bytes);
                *map = new_map;
                Ok(())
            }
            Segment::Mapped(_) | Segment::Raw { .. } => unreachable!("read-only segment"),
        }
    }

    /// Push file-backed contents out at the publish point. A no-op for the
    /// other strategies.
    pub(crate) fn flush(&self) -> io::Result<()> {
        match self {
            Segment::File { map, file } => {
                map.flush()?;
                file.sync_all()
            }
            _ => Ok(()),
        }
    }
}
