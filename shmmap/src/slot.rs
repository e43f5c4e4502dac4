#![allow(dead_code)]
use bytemuck::{Pod, Zeroable};
use modular_bitfield::prelude::B62;
use modular_bitfield::{Specifier, bitfield};

/// Slot occupancy states. `Empty` terminates a negative probe, `Tombstone`
/// is probed past. A zeroed word decodes as `Empty`, so a zero-filled
/// buffer is a valid empty slot array. `Reserved` exists only to make every
/// 2-bit pattern decodable.
#[derive(Specifier, PartialEq, Debug, Clone, Copy)]
pub enum Status {
    Empty,
    Occupied,
    Tombstone,
    Reserved,
}

/// Occupancy status packed into the low bits of a 64-bit word. The word is
/// part of the wire image, so the remaining bits stay zero.
#[bitfield(bits = 64)]
#[derive(Clone, Copy, Zeroable, Pod, Debug)]
#[repr(C)]
pub struct SlotMeta {
    #[bits = 2]
    pub status: Status,
    #[bits = 62]
    padding: B62,
}

/// One table slot: key, raw value bits, occupancy word. 24 bytes on the
/// wire, directly after the header.
#[derive(Clone, Copy, Zeroable, Pod, Debug)]
#[repr(C)]
pub struct Slot {
    pub key: u64,
    pub value_bits: u64,
    pub meta: SlotMeta,
}

impl Slot {
    pub fn occupied(key: u64, value_bits: u64) -> Self {
        Slot {
            key,
            value_bits,
            meta: SlotMeta::new().with_status(Status::Occupied),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.meta.status() == Status::Occupied
    }

    pub fn is_empty(&self) -> bool {
        self.meta.status() == Status::Empty
    }

    pub fn is_tombstone(&self) -> bool {
        self.meta.status() == Status::Tombstone
    }
}

/// Table header at the start of every buffer. Field order and widths are
/// the wire format: capacity threshold, live count, slot count, readonly
/// flag (0 or 1), each one 64-bit word.
#[derive(Clone, Copy, Zeroable, Pod, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Header {
    pub capacity: u64,
    pub len: u64,
    pub slots: u64,
    pub readonly: u64,
}

pub const HEADER_SIZE: usize = std::mem::size_of::<Header>();
pub const SLOT_SIZE: usize = std::mem::size_of::<Slot>();

/// Exact byte length of a table image holding `slots` slots.
pub const fn buffer_len(slots: usize) -> usize {
    HEADER_SIZE + slots * SLOT_SIZE
}

/// Overflow-checked [`buffer_len`] for slot counts read off the wire.
pub fn checked_buffer_len(slots: u64) -> Option<u64> {
    (SLOT_SIZE as u64)
        .checked_mul(slots)
        .and_then(|slot_bytes| slot_bytes.checked_add(HEADER_SIZE as u64))
}
