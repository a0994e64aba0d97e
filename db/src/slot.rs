// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::Error;
use byteorder::{BigEndian, ByteOrder};

/// Size of an encoded slot: one header byte plus an 8-byte payload.
pub const SLOT_SIZE: u64 = 9;

/// Discriminant of the 9-byte slot word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Tag {
    #[default]
    None = 0,
    Index = 1,
    ArrayList = 2,
    LinkedArrayList = 3,
    HashMap = 4,
    KvPair = 5,
    Bytes = 6,
    ShortBytes = 7,
    Uint = 8,
    Int = 9,
    Float = 10,
    HashSet = 11,
    CountedHashMap = 12,
    CountedHashSet = 13,
}

impl Tag {
    pub(crate) fn from_u8(n: u8) -> Result<Tag, Error> {
        Ok(match n {
            0 => Tag::None,
            1 => Tag::Index,
            2 => Tag::ArrayList,
            3 => Tag::LinkedArrayList,
            4 => Tag::HashMap,
            5 => Tag::KvPair,
            6 => Tag::Bytes,
            7 => Tag::ShortBytes,
            8 => Tag::Uint,
            9 => Tag::Int,
            10 => Tag::Float,
            11 => Tag::HashSet,
            12 => Tag::CountedHashMap,
            13 => Tag::CountedHashSet,
            _ => return Err(Error::UnexpectedTag),
        })
    }

    /// True for the four hash-collection tags.
    pub(crate) fn is_hash_collection(self) -> bool {
        matches!(
            self,
            Tag::HashMap | Tag::HashSet | Tag::CountedHashMap | Tag::CountedHashSet
        )
    }

    /// True for hash collections carrying an 8-byte population counter.
    pub(crate) fn is_counted(self) -> bool {
        matches!(self, Tag::CountedHashMap | Tag::CountedHashSet)
    }
}

/// The 9-byte tagged word that is the universal value carrier.
///
/// The `full` bit's meaning depends on the tag: format-tag marker for byte
/// payloads, explicit-null marker for empty slots, packing seal for
/// linked-array-list subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub value: i64,
    pub tag: Tag,
    pub full: bool,
}

impl Slot {
    pub fn new(tag: Tag, value: i64) -> Self {
        Slot {
            value,
            tag,
            full: false,
        }
    }

    /// A slot that has never been written.
    pub fn empty() -> Self {
        Slot::default()
    }

    /// Unused and not intentionally null.
    pub fn is_empty(&self) -> bool {
        self.tag == Tag::None && !self.full
    }

    pub fn encode(&self) -> [u8; SLOT_SIZE as usize] {
        let mut buf = [0u8; SLOT_SIZE as usize];
        buf[0] = (self.tag as u8) | if self.full { 0x80 } else { 0 };
        BigEndian::write_i64(&mut buf[1..], self.value);
        buf
    }

    pub fn decode(buf: &[u8; SLOT_SIZE as usize]) -> Result<Self, Error> {
        Ok(Slot {
            value: BigEndian::read_i64(&buf[1..]),
            tag: Tag::from_u8(buf[0] & 0x7f)?,
            full: buf[0] & 0x80 != 0,
        })
    }

    /// The file offset carried by pointer-bearing tags.
    pub(crate) fn offset(&self) -> Result<u64, Error> {
        if self.value < 0 {
            return Err(Error::ExpectedUnsignedLong);
        }
        Ok(self.value as u64)
    }
}

/// Where a slot lives: its byte position in the file, and the decoded slot.
///
/// A `None` position marks the root, which is addressed through the file
/// header rather than through a slot in a block, and is therefore not
/// writeable as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPointer {
    pub position: Option<u64>,
    pub slot: Slot,
}

impl SlotPointer {
    pub(crate) fn new(position: u64, slot: Slot) -> Self {
        SlotPointer {
            position: Some(position),
            slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_symmetric() {
        let slot = Slot {
            value: -99,
            tag: Tag::Int,
            full: false,
        };
        assert_eq!(Slot::decode(&slot.encode()).unwrap(), slot);

        let slot = Slot {
            value: i64::MAX,
            tag: Tag::CountedHashSet,
            full: true,
        };
        let buf = slot.encode();
        assert_eq!(buf[0], 13 | 0x80);
        assert_eq!(Slot::decode(&buf).unwrap(), slot);
    }

    #[test]
    fn rejects_unknown_tags() {
        let mut buf = Slot::empty().encode();
        buf[0] = 14;
        assert_eq!(Slot::decode(&buf), Err(Error::UnexpectedTag));
    }

    #[test]
    fn empty_is_not_null() {
        assert!(Slot::empty().is_empty());
        let null = Slot {
            value: 0,
            tag: Tag::None,
            full: true,
        };
        assert!(!null.is_empty());
    }
}
