// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::Error;
use crate::slot::{Slot, Tag, SLOT_SIZE};
use burl_store::Store;

pub(crate) const MAGIC: [u8; 3] = *b"xit";
pub(crate) const VERSION: u16 = 0;
/// Size of the fixed file header.
pub const HEADER_LENGTH: u64 = 12;

/// File header: magic, root tag, format version, digest geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DatabaseHeader {
    pub tag: Tag,
    pub version: u16,
    pub hash_size: u16,
    pub hash_id: u32,
}

impl DatabaseHeader {
    pub fn read<S: Store>(store: &S) -> Result<Self, Error> {
        store.seek(0)?;
        let mut magic = [0u8; 3];
        store.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::InvalidDatabase);
        }
        let tag = Tag::from_u8(store.read_u8()? & 0x7f)?;
        Ok(DatabaseHeader {
            tag,
            version: store.read_u16()?,
            hash_size: store.read_u16()?,
            hash_id: store.read_u32()?,
        })
    }

    pub fn write<S: Store>(&self, store: &S) -> Result<(), Error> {
        store.seek(0)?;
        store.write_all(&MAGIC)?;
        store.write_u8(self.tag as u8)?;
        store.write_u16(self.version)?;
        store.write_u16(self.hash_size)?;
        store.write_u32(self.hash_id)?;
        Ok(())
    }

    /// Rewrite only the root tag byte.
    pub fn write_tag<S: Store>(&self, store: &S) -> Result<(), Error> {
        store.seek(3)?;
        store.write_u8(self.tag as u8)?;
        Ok(())
    }
}

/// Radix array-list header: element count, then root block pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArrayListHeader {
    pub size: u64,
    pub ptr: u64,
}

impl ArrayListHeader {
    pub const SIZE: u64 = 16;

    pub fn read<S: Store>(store: &S, pos: u64) -> Result<Self, Error> {
        store.seek(pos)?;
        let size = store.read_i64()?;
        let ptr = store.read_i64()?;
        if size < 0 || ptr < 0 {
            return Err(Error::ExpectedUnsignedLong);
        }
        Ok(ArrayListHeader {
            size: size as u64,
            ptr: ptr as u64,
        })
    }

    pub fn write<S: Store>(&self, store: &S, pos: u64) -> Result<(), Error> {
        store.seek(pos)?;
        store.write_i64(self.size as i64)?;
        store.write_i64(self.ptr as i64)?;
        Ok(())
    }
}

/// Top-level variant: the committed file size precedes the list header.
///
/// `file_size` is the durable commit pointer used for crash truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TopArrayListHeader {
    pub file_size: u64,
    pub list: ArrayListHeader,
}

impl TopArrayListHeader {
    pub const SIZE: u64 = 8 + ArrayListHeader::SIZE;

    pub fn read<S: Store>(store: &S, pos: u64) -> Result<Self, Error> {
        store.seek(pos)?;
        let file_size = store.read_u64()?;
        Ok(TopArrayListHeader {
            file_size,
            list: ArrayListHeader::read(store, pos + 8)?,
        })
    }

    pub fn write<S: Store>(&self, store: &S, pos: u64) -> Result<(), Error> {
        store.seek(pos)?;
        store.write_u64(self.file_size)?;
        self.list.write(store, pos + 8)
    }
}

/// Linked-array-list header: element count, root block pointer, tree depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LinkedArrayListHeader {
    pub size: u64,
    pub ptr: u64,
    pub shift: u8,
}

impl LinkedArrayListHeader {
    pub const SIZE: u64 = 17;

    pub fn read<S: Store>(store: &S, pos: u64) -> Result<Self, Error> {
        store.seek(pos)?;
        let size = store.read_i64()?;
        let ptr = store.read_i64()?;
        if size < 0 || ptr < 0 {
            return Err(Error::ExpectedUnsignedLong);
        }
        let shift = store.read_u8()? & 0x3f;
        Ok(LinkedArrayListHeader {
            size: size as u64,
            ptr: ptr as u64,
            shift,
        })
    }

    pub fn write<S: Store>(&self, store: &S, pos: u64) -> Result<(), Error> {
        store.seek(pos)?;
        store.write_i64(self.size as i64)?;
        store.write_i64(self.ptr as i64)?;
        store.write_u8(self.shift & 0x3f)?;
        Ok(())
    }
}

/// One entry of a linked-array-list block: a slot plus the leaf count of the
/// subtree behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct LinkedArrayListSlot {
    pub slot: Slot,
    pub count: u64,
}

impl LinkedArrayListSlot {
    pub const SIZE: u64 = SLOT_SIZE + 8;

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        let mut slot_buf = [0u8; SLOT_SIZE as usize];
        slot_buf.copy_from_slice(&buf[..SLOT_SIZE as usize]);
        let mut count_buf = [0u8; 8];
        count_buf.copy_from_slice(&buf[SLOT_SIZE as usize..Self::SIZE as usize]);
        Ok(LinkedArrayListSlot {
            slot: Slot::decode(&slot_buf)?,
            count: u64::from_be_bytes(count_buf),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..SLOT_SIZE as usize].copy_from_slice(&self.slot.encode());
        buf[SLOT_SIZE as usize..Self::SIZE as usize].copy_from_slice(&self.count.to_be_bytes());
    }
}

/// Key/value-pair record: digest, then key and value slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyValuePair {
    pub hash: Vec<u8>,
    pub key_slot: Slot,
    pub value_slot: Slot,
}

impl KeyValuePair {
    pub fn size(hash_size: u16) -> u64 {
        hash_size as u64 + 2 * SLOT_SIZE
    }

    pub fn key_slot_pos(pos: u64, hash_size: u16) -> u64 {
        pos + hash_size as u64
    }

    pub fn value_slot_pos(pos: u64, hash_size: u16) -> u64 {
        pos + hash_size as u64 + SLOT_SIZE
    }

    pub fn read<S: Store>(store: &S, pos: u64, hash_size: u16) -> Result<Self, Error> {
        store.seek(pos)?;
        let mut hash = vec![0u8; hash_size as usize];
        store.read_exact(&mut hash)?;
        let mut buf = [0u8; SLOT_SIZE as usize];
        store.read_exact(&mut buf)?;
        let key_slot = Slot::decode(&buf)?;
        store.read_exact(&mut buf)?;
        let value_slot = Slot::decode(&buf)?;
        Ok(KeyValuePair {
            hash,
            key_slot,
            value_slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burl_store::MemoryStore;

    #[test]
    fn database_header_symmetric() {
        let store = MemoryStore::new();
        let header = DatabaseHeader {
            tag: Tag::ArrayList,
            version: VERSION,
            hash_size: 20,
            hash_id: u32::from_be_bytes(*b"sha1"),
        };
        header.write(&store).unwrap();
        assert_eq!(store.len().unwrap(), HEADER_LENGTH);
        assert_eq!(DatabaseHeader::read(&store).unwrap(), header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let store = MemoryStore::new();
        store.write_all(b"nope00000000").unwrap();
        assert_eq!(DatabaseHeader::read(&store), Err(Error::InvalidDatabase));
    }

    #[test]
    fn top_array_list_header_symmetric() {
        let store = MemoryStore::new();
        let header = TopArrayListHeader {
            file_size: 180,
            list: ArrayListHeader { size: 3, ptr: 36 },
        };
        header.write(&store, 0).unwrap();
        assert_eq!(store.len().unwrap(), TopArrayListHeader::SIZE);
        assert_eq!(TopArrayListHeader::read(&store, 0).unwrap(), header);
    }

    #[test]
    fn linked_header_masks_shift() {
        let store = MemoryStore::new();
        let header = LinkedArrayListHeader {
            size: 7,
            ptr: 100,
            shift: 2,
        };
        header.write(&store, 0).unwrap();
        assert_eq!(store.len().unwrap(), LinkedArrayListHeader::SIZE);
        assert_eq!(LinkedArrayListHeader::read(&store, 0).unwrap(), header);
    }

    #[test]
    fn linked_slot_codec() {
        let entry = LinkedArrayListSlot {
            slot: Slot::new(Tag::Index, 272),
            count: 16,
        };
        let mut buf = [0u8; LinkedArrayListSlot::SIZE as usize];
        entry.encode(&mut buf);
        assert_eq!(LinkedArrayListSlot::decode(&buf).unwrap(), entry);
    }
}
