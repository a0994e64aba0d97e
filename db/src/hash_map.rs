// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cursor::{KeyValuePairCursor, ReadCursor, WriteCursor};
use crate::database::{Database, Mode, INDEX_BLOCK_SIZE, SLOT_COUNT};
use crate::error::Error;
use crate::hash::Hasher;
use crate::header::KeyValuePair;
use crate::iter::Iter;
use crate::path::{HashTarget, PathPart, Value};
use crate::slot::{Slot, SlotPointer, Tag, SLOT_SIZE};
use burl_store::Store;

/// The 4-bit digit consumed at `depth`: the digest is a big-endian unsigned
/// integer and digits are taken from its least significant end, i.e. from
/// the final digest byte upward.
pub(crate) fn hash_digit(hash: &[u8], depth: u32) -> u64 {
    let byte = hash[hash.len() - 1 - (depth / 2) as usize];
    u64::from(if depth % 2 == 0 { byte & 0x0f } else { byte >> 4 })
}

impl<S: Store, H: Hasher> Database<S, H> {
    /// Base position of a hash collection; the root index block follows the
    /// 8-byte population counter on counted flavors.
    pub(crate) fn hash_collection_base(&self, ptr: &SlotPointer) -> Result<(Tag, u64), Error> {
        if !ptr.slot.tag.is_hash_collection() {
            return Err(Error::UnexpectedTag);
        }
        Ok((ptr.slot.tag, ptr.slot.offset()?))
    }

    fn bump_count(&self, base: u64, delta: i64) -> Result<(), Error> {
        self.store.seek(base)?;
        let count = self.store.read_u64()? as i64 + delta;
        self.store.seek(base)?;
        self.store.write_u64(count as u64)?;
        Ok(())
    }

    pub(crate) fn hash_map_init(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        counted: bool,
        set: bool,
    ) -> Result<SlotPointer, Error> {
        let tag = match (counted, set) {
            (false, false) => Tag::HashMap,
            (false, true) => Tag::HashSet,
            (true, false) => Tag::CountedHashMap,
            (true, true) => Tag::CountedHashSet,
        };
        let prefix = if counted { 8 } else { 0 };

        if let Some(pos) = ptr.position {
            let slot = match ptr.slot.tag {
                Tag::None => {
                    let base = self.store.len()?;
                    self.store.seek(base)?;
                    if counted {
                        self.store.write_u64(0)?;
                    }
                    self.store.write_all(&[0u8; INDEX_BLOCK_SIZE as usize])?;
                    let slot = Slot::new(tag, base as i64);
                    self.write_slot(pos, slot)?;
                    slot
                }
                t if t == tag => {
                    let base = ptr.slot.offset()?;
                    if self.needs_copy(base)? {
                        let new_base = self.copy_block(base, prefix + INDEX_BLOCK_SIZE)?;
                        let slot = Slot::new(tag, new_base as i64);
                        self.write_slot(pos, slot)?;
                        slot
                    } else {
                        ptr.slot
                    }
                }
                _ => return Err(Error::UnexpectedTag),
            };
            return self.execute(mode, path, idx + 1, SlotPointer::new(pos, slot));
        }

        // top level: anchored in the file header, rewritten in place
        if ptr.slot.offset()? != crate::header::HEADER_LENGTH {
            return Err(Error::ExpectedRootNode);
        }
        let mut header = self.header.get();
        match header.tag {
            Tag::None => {
                self.store.seek(crate::header::HEADER_LENGTH)?;
                if counted {
                    self.store.write_u64(0)?;
                }
                self.store.write_all(&[0u8; INDEX_BLOCK_SIZE as usize])?;
                header.tag = tag;
                header.write_tag(&self.store)?;
                self.header.set(header);
                self.store.flush()?;
            }
            t if t == tag => {}
            _ => return Err(Error::UnexpectedTag),
        }
        let next = SlotPointer {
            position: None,
            slot: Slot::new(tag, crate::header::HEADER_LENGTH as i64),
        };
        self.execute(mode, path, idx + 1, next)
    }

    pub(crate) fn hash_map_get(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        target: HashTarget,
        hash: &[u8],
    ) -> Result<SlotPointer, Error> {
        let hash_size = self.hash_size();
        if hash.len() != hash_size as usize {
            return Err(Error::InvalidHashSize);
        }
        let (tag, base) = self.hash_collection_base(&ptr)?;
        let mut block_pos = base + if tag.is_counted() { 8 } else { 0 };
        let max_depth = hash.len() as u32 * 2;
        let mut depth = 0;

        loop {
            if depth >= max_depth {
                return Err(Error::KeyOffsetExceeded);
            }
            let slot_pos = block_pos + hash_digit(hash, depth) * SLOT_SIZE;
            let slot = self.read_slot(slot_pos)?;
            match slot.tag {
                Tag::None => {
                    if mode == Mode::ReadOnly {
                        return Err(Error::KeyNotFound);
                    }
                    // first sighting of this digest: allocate a fresh pair
                    let rec_pos = self.store.len()?;
                    self.store.seek(rec_pos)?;
                    self.store.write_all(hash)?;
                    self.store.write_all(&Slot::empty().encode())?;
                    self.store.write_all(&Slot::empty().encode())?;
                    let pair_slot = Slot::new(Tag::KvPair, rec_pos as i64);
                    self.write_slot(slot_pos, pair_slot)?;
                    if tag.is_counted() {
                        self.bump_count(base, 1)?;
                    }
                    let next = match target {
                        HashTarget::KvPair => SlotPointer::new(slot_pos, pair_slot),
                        HashTarget::Key => SlotPointer::new(
                            KeyValuePair::key_slot_pos(rec_pos, hash_size),
                            Slot::empty(),
                        ),
                        HashTarget::Value => SlotPointer::new(
                            KeyValuePair::value_slot_pos(rec_pos, hash_size),
                            Slot::empty(),
                        ),
                    };
                    return self.execute(mode, path, idx + 1, next);
                }
                Tag::Index => {
                    let mut child = slot.offset()?;
                    if mode == Mode::ReadWrite && self.needs_copy(child)? {
                        child = self.copy_block(child, INDEX_BLOCK_SIZE)?;
                        self.write_slot(slot_pos, Slot::new(Tag::Index, child as i64))?;
                    }
                    block_pos = child;
                    depth += 1;
                }
                Tag::KvPair => {
                    let mut rec_pos = slot.offset()?;
                    let rec = KeyValuePair::read(&self.store, rec_pos, hash_size)?;
                    if rec.hash == hash {
                        if mode == Mode::ReadWrite && self.needs_copy(rec_pos)? {
                            rec_pos = self.copy_block(rec_pos, KeyValuePair::size(hash_size))?;
                            self.write_slot(
                                slot_pos,
                                Slot {
                                    value: rec_pos as i64,
                                    tag: Tag::KvPair,
                                    full: slot.full,
                                },
                            )?;
                        }
                        let next = match target {
                            HashTarget::KvPair => SlotPointer::new(
                                slot_pos,
                                Slot {
                                    value: rec_pos as i64,
                                    tag: Tag::KvPair,
                                    full: slot.full,
                                },
                            ),
                            HashTarget::Key => SlotPointer::new(
                                KeyValuePair::key_slot_pos(rec_pos, hash_size),
                                rec.key_slot,
                            ),
                            HashTarget::Value => SlotPointer::new(
                                KeyValuePair::value_slot_pos(rec_pos, hash_size),
                                rec.value_slot,
                            ),
                        };
                        return self.execute(mode, path, idx + 1, next);
                    }
                    // collision on this prefix: push the resident pair one
                    // level deeper and retry from the new block
                    if mode == Mode::ReadOnly {
                        return Err(Error::KeyNotFound);
                    }
                    if depth + 1 >= max_depth {
                        return Err(Error::KeyOffsetExceeded);
                    }
                    let new_block = self.alloc_block(INDEX_BLOCK_SIZE)?;
                    let old_digit = hash_digit(&rec.hash, depth + 1);
                    self.write_slot(new_block + old_digit * SLOT_SIZE, slot)?;
                    self.write_slot(slot_pos, Slot::new(Tag::Index, new_block as i64))?;
                    block_pos = new_block;
                    depth += 1;
                }
                _ => return Err(Error::UnexpectedTag),
            }
        }
    }

    pub(crate) fn hash_map_remove(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        hash: &[u8],
    ) -> Result<SlotPointer, Error> {
        let hash_size = self.hash_size();
        if hash.len() != hash_size as usize {
            return Err(Error::InvalidHashSize);
        }
        let (tag, base) = self.hash_collection_base(&ptr)?;
        let mut block_pos = base + if tag.is_counted() { 8 } else { 0 };
        let max_depth = hash.len() as u32 * 2;
        let mut depth = 0;

        // descend to the pair, copying committed blocks as we go
        let mut parents: Vec<(u64, u64)> = Vec::new();
        loop {
            if depth >= max_depth {
                return Err(Error::KeyOffsetExceeded);
            }
            let slot_pos = block_pos + hash_digit(hash, depth) * SLOT_SIZE;
            let slot = self.read_slot(slot_pos)?;
            match slot.tag {
                Tag::None => return Err(Error::KeyNotFound),
                Tag::Index => {
                    let mut child = slot.offset()?;
                    if self.needs_copy(child)? {
                        child = self.copy_block(child, INDEX_BLOCK_SIZE)?;
                        self.write_slot(slot_pos, Slot::new(Tag::Index, child as i64))?;
                    }
                    parents.push((block_pos, slot_pos));
                    block_pos = child;
                    depth += 1;
                }
                Tag::KvPair => {
                    let rec = KeyValuePair::read(&self.store, slot.offset()?, hash_size)?;
                    if rec.hash != hash {
                        return Err(Error::KeyNotFound);
                    }
                    self.write_slot(slot_pos, Slot::empty())?;
                    break;
                }
                _ => return Err(Error::UnexpectedTag),
            }
        }
        if tag.is_counted() {
            self.bump_count(base, -1)?;
        }

        // walk back up, flattening blocks left with a single pair
        let mut child_block = block_pos;
        while let Some((parent_block, parent_slot_pos)) = parents.pop() {
            let mut survivor = None;
            let mut used = 0;
            for i in 0..SLOT_COUNT {
                let slot = self.read_slot(child_block + i * SLOT_SIZE)?;
                if !slot.is_empty() {
                    used += 1;
                    if used == 1 {
                        survivor = Some(slot);
                    }
                }
            }
            match (used, survivor) {
                (0, _) => self.write_slot(parent_slot_pos, Slot::empty())?,
                (1, Some(slot)) if slot.tag == Tag::KvPair => {
                    self.write_slot(parent_slot_pos, slot)?
                }
                _ => break,
            }
            child_block = parent_block;
        }

        self.execute(mode, path, idx + 1, ptr)
    }
}

/// Read view over a hash map.
pub struct HashMap<'a, S, H> {
    cursor: ReadCursor<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> HashMap<'a, S, H> {
    pub fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        match cursor.slot().tag {
            Tag::HashMap | Tag::CountedHashMap | Tag::None => Ok(HashMap { cursor }),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub(crate) fn wrap(cursor: ReadCursor<'a, S, H>) -> Self {
        HashMap { cursor }
    }

    /// Cursor over the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.get_hashed(&H::digest(key))
    }

    pub fn get_hashed(&self, hash: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.lookup(HashTarget::Value, hash)
    }

    /// Cursor over the stored key bytes for `key`.
    pub fn get_key(&self, key: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.lookup(HashTarget::Key, &H::digest(key))
    }

    pub fn get_key_value_pair(
        &self,
        key: &[u8],
    ) -> Result<Option<KeyValuePairCursor<'a, S, H>>, Error> {
        match self.lookup(HashTarget::KvPair, &H::digest(key))? {
            Some(cursor) => Ok(Some(cursor.read_key_value_pair()?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }

    /// Iterate over the map's key/value pairs in block order.
    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.cursor.iter()
    }

    pub fn cursor(&self) -> ReadCursor<'a, S, H> {
        self.cursor
    }

    fn lookup(
        &self,
        target: HashTarget,
        hash: &[u8],
    ) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        let cursor = self.cursor.refreshed()?;
        if cursor.slot().tag == Tag::None {
            return Ok(None);
        }
        cursor.read_path(&[PathPart::HashMapGet { target, hash }])
    }
}

/// Write view over a hash map; construction materializes the map at the
/// cursor's slot.
pub struct HashMapMut<'a, S, H> {
    cursor: WriteCursor<'a, S, H>,
    counted: bool,
}

impl<'a, S: Store, H: Hasher> HashMapMut<'a, S, H> {
    pub fn new(cursor: WriteCursor<'a, S, H>) -> Result<Self, Error> {
        Self::init(cursor, false)
    }

    pub(crate) fn init(cursor: WriteCursor<'a, S, H>, counted: bool) -> Result<Self, Error> {
        let cursor = cursor.write_path(&[PathPart::HashMapInit {
            counted,
            set: false,
        }])?;
        Ok(HashMapMut { cursor, counted })
    }

    pub fn read_only(&self) -> HashMap<'a, S, H> {
        HashMap::wrap(self.cursor.read_only())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.read_only().get(key)
    }

    pub fn get_key(&self, key: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.read_only().get_key(key)
    }

    pub fn get_key_value_pair(
        &self,
        key: &[u8],
    ) -> Result<Option<KeyValuePairCursor<'a, S, H>>, Error> {
        self.read_only().get_key_value_pair(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        self.read_only().contains(key)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.read_only().iter()
    }

    /// Record `key` and store `value` under it.
    pub fn put(&mut self, key: &[u8], value: Value<'_>) -> Result<(), Error> {
        self.put_hashed(&H::digest(key), Value::Bytes(key), value)
    }

    /// Store `value` under a caller-supplied digest; `key` is recorded only
    /// if the digest is new.
    pub fn put_hashed(
        &mut self,
        hash: &[u8],
        key: Value<'_>,
        value: Value<'_>,
    ) -> Result<(), Error> {
        let mut key_cursor = self.cursor.write_path(&[
            self.init_part(),
            PathPart::HashMapGet {
                target: HashTarget::Key,
                hash,
            },
        ])?;
        key_cursor.write_if_empty(key)?;
        self.cursor.write_path(&[
            self.init_part(),
            PathPart::HashMapGet {
                target: HashTarget::Value,
                hash,
            },
            PathPart::WriteData(value),
        ])?;
        Ok(())
    }

    /// Ensure `key` is recorded and return a cursor over its value slot.
    pub fn put_cursor(&mut self, key: &[u8]) -> Result<WriteCursor<'a, S, H>, Error> {
        let hash = H::digest(key);
        let mut key_cursor = self.cursor.write_path(&[
            self.init_part(),
            PathPart::HashMapGet {
                target: HashTarget::Key,
                hash: &hash,
            },
        ])?;
        key_cursor.write_if_empty(Value::Bytes(key))?;
        self.cursor.write_path(&[
            self.init_part(),
            PathPart::HashMapGet {
                target: HashTarget::Value,
                hash: &hash,
            },
        ])
    }

    /// Store `value` only when `key` is absent; reports whether it wrote.
    pub fn put_if_empty(&mut self, key: &[u8], value: Value<'_>) -> Result<bool, Error> {
        if self.contains(key)? {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    /// Remove `key`, reporting whether it was present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool, Error> {
        self.remove_hashed(&H::digest(key))
    }

    pub fn remove_hashed(&mut self, hash: &[u8]) -> Result<bool, Error> {
        match self
            .cursor
            .write_path(&[self.init_part(), PathPart::HashMapRemove(hash)])
        {
            Ok(_) => Ok(true),
            Err(Error::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn cursor(&self) -> WriteCursor<'a, S, H> {
        self.cursor
    }

    fn init_part<'p>(&self) -> PathPart<'p, S, H> {
        PathPart::HashMapInit {
            counted: self.counted,
            set: false,
        }
    }
}

/// Read view over a hash map carrying a population counter.
pub struct CountedHashMap<'a, S, H> {
    inner: HashMap<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> CountedHashMap<'a, S, H> {
    pub fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        match cursor.slot().tag {
            Tag::CountedHashMap | Tag::None => Ok(CountedHashMap {
                inner: HashMap::wrap(cursor),
            }),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.inner.cursor.refreshed()?.count()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        self.inner.contains(key)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.inner.iter()
    }
}

/// Write view over a counted hash map.
pub struct CountedHashMapMut<'a, S, H> {
    inner: HashMapMut<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> CountedHashMapMut<'a, S, H> {
    pub fn new(cursor: WriteCursor<'a, S, H>) -> Result<Self, Error> {
        Ok(CountedHashMapMut {
            inner: HashMapMut::init(cursor, true)?,
        })
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.inner.cursor.read_only().refreshed()?.count()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        self.inner.contains(key)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.inner.iter()
    }

    pub fn put(&mut self, key: &[u8], value: Value<'_>) -> Result<(), Error> {
        self.inner.put(key, value)
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<bool, Error> {
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_come_from_the_digest_tail() {
        let hash = [0xab, 0xcd, 0xef];
        assert_eq!(hash_digit(&hash, 0), 0xf);
        assert_eq!(hash_digit(&hash, 1), 0xe);
        assert_eq!(hash_digit(&hash, 2), 0xd);
        assert_eq!(hash_digit(&hash, 3), 0xc);
        assert_eq!(hash_digit(&hash, 4), 0xb);
        assert_eq!(hash_digit(&hash, 5), 0xa);
    }
}
