// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cursor::{ReadCursor, WriteCursor};
use crate::database::{Database, Mode, BIT_COUNT, INDEX_BLOCK_SIZE, MASK, SLOT_COUNT};
use crate::error::Error;
use crate::hash::Hasher;
use crate::header::{ArrayListHeader, TopArrayListHeader, HEADER_LENGTH};
use crate::iter::Iter;
use crate::path::{PathPart, Value};
use crate::slot::{Slot, SlotPointer, Tag, SLOT_SIZE};
use burl_store::Store;

/// Tree depth needed to address `key` in a 16-ary radix trie.
pub(crate) fn shift_for_key(key: u64) -> u32 {
    if key < SLOT_COUNT {
        0
    } else {
        (63 - key.leading_zeros()) / BIT_COUNT
    }
}

/// Resolve a possibly negative index against `size`; negative indexes wrap.
pub(crate) fn wrap_index(index: i64, size: u64) -> Result<u64, Error> {
    let key = if index < 0 {
        let back = index.unsigned_abs();
        if back > size {
            return Err(Error::KeyNotFound);
        }
        size - back
    } else {
        index as u64
    };
    if key >= size {
        return Err(Error::KeyNotFound);
    }
    Ok(key)
}

impl<S: Store, H: Hasher> Database<S, H> {
    /// Position of the 16-byte list header, accounting for the top-level
    /// layout where the committed file size comes first.
    pub(crate) fn array_list_header_pos(&self, ptr: &SlotPointer) -> Result<u64, Error> {
        if ptr.slot.tag != Tag::ArrayList {
            return Err(Error::UnexpectedTag);
        }
        match ptr.position {
            None => Ok(HEADER_LENGTH + 8),
            Some(_) => Ok(ptr.slot.offset()?),
        }
    }

    pub(crate) fn array_list_init(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
    ) -> Result<SlotPointer, Error> {
        if let Some(pos) = ptr.position {
            let slot = match ptr.slot.tag {
                Tag::None => {
                    let header_pos = self.store.len()?;
                    let header = ArrayListHeader {
                        size: 0,
                        ptr: header_pos + ArrayListHeader::SIZE,
                    };
                    header.write(&self.store, header_pos)?;
                    self.store.write_all(&[0u8; INDEX_BLOCK_SIZE as usize])?;
                    let slot = Slot::new(Tag::ArrayList, header_pos as i64);
                    self.write_slot(pos, slot)?;
                    slot
                }
                Tag::ArrayList => {
                    let header_pos = ptr.slot.offset()?;
                    if self.needs_copy(header_pos)? {
                        // copy the header and root block together
                        let header = ArrayListHeader::read(&self.store, header_pos)?;
                        let new_header_pos = self.store.len()?;
                        let copy = ArrayListHeader {
                            size: header.size,
                            ptr: new_header_pos + ArrayListHeader::SIZE,
                        };
                        copy.write(&self.store, new_header_pos)?;
                        let mut block = [0u8; INDEX_BLOCK_SIZE as usize];
                        self.store.seek(header.ptr)?;
                        self.store.read_exact(&mut block)?;
                        self.store.seek(copy.ptr)?;
                        self.store.write_all(&block)?;
                        let slot = Slot::new(Tag::ArrayList, new_header_pos as i64);
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

        // top level: anchored in the file header
        if ptr.slot.offset()? != HEADER_LENGTH {
            return Err(Error::ExpectedRootNode);
        }
        let mut header = self.header.get();
        match header.tag {
            Tag::None => {
                let top = TopArrayListHeader {
                    file_size: 0,
                    list: ArrayListHeader {
                        size: 0,
                        ptr: HEADER_LENGTH + TopArrayListHeader::SIZE,
                    },
                };
                top.write(&self.store, HEADER_LENGTH)?;
                self.store.write_all(&[0u8; INDEX_BLOCK_SIZE as usize])?;
                header.tag = Tag::ArrayList;
                header.write_tag(&self.store)?;
                self.header.set(header);
                self.store.flush()?;
            }
            Tag::ArrayList => {}
            _ => return Err(Error::UnexpectedTag),
        }

        // the first top-level encounter frames the transaction
        let started_tx = self.tx_start.get().is_none();
        if started_tx {
            self.tx_start.set(Some(self.store.len()?));
        }
        let next = SlotPointer {
            position: None,
            slot: Slot::new(Tag::ArrayList, HEADER_LENGTH as i64),
        };
        let result = self.execute(mode, path, idx + 1, next);
        if started_tx {
            self.tx_start.set(None);
            if result.is_ok() {
                // commit: extend the durable file size past this
                // transaction's blocks, then persist
                let len = self.store.len()?;
                self.store.seek(HEADER_LENGTH)?;
                self.store.write_u64(len)?;
                self.store.flush()?;
                self.store.sync()?;
            }
        }
        result
    }

    pub(crate) fn array_list_get(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        index: i64,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.array_list_header_pos(&ptr)?;
        let header = ArrayListHeader::read(&self.store, header_pos)?;
        let key = wrap_index(index, header.size)?;
        let shift = shift_for_key(header.size - 1);

        let mut block_pos = header.ptr;
        if mode == Mode::ReadWrite && self.needs_copy(block_pos)? {
            block_pos = self.copy_block(block_pos, INDEX_BLOCK_SIZE)?;
            // the root block's parent slot is the header's pointer field
            self.store.seek(header_pos + 8)?;
            self.store.write_i64(block_pos as i64)?;
        }
        let mut level = shift;
        loop {
            let digit = (key >> (level * BIT_COUNT)) & MASK;
            let slot_pos = block_pos + digit * SLOT_SIZE;
            let slot = self.read_slot(slot_pos)?;
            if level == 0 {
                return self.execute(mode, path, idx + 1, SlotPointer::new(slot_pos, slot));
            }
            if slot.tag == Tag::None {
                return Err(Error::KeyNotFound);
            }
            if slot.tag != Tag::Index {
                return Err(Error::UnexpectedTag);
            }
            let mut child_pos = slot.offset()?;
            if mode == Mode::ReadWrite && self.needs_copy(child_pos)? {
                child_pos = self.copy_block(child_pos, INDEX_BLOCK_SIZE)?;
                self.write_slot(slot_pos, Slot::new(Tag::Index, child_pos as i64))?;
            }
            block_pos = child_pos;
            level -= 1;
        }
    }

    pub(crate) fn array_list_append(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
    ) -> Result<SlotPointer, Error> {
        let top_level = ptr.position.is_none();
        let header_pos = self.array_list_header_pos(&ptr)?;
        let mut header = ArrayListHeader::read(&self.store, header_pos)?;
        let key = header.size;

        // promote the root when the new key crosses into a higher shift
        let shift = shift_for_key(key);
        if key > 0 && shift > shift_for_key(key - 1) {
            let new_root = self.store.len()?;
            let mut block = [0u8; INDEX_BLOCK_SIZE as usize];
            block[..SLOT_SIZE as usize]
                .copy_from_slice(&Slot::new(Tag::Index, header.ptr as i64).encode());
            self.store.seek(new_root)?;
            self.store.write_all(&block)?;
            header.ptr = new_root;
        } else if self.needs_copy(header.ptr)? {
            header.ptr = self.copy_block(header.ptr, INDEX_BLOCK_SIZE)?;
        }

        // descend into the new leaf, creating empty blocks along the way
        let mut block_pos = header.ptr;
        let mut level = shift;
        let leaf = loop {
            let digit = (key >> (level * BIT_COUNT)) & MASK;
            let slot_pos = block_pos + digit * SLOT_SIZE;
            if level == 0 {
                // clear any stale slot left behind by an earlier slice
                let slot = self.read_slot(slot_pos)?;
                if slot != Slot::empty() {
                    self.write_slot(slot_pos, Slot::empty())?;
                }
                break SlotPointer::new(slot_pos, Slot::empty());
            }
            let slot = self.read_slot(slot_pos)?;
            block_pos = match slot.tag {
                Tag::None => {
                    let child = self.alloc_block(INDEX_BLOCK_SIZE)?;
                    self.write_slot(slot_pos, Slot::new(Tag::Index, child as i64))?;
                    child
                }
                Tag::Index => {
                    let mut child = slot.offset()?;
                    if self.needs_copy(child)? {
                        child = self.copy_block(child, INDEX_BLOCK_SIZE)?;
                        self.write_slot(slot_pos, Slot::new(Tag::Index, child as i64))?;
                    }
                    child
                }
                _ => return Err(Error::UnexpectedTag),
            };
            level -= 1;
        };

        header.size += 1;
        if top_level {
            // defer the header rewrite until the rest of the path lands, so
            // an aborted transaction never publishes the new root; the
            // framing ArrayListInit extends the committed file size once the
            // whole path is done
            let result = self.execute(mode, path, idx + 1, leaf);
            if result.is_ok() {
                header.write(&self.store, header_pos)?;
            }
            result
        } else {
            header.write(&self.store, header_pos)?;
            self.execute(mode, path, idx + 1, leaf)
        }
    }

    pub(crate) fn array_list_slice(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        new_size: u64,
    ) -> Result<SlotPointer, Error> {
        let top_level = ptr.position.is_none();
        let header_pos = self.array_list_header_pos(&ptr)?;
        let mut header = ArrayListHeader::read(&self.store, header_pos)?;
        if new_size > header.size {
            return Err(Error::KeyNotFound);
        }

        // walk down the leftmost spine until the new shift is reached; the
        // abandoned blocks are not reclaimed
        let old_shift = shift_for_key(header.size.saturating_sub(1));
        let new_shift = shift_for_key(new_size.saturating_sub(1));
        for _ in new_shift..old_shift {
            let slot = self.read_slot(header.ptr)?;
            if slot.tag != Tag::Index {
                return Err(Error::UnexpectedTag);
            }
            header.ptr = slot.offset()?;
        }
        header.size = new_size;

        if top_level {
            let result = self.execute(mode, path, idx + 1, ptr);
            if result.is_ok() {
                header.write(&self.store, header_pos)?;
            }
            result
        } else {
            header.write(&self.store, header_pos)?;
            self.execute(mode, path, idx + 1, ptr)
        }
    }
}

/// Read view over a radix array list.
pub struct ArrayList<'a, S, H> {
    cursor: ReadCursor<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> ArrayList<'a, S, H> {
    pub fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        match cursor.slot().tag {
            Tag::ArrayList | Tag::None => Ok(ArrayList { cursor }),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.cursor.refreshed()?.count()
    }

    pub fn get(&self, index: i64) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        let cursor = self.cursor.refreshed()?;
        if cursor.slot().tag == Tag::None {
            return Ok(None);
        }
        cursor.read_path(&[PathPart::ArrayListGet(index)])
    }

    pub fn get_slot(&self, index: i64) -> Result<Option<Slot>, Error> {
        Ok(self.get(index)?.map(|c| c.slot()))
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.cursor.iter()
    }

    pub fn cursor(&self) -> ReadCursor<'a, S, H> {
        self.cursor
    }
}

/// Write view over a radix array list; construction materializes the list
/// at the cursor's slot.
pub struct ArrayListMut<'a, S, H> {
    cursor: WriteCursor<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> ArrayListMut<'a, S, H> {
    pub fn new(cursor: WriteCursor<'a, S, H>) -> Result<Self, Error> {
        let cursor = cursor.write_path(&[PathPart::ArrayListInit])?;
        Ok(ArrayListMut { cursor })
    }

    pub fn read_only(&self) -> ArrayList<'a, S, H> {
        ArrayList {
            cursor: self.cursor.read_only(),
        }
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.read_only().count()
    }

    pub fn get(&self, index: i64) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.read_only().get(index)
    }

    pub fn get_slot(&self, index: i64) -> Result<Option<Slot>, Error> {
        self.read_only().get_slot(index)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.read_only().iter()
    }

    pub fn append(&mut self, value: Value<'_>) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::ArrayListInit,
            PathPart::ArrayListAppend,
            PathPart::WriteData(value),
        ])?;
        Ok(())
    }

    /// Append an empty slot and return a cursor over it.
    pub fn append_cursor(&mut self) -> Result<WriteCursor<'a, S, H>, Error> {
        self.cursor
            .write_path(&[PathPart::ArrayListInit, PathPart::ArrayListAppend])
    }

    /// Append a new element seeded from `seed` and run `f` over it as one
    /// atomic transaction: if `f` fails, nothing is committed.
    ///
    /// Seeding from the previous element's slot makes the new element a
    /// copy-on-write snapshot sharing all unchanged subtrees.
    pub fn append_context<F>(&mut self, seed: Option<Slot>, f: F) -> Result<(), Error>
    where
        F: for<'c> Fn(WriteCursor<'c, S, H>) -> Result<(), Error>,
    {
        match seed {
            Some(slot) => self.cursor.write_path(&[
                PathPart::ArrayListInit,
                PathPart::ArrayListAppend,
                PathPart::WriteData(Value::Slot(slot)),
                PathPart::Context(&f),
            ])?,
            None => self.cursor.write_path(&[
                PathPart::ArrayListInit,
                PathPart::ArrayListAppend,
                PathPart::Context(&f),
            ])?,
        };
        Ok(())
    }

    pub fn put(&mut self, index: i64, value: Value<'_>) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::ArrayListInit,
            PathPart::ArrayListGet(index),
            PathPart::WriteData(value),
        ])?;
        Ok(())
    }

    pub fn put_cursor(&mut self, index: i64) -> Result<WriteCursor<'a, S, H>, Error> {
        self.cursor
            .write_path(&[PathPart::ArrayListInit, PathPart::ArrayListGet(index)])
    }

    /// Shrink the list to its first `size` elements.
    pub fn slice(&mut self, size: u64) -> Result<(), Error> {
        self.cursor
            .write_path(&[PathPart::ArrayListInit, PathPart::ArrayListSlice(size)])?;
        Ok(())
    }

    pub fn cursor(&self) -> WriteCursor<'a, S, H> {
        self.cursor
    }
}
