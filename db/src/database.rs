// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cursor::{ReadCursor, WriteCursor};
use crate::error::Error;
use crate::hash::Hasher;
use crate::header::{DatabaseHeader, HEADER_LENGTH, VERSION};
use crate::path::{ContextFn, PathPart, Value};
use crate::slot::{Slot, SlotPointer, Tag, SLOT_SIZE};
use burl_store::Store;
use log::{debug, warn};
use std::cell::Cell;
use std::marker::PhantomData;

/// Child slots per index block.
pub(crate) const SLOT_COUNT: u64 = 16;
/// Bits of key consumed per tree level.
pub(crate) const BIT_COUNT: u32 = 4;
pub(crate) const MASK: u64 = SLOT_COUNT - 1;
/// Radix/HAMT index block: 16 slots of 9 bytes.
pub(crate) const INDEX_BLOCK_SIZE: u64 = SLOT_COUNT * SLOT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    ReadOnly,
    ReadWrite,
}

/// The storage engine: owns the byte container and interprets path programs
/// against it.
///
/// Every mutation is copy-on-write: committed blocks are never rewritten,
/// updates allocate new blocks at the end of the file and rewrite only the
/// necessary parent slots. With an array-list root, writes run inside a
/// transaction framed by the top-level list and become durable when the
/// committed file size is extended past them.
pub struct Database<S, H> {
    pub(crate) store: S,
    pub(crate) header: Cell<DatabaseHeader>,
    pub(crate) tx_start: Cell<Option<u64>>,
    _hash: PhantomData<H>,
}

impl<S: Store, H: Hasher> Database<S, H> {
    /// Open a database over `store`: write a fresh header into an empty
    /// container, validate an existing one, then drop any uncommitted tail.
    pub fn open(store: S) -> Result<Self, Error> {
        if store.is_empty()? {
            let header = DatabaseHeader {
                tag: Tag::None,
                version: VERSION,
                hash_size: H::DIGEST_LENGTH,
                hash_id: u32::from_be_bytes(H::ID),
            };
            header.write(&store)?;
            store.flush()?;
            debug!("created database (digest width {})", H::DIGEST_LENGTH);
            return Ok(Database {
                store,
                header: Cell::new(header),
                tx_start: Cell::new(None),
                _hash: PhantomData,
            });
        }

        let header = DatabaseHeader::read(&store)?;
        if header.version > VERSION {
            return Err(Error::InvalidVersion);
        }
        if header.hash_size != H::DIGEST_LENGTH {
            return Err(Error::InvalidHashSize);
        }
        if header.hash_id != u32::from_be_bytes(H::ID) {
            warn!("hash id differs from the configured hasher, digest widths match");
        }
        let db = Database {
            store,
            header: Cell::new(header),
            tx_start: Cell::new(None),
            _hash: PhantomData,
        };
        db.truncate()?;
        debug!("opened database ({} bytes)", db.store.len()?);
        Ok(db)
    }

    /// Shrink the container to the last committed file size, discarding
    /// bytes written by an interrupted transaction.
    pub(crate) fn truncate(&self) -> Result<(), Error> {
        if self.header.get().tag != Tag::ArrayList {
            return Ok(());
        }
        self.store.seek(HEADER_LENGTH)?;
        let file_size = self.store.read_u64()?;
        let len = self.store.len()?;
        if file_size != 0 && file_size < len {
            warn!("truncating {} uncommitted bytes", len - file_size);
            self.store.set_len(file_size)?;
        }
        Ok(())
    }

    fn root_slot_ptr(&self) -> SlotPointer {
        SlotPointer {
            position: None,
            slot: Slot::new(self.header.get().tag, HEADER_LENGTH as i64),
        }
    }

    pub fn root_cursor(&self) -> ReadCursor<'_, S, H> {
        ReadCursor::new(self.root_slot_ptr(), self)
    }

    pub fn root_write_cursor(&self) -> WriteCursor<'_, S, H> {
        WriteCursor::new(self.root_slot_ptr(), self)
    }

    /// Digest `bytes` with the database's hasher.
    pub fn hash(bytes: &[u8]) -> Vec<u8> {
        H::digest(bytes)
    }

    pub(crate) fn hash_size(&self) -> u16 {
        self.header.get().hash_size
    }

    /// Mark everything written so far as committed for copy-on-write
    /// purposes, forcing later writes in the same transaction to copy even
    /// blocks the transaction itself allocated. Use after cloning a subtree
    /// by slot so the alias cannot be mutated in place.
    pub fn freeze(&self) -> Result<(), Error> {
        if self.tx_start.get().is_none() {
            return Err(Error::ExpectedTxStart);
        }
        self.tx_start.set(Some(self.store.len()?));
        Ok(())
    }

    /// Hand the container back, e.g. to reopen the same bytes.
    pub fn into_store(self) -> S {
        self.store
    }

    // ---- slot and block I/O ------------------------------------------------

    pub(crate) fn read_slot(&self, pos: u64) -> Result<Slot, Error> {
        self.store.seek(pos)?;
        let mut buf = [0u8; SLOT_SIZE as usize];
        self.store.read_exact(&mut buf)?;
        Slot::decode(&buf)
    }

    pub(crate) fn write_slot(&self, pos: u64, slot: Slot) -> Result<(), Error> {
        self.store.seek(pos)?;
        self.store.write_all(&slot.encode())?;
        Ok(())
    }

    /// Append a zeroed block of `len` bytes, returning its position.
    pub(crate) fn alloc_block(&self, len: u64) -> Result<u64, Error> {
        let pos = self.store.len()?;
        self.store.seek(pos)?;
        self.store.write_all(&vec![0u8; len as usize])?;
        Ok(pos)
    }

    /// Append a verbatim copy of the `len` bytes at `pos`, returning the
    /// copy's position.
    pub(crate) fn copy_block(&self, pos: u64, len: u64) -> Result<u64, Error> {
        let mut buf = vec![0u8; len as usize];
        self.store.seek(pos)?;
        self.store.read_exact(&mut buf)?;
        let new_pos = self.store.len()?;
        self.store.seek(new_pos)?;
        self.store.write_all(&buf)?;
        Ok(new_pos)
    }

    /// Whether the block at `pos` is committed and must be copied before a
    /// rewrite. Outside a transaction an array-list-rooted file refuses the
    /// rewrite outright; a hash-map root rewrites in place.
    pub(crate) fn needs_copy(&self, pos: u64) -> Result<bool, Error> {
        match self.tx_start.get() {
            Some(tx_start) => Ok(pos < tx_start),
            None => {
                if self.header.get().tag == Tag::ArrayList {
                    Err(Error::ExpectedTxStart)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Re-read a slot pointer so a cursor held across writes sees the
    /// current contents of its position.
    pub(crate) fn refresh(&self, ptr: SlotPointer) -> Result<SlotPointer, Error> {
        match ptr.position {
            Some(pos) => Ok(SlotPointer {
                position: Some(pos),
                slot: self.read_slot(pos)?,
            }),
            None => Ok(self.root_slot_ptr()),
        }
    }

    // ---- path execution ----------------------------------------------------

    /// Tail-recursive interpreter over a path program.
    pub(crate) fn execute(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
    ) -> Result<SlotPointer, Error> {
        if idx == path.len() {
            if mode == Mode::ReadOnly && ptr.slot.is_empty() {
                return Err(Error::KeyNotFound);
            }
            return Ok(ptr);
        }
        let part = &path[idx];
        if mode == Mode::ReadOnly && part.requires_write() {
            return Err(Error::WriteNotAllowed);
        }
        match part {
            PathPart::ArrayListInit => self.array_list_init(mode, path, idx, ptr),
            PathPart::ArrayListGet(i) => self.array_list_get(mode, path, idx, ptr, *i),
            PathPart::ArrayListAppend => self.array_list_append(mode, path, idx, ptr),
            PathPart::ArrayListSlice(size) => self.array_list_slice(mode, path, idx, ptr, *size),
            PathPart::LinkedArrayListInit => self.linked_array_list_init(mode, path, idx, ptr),
            PathPart::LinkedArrayListGet(i) => {
                self.linked_array_list_get(mode, path, idx, ptr, *i)
            }
            PathPart::LinkedArrayListAppend => self.linked_array_list_append(mode, path, idx, ptr),
            PathPart::LinkedArrayListSlice { offset, size } => {
                self.linked_array_list_slice(mode, path, idx, ptr, *offset, *size)
            }
            PathPart::LinkedArrayListConcat(other) => {
                self.linked_array_list_concat(mode, path, idx, ptr, *other)
            }
            PathPart::LinkedArrayListInsert(i) => {
                self.linked_array_list_insert(mode, path, idx, ptr, *i)
            }
            PathPart::LinkedArrayListRemove(i) => {
                self.linked_array_list_remove(mode, path, idx, ptr, *i)
            }
            PathPart::HashMapInit { counted, set } => {
                self.hash_map_init(mode, path, idx, ptr, *counted, *set)
            }
            PathPart::HashMapGet { target, hash } => {
                self.hash_map_get(mode, path, idx, ptr, *target, hash)
            }
            PathPart::HashMapRemove(hash) => self.hash_map_remove(mode, path, idx, ptr, hash),
            PathPart::WriteData(value) => self.write_data(mode, path, idx, ptr, value),
            PathPart::Context(f) => self.run_context(path, idx, ptr, *f),
        }
    }

    fn write_data(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        value: &Value<'_>,
    ) -> Result<SlotPointer, Error> {
        let pos = ptr.position.ok_or(Error::CursorNotWriteable)?;
        let slot = match *value {
            Value::None => Slot {
                value: 0,
                tag: Tag::None,
                full: true,
            },
            Value::Slot(slot) => slot,
            Value::Uint(v) => {
                if v > i64::MAX as u64 {
                    return Err(Error::Uint64Overflow);
                }
                Slot::new(Tag::Uint, v as i64)
            }
            Value::Int(v) => Slot::new(Tag::Int, v),
            Value::Float(v) => Slot::new(Tag::Float, v.to_bits() as i64),
            Value::Bytes(bytes) => self.write_bytes(bytes, None)?,
            Value::FormatTagged(bytes, tag) => self.write_bytes(bytes, Some(tag))?,
        };
        self.write_slot(pos, slot)?;
        self.execute(mode, path, idx + 1, SlotPointer::new(pos, slot))
    }

    /// Encode a byte payload into a slot: inline when it fits (and carries
    /// no zero byte, which would truncate the inline read), out-of-line
    /// otherwise.
    pub(crate) fn write_bytes(
        &self,
        bytes: &[u8],
        format_tag: Option<[u8; 2]>,
    ) -> Result<Slot, Error> {
        let limit = if format_tag.is_some() { 6 } else { 8 };
        if bytes.len() <= limit && !bytes.contains(&0) {
            let mut buf = [0u8; 8];
            buf[..bytes.len()].copy_from_slice(bytes);
            if let Some(tag) = format_tag {
                buf[6..8].copy_from_slice(&tag);
            }
            return Ok(Slot {
                value: i64::from_be_bytes(buf),
                tag: Tag::ShortBytes,
                full: format_tag.is_some(),
            });
        }
        let pos = self.store.len()?;
        self.store.seek(pos)?;
        self.store.write_u64(bytes.len() as u64)?;
        self.store.write_all(bytes)?;
        if let Some(tag) = format_tag {
            self.store.write_all(&tag)?;
        }
        Ok(Slot {
            value: pos as i64,
            tag: Tag::Bytes,
            full: format_tag.is_some(),
        })
    }

    fn run_context(
        &self,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        f: &ContextFn<'_, S, H>,
    ) -> Result<SlotPointer, Error> {
        if idx != path.len() - 1 {
            return Err(Error::PathPartMustBeAtEnd);
        }
        match f(WriteCursor::new(ptr, self)) {
            Ok(()) => self.refresh(ptr),
            Err(e) => {
                // discard everything the callback wrote; the committed file
                // size has not moved yet
                self.truncate()?;
                Err(e)
            }
        }
    }
}
