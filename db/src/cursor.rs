// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::database::{Database, Mode};
use crate::error::Error;
use crate::hash::Hasher;
use crate::header::{ArrayListHeader, KeyValuePair, LinkedArrayListHeader};
use crate::iter::{Iter, IterMut};
use crate::path::{PathPart, Value};
use crate::slot::{Slot, SlotPointer, Tag};
use burl_store::Store;

/// A decoded byte payload with its optional two-byte format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesObject {
    pub data: Vec<u8>,
    pub format_tag: Option<[u8; 2]>,
}

/// A key/value pair opened for reading: the stored digest plus cursors over
/// the key and value slots.
pub struct KeyValuePairCursor<'a, S, H> {
    pub hash: Vec<u8>,
    pub key: ReadCursor<'a, S, H>,
    pub value: ReadCursor<'a, S, H>,
}

/// A read-only view over one slot of the database.
pub struct ReadCursor<'a, S, H> {
    pub(crate) slot_ptr: SlotPointer,
    pub(crate) db: &'a Database<S, H>,
}

impl<'a, S, H> Clone for ReadCursor<'a, S, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S, H> Copy for ReadCursor<'a, S, H> {}

impl<'a, S, H> std::fmt::Debug for ReadCursor<'a, S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadCursor")
            .field("slot_ptr", &self.slot_ptr)
            .finish()
    }
}

impl<'a, S, H> PartialEq for ReadCursor<'a, S, H> {
    fn eq(&self, other: &Self) -> bool {
        self.slot_ptr == other.slot_ptr && std::ptr::eq(self.db, other.db)
    }
}

impl<'a, S, H> Eq for ReadCursor<'a, S, H> {}

impl<'a, S: Store, H: Hasher> ReadCursor<'a, S, H> {
    pub(crate) fn new(slot_ptr: SlotPointer, db: &'a Database<S, H>) -> Self {
        ReadCursor { slot_ptr, db }
    }

    pub fn slot(&self) -> Slot {
        self.slot_ptr.slot
    }

    pub fn slot_ptr(&self) -> SlotPointer {
        self.slot_ptr
    }

    /// Re-read the slot so the cursor reflects writes made since it was
    /// taken.
    pub(crate) fn refreshed(&self) -> Result<Self, Error> {
        Ok(ReadCursor::new(self.db.refresh(self.slot_ptr)?, self.db))
    }

    /// Run `path` in read-only mode; `None` means a key on the path was
    /// missing.
    pub fn read_path(
        &self,
        path: &[PathPart<'_, S, H>],
    ) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        let ptr = self.db.refresh(self.slot_ptr)?;
        match self.db.execute(Mode::ReadOnly, path, 0, ptr) {
            Ok(out) => Ok(Some(ReadCursor::new(out, self.db))),
            Err(Error::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn read_path_slot(&self, path: &[PathPart<'_, S, H>]) -> Result<Option<Slot>, Error> {
        Ok(self.read_path(path)?.map(|c| c.slot()))
    }

    /// Number of elements behind this slot. Ordered lists read their header,
    /// counted hash collections their population counter; plain hash
    /// collections count by iteration.
    pub fn count(&self) -> Result<u64, Error> {
        match self.slot_ptr.slot.tag {
            Tag::None => Ok(0),
            Tag::ArrayList => {
                let pos = self.db.array_list_header_pos(&self.slot_ptr)?;
                Ok(ArrayListHeader::read(&self.db.store, pos)?.size)
            }
            Tag::LinkedArrayList => {
                let pos = self.db.linked_header_pos(&self.slot_ptr)?;
                Ok(LinkedArrayListHeader::read(&self.db.store, pos)?.size)
            }
            Tag::CountedHashMap | Tag::CountedHashSet => {
                self.db.store.seek(self.slot_ptr.slot.offset()?)?;
                Ok(self.db.store.read_u64()?)
            }
            Tag::HashMap | Tag::HashSet => {
                let mut count = 0;
                for entry in self.iter()? {
                    entry?;
                    count += 1;
                }
                Ok(count)
            }
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn read_uint(&self) -> Result<u64, Error> {
        let slot = self.slot_ptr.slot;
        match slot.tag {
            Tag::Uint => {
                if slot.value < 0 {
                    Err(Error::ExpectedUnsignedLong)
                } else {
                    Ok(slot.value as u64)
                }
            }
            Tag::None => Err(Error::EmptySlot),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn read_int(&self) -> Result<i64, Error> {
        let slot = self.slot_ptr.slot;
        match slot.tag {
            Tag::Int => Ok(slot.value),
            Tag::None => Err(Error::EmptySlot),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn read_float(&self) -> Result<f64, Error> {
        let slot = self.slot_ptr.slot;
        match slot.tag {
            Tag::Float => Ok(f64::from_bits(slot.value as u64)),
            Tag::None => Err(Error::EmptySlot),
            _ => Err(Error::UnexpectedTag),
        }
    }

    /// Read a byte payload, failing with [`Error::StreamTooLong`] when it
    /// exceeds `max` bytes.
    pub fn read_bytes(&self, max: Option<u64>) -> Result<Vec<u8>, Error> {
        Ok(self.read_bytes_object(max)?.data)
    }

    pub fn read_bytes_object(&self, max: Option<u64>) -> Result<BytesObject, Error> {
        let slot = self.slot_ptr.slot;
        match slot.tag {
            Tag::ShortBytes => {
                let buf = slot.value.to_be_bytes();
                let limit = if slot.full { 6 } else { 8 };
                let len = buf
                    .iter()
                    .take(limit)
                    .position(|&b| b == 0)
                    .unwrap_or(limit);
                if let Some(max) = max {
                    if len as u64 > max {
                        return Err(Error::StreamTooLong);
                    }
                }
                Ok(BytesObject {
                    data: buf[..len].to_vec(),
                    format_tag: if slot.full {
                        Some([buf[6], buf[7]])
                    } else {
                        None
                    },
                })
            }
            Tag::Bytes => {
                let pos = slot.offset()?;
                self.db.store.seek(pos)?;
                let len = self.db.store.read_i64()?;
                if len < 0 {
                    return Err(Error::ExpectedUnsignedLong);
                }
                if let Some(max) = max {
                    if len as u64 > max {
                        return Err(Error::StreamTooLong);
                    }
                }
                let mut data = vec![0u8; len as usize];
                self.db.store.read_exact(&mut data)?;
                let format_tag = if slot.full {
                    let mut tag = [0u8; 2];
                    self.db.store.read_exact(&mut tag)?;
                    Some(tag)
                } else {
                    None
                };
                Ok(BytesObject { data, format_tag })
            }
            Tag::None => Err(Error::EmptySlot),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn read_key_value_pair(&self) -> Result<KeyValuePairCursor<'a, S, H>, Error> {
        let slot = self.slot_ptr.slot;
        match slot.tag {
            Tag::KvPair => {
                let rec_pos = slot.offset()?;
                let hash_size = self.db.hash_size();
                let rec = KeyValuePair::read(&self.db.store, rec_pos, hash_size)?;
                Ok(KeyValuePairCursor {
                    hash: rec.hash,
                    key: ReadCursor::new(
                        SlotPointer::new(
                            KeyValuePair::key_slot_pos(rec_pos, hash_size),
                            rec.key_slot,
                        ),
                        self.db,
                    ),
                    value: ReadCursor::new(
                        SlotPointer::new(
                            KeyValuePair::value_slot_pos(rec_pos, hash_size),
                            rec.value_slot,
                        ),
                        self.db,
                    ),
                })
            }
            Tag::None => Err(Error::EmptySlot),
            _ => Err(Error::UnexpectedTag),
        }
    }

    /// Streaming reader over a byte payload.
    pub fn reader(&self) -> Result<Reader<'a, S, H>, Error> {
        let slot = self.slot_ptr.slot;
        match slot.tag {
            Tag::ShortBytes => {
                let buf = slot.value.to_be_bytes();
                let limit = if slot.full { 6 } else { 8 };
                let len = buf
                    .iter()
                    .take(limit)
                    .position(|&b| b == 0)
                    .unwrap_or(limit);
                Ok(Reader {
                    db: self.db,
                    kind: ReaderKind::Inline {
                        buf,
                        len: len as u64,
                        pos: 0,
                    },
                })
            }
            Tag::Bytes => {
                let pos = slot.offset()?;
                self.db.store.seek(pos)?;
                let len = self.db.store.read_i64()?;
                if len < 0 {
                    return Err(Error::ExpectedUnsignedLong);
                }
                Ok(Reader {
                    db: self.db,
                    kind: ReaderKind::File {
                        start: pos + 8,
                        len: len as u64,
                        pos: 0,
                    },
                })
            }
            Tag::None => Err(Error::EmptySlot),
            _ => Err(Error::UnexpectedTag),
        }
    }

    /// Iterate over the collection behind this slot: ordered lists in index
    /// order, hash collections in block order.
    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        Iter::new(self.refreshed()?)
    }
}

/// A read/write view over one slot of the database.
pub struct WriteCursor<'a, S, H> {
    pub(crate) slot_ptr: SlotPointer,
    pub(crate) db: &'a Database<S, H>,
}

impl<'a, S, H> Clone for WriteCursor<'a, S, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S, H> Copy for WriteCursor<'a, S, H> {}

impl<'a, S: Store, H: Hasher> WriteCursor<'a, S, H> {
    pub(crate) fn new(slot_ptr: SlotPointer, db: &'a Database<S, H>) -> Self {
        WriteCursor { slot_ptr, db }
    }

    pub fn read_only(&self) -> ReadCursor<'a, S, H> {
        ReadCursor::new(self.slot_ptr, self.db)
    }

    pub fn slot(&self) -> Slot {
        self.slot_ptr.slot
    }

    pub fn slot_ptr(&self) -> SlotPointer {
        self.slot_ptr
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.read_only().count()
    }

    pub fn read_uint(&self) -> Result<u64, Error> {
        self.read_only().read_uint()
    }

    pub fn read_int(&self) -> Result<i64, Error> {
        self.read_only().read_int()
    }

    pub fn read_float(&self) -> Result<f64, Error> {
        self.read_only().read_float()
    }

    pub fn read_bytes(&self, max: Option<u64>) -> Result<Vec<u8>, Error> {
        self.read_only().read_bytes(max)
    }

    pub fn read_bytes_object(&self, max: Option<u64>) -> Result<BytesObject, Error> {
        self.read_only().read_bytes_object(max)
    }

    pub fn read_key_value_pair(&self) -> Result<KeyValuePairCursor<'a, S, H>, Error> {
        self.read_only().read_key_value_pair()
    }

    pub fn reader(&self) -> Result<Reader<'a, S, H>, Error> {
        self.read_only().reader()
    }

    pub fn read_path(
        &self,
        path: &[PathPart<'_, S, H>],
    ) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.read_only().read_path(path)
    }

    pub fn read_path_slot(&self, path: &[PathPart<'_, S, H>]) -> Result<Option<Slot>, Error> {
        self.read_only().read_path_slot(path)
    }

    /// Run `path` in read-write mode. Outside a transaction the store is
    /// synced once the path completes.
    pub fn write_path(
        &self,
        path: &[PathPart<'_, S, H>],
    ) -> Result<WriteCursor<'a, S, H>, Error> {
        let ptr = self.db.refresh(self.slot_ptr)?;
        let out = self.db.execute(Mode::ReadWrite, path, 0, ptr)?;
        if self.db.tx_start.get().is_none() {
            self.db.store.sync()?;
        }
        Ok(WriteCursor::new(out, self.db))
    }

    /// Write `value` into this slot.
    pub fn write(&mut self, value: Value<'_>) -> Result<(), Error> {
        let out = self.write_path(&[PathPart::WriteData(value)])?;
        self.slot_ptr = out.slot_ptr;
        Ok(())
    }

    /// Write only when the slot has never been written; reports whether it
    /// wrote.
    pub fn write_if_empty(&mut self, value: Value<'_>) -> Result<bool, Error> {
        let current = self.db.refresh(self.slot_ptr)?;
        if !current.slot.is_empty() {
            self.slot_ptr = current;
            return Ok(false);
        }
        self.write(value)?;
        Ok(true)
    }

    /// Streaming byte writer that finalizes a BYTES slot on `finish`.
    pub fn writer(&self) -> Result<Writer<'a, S, H>, Error> {
        let parent = self.slot_ptr.position.ok_or(Error::CursorNotWriteable)?;
        let start = self.db.store.len()?;
        self.db.store.seek(start)?;
        self.db.store.write_u64(0)?;
        Ok(Writer {
            db: self.db,
            parent,
            start,
            size: 0,
            pos: 0,
            format_tag: None,
        })
    }

    pub fn iter(&self) -> Result<IterMut<'a, S, H>, Error> {
        Ok(IterMut::new(self.read_only().iter()?))
    }
}

enum ReaderKind {
    Inline { buf: [u8; 8], len: u64, pos: u64 },
    File { start: u64, len: u64, pos: u64 },
}

/// Streaming reader over a byte payload; implements [`std::io::Read`].
pub struct Reader<'a, S, H> {
    db: &'a Database<S, H>,
    kind: ReaderKind,
}

impl<'a, S: Store, H: Hasher> Reader<'a, S, H> {
    pub fn len(&self) -> u64 {
        match self.kind {
            ReaderKind::Inline { len, .. } => len,
            ReaderKind::File { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move the read position within the payload.
    pub fn seek(&mut self, offset: u64) -> Result<(), Error> {
        if offset > self.len() {
            return Err(Error::InvalidOffset);
        }
        match &mut self.kind {
            ReaderKind::Inline { pos, .. } => *pos = offset,
            ReaderKind::File { pos, .. } => *pos = offset,
        }
        Ok(())
    }
}

impl<'a, S: Store, H: Hasher> std::io::Read for Reader<'a, S, H> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let db = self.db;
        match &mut self.kind {
            ReaderKind::Inline { buf, len, pos } => {
                let n = out.len().min((*len - *pos) as usize);
                out[..n].copy_from_slice(&buf[*pos as usize..*pos as usize + n]);
                *pos += n as u64;
                Ok(n)
            }
            ReaderKind::File { start, len, pos } => {
                let n = out.len().min((*len - *pos) as usize);
                if n == 0 {
                    return Ok(0);
                }
                db.store.seek(*start + *pos).map_err(Error::from)?;
                db.store.read_exact(&mut out[..n]).map_err(Error::from)?;
                *pos += n as u64;
                Ok(n)
            }
        }
    }
}

/// Streaming writer: stages bytes at the end of the file and finalizes a
/// BYTES slot; implements [`std::io::Write`].
pub struct Writer<'a, S, H> {
    db: &'a Database<S, H>,
    parent: u64,
    /// Position of the reserved 8-byte length prefix.
    start: u64,
    size: u64,
    pos: u64,
    format_tag: Option<[u8; 2]>,
}

impl<'a, S: Store, H: Hasher> Writer<'a, S, H> {
    pub fn set_format_tag(&mut self, tag: &[u8]) -> Result<(), Error> {
        if tag.len() != 2 {
            return Err(Error::InvalidFormatTagSize);
        }
        self.format_tag = Some([tag[0], tag[1]]);
        Ok(())
    }

    /// Move within the already-written region; the staged payload cannot be
    /// grown by seeking past its end.
    pub fn seek(&mut self, offset: u64) -> Result<(), Error> {
        if offset > self.size {
            return Err(Error::InvalidOffset);
        }
        self.pos = offset;
        Ok(())
    }

    /// Append the format tag, fill in the length prefix, and rewrite the
    /// parent slot.
    pub fn finish(self) -> Result<WriteCursor<'a, S, H>, Error> {
        if let Some(tag) = self.format_tag {
            if self.pos != self.size {
                return Err(Error::UnexpectedWriterPosition);
            }
            self.db.store.seek(self.start + 8 + self.size)?;
            self.db.store.write_all(&tag)?;
        }
        self.db.store.seek(self.start)?;
        self.db.store.write_u64(self.size)?;
        let slot = Slot {
            value: self.start as i64,
            tag: Tag::Bytes,
            full: self.format_tag.is_some(),
        };
        self.db.write_slot(self.parent, slot)?;
        if self.db.tx_start.get().is_none() {
            self.db.store.sync()?;
        }
        Ok(WriteCursor::new(
            SlotPointer::new(self.parent, slot),
            self.db,
        ))
    }
}

impl<'a, S: Store, H: Hasher> std::io::Write for Writer<'a, S, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.db
            .store
            .seek(self.start + 8 + self.pos)
            .map_err(Error::from)?;
        self.db.store.write_all(buf).map_err(Error::from)?;
        self.pos += buf.len() as u64;
        self.size = self.size.max(self.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.db.store.flush().map_err(Error::from)?;
        Ok(())
    }
}
