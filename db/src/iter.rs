// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::array_list::shift_for_key;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::database::{Database, SLOT_COUNT};
use crate::error::Error;
use crate::hash::Hasher;
use crate::header::{ArrayListHeader, LinkedArrayListHeader, LinkedArrayListSlot};
use crate::slot::{SlotPointer, Tag, SLOT_SIZE};
use burl_store::Store;

struct Frame {
    block: u64,
    index: u64,
}

enum IterKind {
    Empty,
    /// Radix list: dense, bounded by the header size.
    List {
        stack: Vec<Frame>,
        shift: u32,
        size: u64,
        yielded: u64,
    },
    /// Linked list: skip unclaimed entries, bounded by the header size.
    Linked {
        stack: Vec<Frame>,
        shift: u8,
        size: u64,
        yielded: u64,
    },
    /// Hash collection: depth-first over index blocks, yielding pairs.
    Hash { stack: Vec<Frame> },
}

/// Iterator over a collection's slots. Ordered lists yield in index order;
/// hash collections yield key/value pairs in block order, which is
/// unspecified to callers but stable per file.
pub struct Iter<'a, S, H> {
    db: &'a Database<S, H>,
    kind: IterKind,
}

impl<'a, S: Store, H: Hasher> Iter<'a, S, H> {
    pub(crate) fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        let db = cursor.db;
        let ptr = cursor.slot_ptr;
        let kind = match ptr.slot.tag {
            Tag::None => IterKind::Empty,
            Tag::ArrayList => {
                let header_pos = db.array_list_header_pos(&ptr)?;
                let header = ArrayListHeader::read(&db.store, header_pos)?;
                if header.size == 0 {
                    IterKind::Empty
                } else {
                    IterKind::List {
                        stack: vec![Frame {
                            block: header.ptr,
                            index: 0,
                        }],
                        shift: shift_for_key(header.size - 1),
                        size: header.size,
                        yielded: 0,
                    }
                }
            }
            Tag::LinkedArrayList => {
                let header_pos = db.linked_header_pos(&ptr)?;
                let header = LinkedArrayListHeader::read(&db.store, header_pos)?;
                if header.size == 0 {
                    IterKind::Empty
                } else {
                    IterKind::Linked {
                        stack: vec![Frame {
                            block: header.ptr,
                            index: 0,
                        }],
                        shift: header.shift,
                        size: header.size,
                        yielded: 0,
                    }
                }
            }
            tag if tag.is_hash_collection() => {
                let base = ptr.slot.offset()? + if tag.is_counted() { 8 } else { 0 };
                IterKind::Hash {
                    stack: vec![Frame {
                        block: base,
                        index: 0,
                    }],
                }
            }
            _ => return Err(Error::UnexpectedTag),
        };
        Ok(Iter { db, kind })
    }

    fn next_list(&mut self) -> Option<Result<SlotPointer, Error>> {
        let (stack, shift, size, yielded) = match &mut self.kind {
            IterKind::List {
                stack,
                shift,
                size,
                yielded,
            } => (stack, *shift, *size, yielded),
            _ => unreachable!(),
        };
        loop {
            if *yielded >= size {
                return None;
            }
            let depth = stack.len() as u32 - 1;
            let frame = stack.last_mut()?;
            if frame.index >= SLOT_COUNT {
                stack.pop();
                if stack.is_empty() {
                    return None;
                }
                continue;
            }
            let slot_pos = frame.block + frame.index * SLOT_SIZE;
            frame.index += 1;
            let slot = match self.db.read_slot(slot_pos) {
                Ok(slot) => slot,
                Err(e) => return Some(Err(e)),
            };
            if depth == shift {
                *yielded += 1;
                return Some(Ok(SlotPointer::new(slot_pos, slot)));
            }
            if slot.tag == Tag::Index {
                let block = match slot.offset() {
                    Ok(block) => block,
                    Err(e) => return Some(Err(e)),
                };
                stack.push(Frame { block, index: 0 });
            }
        }
    }

    fn next_linked(&mut self) -> Option<Result<SlotPointer, Error>> {
        let (stack, shift, size, yielded) = match &mut self.kind {
            IterKind::Linked {
                stack,
                shift,
                size,
                yielded,
            } => (stack, *shift, *size, yielded),
            _ => unreachable!(),
        };
        loop {
            if *yielded >= size {
                return None;
            }
            let depth = stack.len() as u8 - 1;
            let frame = stack.last_mut()?;
            if frame.index >= SLOT_COUNT {
                stack.pop();
                if stack.is_empty() {
                    return None;
                }
                continue;
            }
            let entry_pos = frame.block + frame.index * LinkedArrayListSlot::SIZE;
            frame.index += 1;
            let entry = match self.db.read_linked_entry(entry_pos) {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            if entry.count == 0 {
                continue;
            }
            if depth == shift {
                *yielded += 1;
                return Some(Ok(SlotPointer::new(entry_pos, entry.slot)));
            }
            let block = match entry.slot.offset() {
                Ok(block) => block,
                Err(e) => return Some(Err(e)),
            };
            stack.push(Frame { block, index: 0 });
        }
    }

    fn next_hash(&mut self) -> Option<Result<SlotPointer, Error>> {
        let stack = match &mut self.kind {
            IterKind::Hash { stack } => stack,
            _ => unreachable!(),
        };
        loop {
            let frame = stack.last_mut()?;
            if frame.index >= SLOT_COUNT {
                stack.pop();
                if stack.is_empty() {
                    return None;
                }
                continue;
            }
            let slot_pos = frame.block + frame.index * SLOT_SIZE;
            frame.index += 1;
            let slot = match self.db.read_slot(slot_pos) {
                Ok(slot) => slot,
                Err(e) => return Some(Err(e)),
            };
            match slot.tag {
                Tag::None => continue,
                Tag::Index => {
                    let block = match slot.offset() {
                        Ok(block) => block,
                        Err(e) => return Some(Err(e)),
                    };
                    stack.push(Frame { block, index: 0 });
                }
                Tag::KvPair => return Some(Ok(SlotPointer::new(slot_pos, slot))),
                _ => return Some(Err(Error::UnexpectedTag)),
            }
        }
    }
}

impl<'a, S: Store, H: Hasher> Iterator for Iter<'a, S, H> {
    type Item = Result<ReadCursor<'a, S, H>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.kind {
            IterKind::Empty => return None,
            IterKind::List { .. } => self.next_list(),
            IterKind::Linked { .. } => self.next_linked(),
            IterKind::Hash { .. } => self.next_hash(),
        };
        let db = self.db;
        next.map(|r| r.map(|ptr| ReadCursor::new(ptr, db)))
    }
}

/// Iterator yielding write cursors, so callers can mutate elements in place.
pub struct IterMut<'a, S, H> {
    inner: Iter<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> IterMut<'a, S, H> {
    pub(crate) fn new(inner: Iter<'a, S, H>) -> Self {
        IterMut { inner }
    }
}

impl<'a, S: Store, H: Hasher> Iterator for IterMut<'a, S, H> {
    type Item = Result<WriteCursor<'a, S, H>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let db = self.inner.db;
        self.inner
            .next()
            .map(|r| r.map(|cursor| WriteCursor::new(cursor.slot_ptr(), db)))
    }
}
