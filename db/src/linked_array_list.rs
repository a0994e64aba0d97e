// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! RRB-style linked array list: a 16-ary positional trie whose entries carry
//! their subtree's leaf count, so indexing stays O(log n) across the
//! non-aligned shapes produced by slicing and concatenation.

use crate::array_list::wrap_index;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::database::{Database, Mode, SLOT_COUNT};
use crate::error::Error;
use crate::hash::Hasher;
use crate::header::{LinkedArrayListHeader, LinkedArrayListSlot};
use crate::iter::Iter;
use crate::path::{PathPart, Value};
use crate::slot::{Slot, SlotPointer, Tag};
use burl_store::Store;

/// A linked-array-list block: 16 entries of 17 bytes.
pub(crate) const LINKED_BLOCK_SIZE: u64 = SLOT_COUNT * LinkedArrayListSlot::SIZE;
/// Upper bound on tree depth.
pub(crate) const MAX_SHIFT: u8 = 16;

type Entries = [LinkedArrayListSlot; SLOT_COUNT as usize];

/// Seal an interior entry so appends never descend into its subtree; data
/// slots at the leaf level keep their own `full` semantics.
fn sealed(mut entry: LinkedArrayListSlot) -> LinkedArrayListSlot {
    if entry.slot.tag == Tag::Index {
        entry.slot.full = true;
    }
    entry
}

/// Leaves a subtree of height `shift` can hold.
fn capacity(shift: u8) -> u128 {
    1u128 << (4 * u32::from(shift))
}

/// Child index and local key for `key` within a block's entries.
fn locate(entries: &Entries, key: u64) -> Result<(usize, u64), Error> {
    let mut rest = key;
    for (i, entry) in entries.iter().enumerate() {
        if rest < entry.count {
            return Ok((i, rest));
        }
        rest -= entry.count;
    }
    Err(Error::KeyNotFound)
}

/// Index of the rightmost used entry.
fn last_used(entries: &Entries) -> Option<usize> {
    entries.iter().rposition(|e| e.count > 0)
}

impl<S: Store, H: Hasher> Database<S, H> {
    pub(crate) fn linked_header_pos(&self, ptr: &SlotPointer) -> Result<u64, Error> {
        if ptr.position.is_none() {
            return Err(Error::InvalidTopLevelType);
        }
        if ptr.slot.tag != Tag::LinkedArrayList {
            return Err(Error::UnexpectedTag);
        }
        ptr.slot.offset()
    }

    fn read_linked_block(&self, pos: u64) -> Result<Entries, Error> {
        let mut buf = [0u8; LINKED_BLOCK_SIZE as usize];
        self.store.seek(pos)?;
        self.store.read_exact(&mut buf)?;
        let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
        for (i, entry) in entries.iter_mut().enumerate() {
            let at = i * LinkedArrayListSlot::SIZE as usize;
            *entry = LinkedArrayListSlot::decode(&buf[at..at + LinkedArrayListSlot::SIZE as usize])?;
        }
        Ok(entries)
    }

    pub(crate) fn read_linked_entry(&self, pos: u64) -> Result<LinkedArrayListSlot, Error> {
        let mut buf = [0u8; LinkedArrayListSlot::SIZE as usize];
        self.store.seek(pos)?;
        self.store.read_exact(&mut buf)?;
        LinkedArrayListSlot::decode(&buf)
    }

    fn write_linked_slot(&self, pos: u64, entry: LinkedArrayListSlot) -> Result<(), Error> {
        let mut buf = [0u8; LinkedArrayListSlot::SIZE as usize];
        entry.encode(&mut buf);
        self.store.seek(pos)?;
        self.store.write_all(&buf)?;
        Ok(())
    }

    /// Append a new block holding `entries`, returning its position.
    fn append_linked_block(&self, entries: &Entries) -> Result<u64, Error> {
        let mut buf = [0u8; LINKED_BLOCK_SIZE as usize];
        for (i, entry) in entries.iter().enumerate() {
            let at = i * LinkedArrayListSlot::SIZE as usize;
            entry.encode(&mut buf[at..at + LinkedArrayListSlot::SIZE as usize]);
        }
        let pos = self.store.len()?;
        self.store.seek(pos)?;
        self.store.write_all(&buf)?;
        Ok(pos)
    }

    /// Append an interior spine block built by slice/concat. Every used
    /// entry must be a sealed subtree link.
    fn append_spine_block(&self, entries: &Entries) -> Result<u64, Error> {
        for entry in entries.iter().filter(|e| e.count > 0) {
            if entry.slot.tag != Tag::Index || !entry.slot.full {
                return Err(Error::MustSetNewSlotsToFull);
            }
        }
        self.append_linked_block(entries)
    }

    /// Copy a block, sealing its interior entries so the copy can take
    /// appends without ever mutating the shared originals underneath it.
    fn seal_copy_block(&self, pos: u64, shift: u8) -> Result<u64, Error> {
        let entries = self.read_linked_block(pos)?;
        if shift == 0 {
            return self.append_linked_block(&entries);
        }
        let mut out = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
        for (i, entry) in entries.iter().enumerate() {
            out[i] = if entry.count > 0 { sealed(*entry) } else { *entry };
        }
        self.append_spine_block(&out)
    }

    /// Walk to `key` by consuming leaf counts left to right.
    fn linked_lookup(
        &self,
        mode: Mode,
        root: u64,
        shift: u8,
        key: u64,
    ) -> Result<SlotPointer, Error> {
        let mut block_pos = root;
        let mut level = shift;
        let mut key = key;
        loop {
            let entries = self.read_linked_block(block_pos)?;
            let (i, inner) = locate(&entries, key)?;
            let entry_pos = block_pos + i as u64 * LinkedArrayListSlot::SIZE;
            if level == 0 {
                return Ok(SlotPointer::new(entry_pos, entries[i].slot));
            }
            let entry = entries[i];
            if entry.slot.tag != Tag::Index {
                return Err(Error::UnexpectedTag);
            }
            let mut child = entry.slot.offset()?;
            if mode == Mode::ReadWrite && self.needs_copy(child)? {
                child = self.copy_block(child, LINKED_BLOCK_SIZE)?;
                self.write_linked_slot(
                    entry_pos,
                    LinkedArrayListSlot {
                        slot: Slot {
                            value: child as i64,
                            tag: Tag::Index,
                            full: entry.slot.full,
                        },
                        count: entry.count,
                    },
                )?;
            }
            block_pos = child;
            level -= 1;
            key = inner;
        }
    }

    /// Claim the next leaf slot, growing the root by one level when it is
    /// out of room. Returns the claimed slot's position.
    fn linked_append(&self, header: &mut LinkedArrayListHeader) -> Result<u64, Error> {
        if self.needs_copy(header.ptr)? {
            header.ptr = self.copy_block(header.ptr, LINKED_BLOCK_SIZE)?;
        }
        let leaf = match self.linked_append_in(header.ptr, header.shift)? {
            Some(leaf) => leaf,
            None => {
                // grow: the old root moves under a fresh parent, sealed so
                // the next descent opens a sibling subtree
                let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
                entries[0] = LinkedArrayListSlot {
                    slot: Slot {
                        value: header.ptr as i64,
                        tag: Tag::Index,
                        full: true,
                    },
                    count: header.size,
                };
                header.ptr = self.append_linked_block(&entries)?;
                header.shift += 1;
                if header.shift > MAX_SHIFT {
                    return Err(Error::MaxShiftExceeded);
                }
                self.linked_append_in(header.ptr, header.shift)?
                    .ok_or(Error::NoAvailableSlots)?
            }
        };
        header.size += 1;
        Ok(leaf)
    }

    /// Try to claim a leaf under `block_pos` (which the caller owns);
    /// `None` when the subtree has no room.
    fn linked_append_in(&self, block_pos: u64, shift: u8) -> Result<Option<u64>, Error> {
        let entries = self.read_linked_block(block_pos)?;
        let last = last_used(&entries);

        if shift == 0 {
            let next = last.map_or(0, |i| i + 1);
            if next >= SLOT_COUNT as usize {
                return Ok(None);
            }
            let pos = block_pos + next as u64 * LinkedArrayListSlot::SIZE;
            self.write_linked_slot(
                pos,
                LinkedArrayListSlot {
                    slot: Slot::empty(),
                    count: 1,
                },
            )?;
            return Ok(Some(pos));
        }

        if let Some(i) = last {
            let entry = entries[i];
            if entry.slot.tag == Tag::Index
                && !entry.slot.full
                && u128::from(entry.count) < capacity(shift)
            {
                let mut child = entry.slot.offset()?;
                if self.needs_copy(child)? {
                    child = self.copy_block(child, LINKED_BLOCK_SIZE)?;
                }
                if let Some(leaf) = self.linked_append_in(child, shift - 1)? {
                    self.write_linked_slot(
                        block_pos + i as u64 * LinkedArrayListSlot::SIZE,
                        LinkedArrayListSlot {
                            slot: Slot {
                                value: child as i64,
                                tag: Tag::Index,
                                full: entry.slot.full,
                            },
                            count: entry.count + 1,
                        },
                    )?;
                    return Ok(Some(leaf));
                }
            }
            // the rightmost subtree is sealed or out of room: open a sibling
            let next = i + 1;
            if next >= SLOT_COUNT as usize {
                return Ok(None);
            }
            let (chain, leaf) = self.linked_fresh_chain(shift - 1)?;
            self.write_linked_slot(
                block_pos + next as u64 * LinkedArrayListSlot::SIZE,
                LinkedArrayListSlot {
                    slot: chain,
                    count: 1,
                },
            )?;
            return Ok(Some(leaf));
        }

        let (chain, leaf) = self.linked_fresh_chain(shift - 1)?;
        self.write_linked_slot(
            block_pos,
            LinkedArrayListSlot {
                slot: chain,
                count: 1,
            },
        )?;
        Ok(Some(leaf))
    }

    /// Build a single-leaf spine of `shift + 1` new blocks; returns the
    /// link for the top block and the claimed leaf-slot position.
    fn linked_fresh_chain(&self, shift: u8) -> Result<(Slot, u64), Error> {
        if shift == 0 {
            let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            entries[0] = LinkedArrayListSlot {
                slot: Slot::empty(),
                count: 1,
            };
            let pos = self.append_linked_block(&entries)?;
            return Ok((Slot::new(Tag::Index, pos as i64), pos));
        }
        let (chain, leaf) = self.linked_fresh_chain(shift - 1)?;
        let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
        entries[0] = LinkedArrayListSlot {
            slot: chain,
            count: 1,
        };
        let pos = self.append_linked_block(&entries)?;
        Ok((Slot::new(Tag::Index, pos as i64), leaf))
    }

    /// Build the list covering `[offset, offset + size)`. Always produces a
    /// freshly written root block; wholly contained children are shared by
    /// reference.
    fn linked_slice(
        &self,
        header: &LinkedArrayListHeader,
        offset: u64,
        size: u64,
    ) -> Result<LinkedArrayListHeader, Error> {
        if offset + size > header.size {
            return Err(Error::KeyNotFound);
        }
        if size == 0 {
            let entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            let pos = self.append_linked_block(&entries)?;
            return Ok(LinkedArrayListHeader {
                size: 0,
                ptr: pos,
                shift: 0,
            });
        }

        // descend while the range sits inside a single child
        let mut block_pos = header.ptr;
        let mut shift = header.shift;
        let mut offset = offset;
        while shift > 0 {
            let entries = self.read_linked_block(block_pos)?;
            let (a, off_a) = locate(&entries, offset)?;
            let (b, _) = locate(&entries, offset + size - 1)?;
            if a != b {
                break;
            }
            let entry = entries[a];
            if entry.slot.tag != Tag::Index {
                return Err(Error::UnexpectedTag);
            }
            block_pos = entry.slot.offset()?;
            shift -= 1;
            offset = off_a;
        }

        let entry = self.linked_slice_exact(block_pos, shift, offset, size)?;
        Ok(LinkedArrayListHeader {
            size,
            ptr: entry.slot.offset()?,
            shift,
        })
    }

    /// Rebuild the subtree of exact height `shift` covering the given range
    /// of the block at `block_pos`.
    fn linked_slice_exact(
        &self,
        block_pos: u64,
        shift: u8,
        offset: u64,
        size: u64,
    ) -> Result<LinkedArrayListSlot, Error> {
        let entries = self.read_linked_block(block_pos)?;
        if shift == 0 {
            let mut out = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            for (j, k) in (offset..offset + size).enumerate() {
                out[j] = entries[k as usize];
            }
            let pos = self.append_linked_block(&out)?;
            return Ok(LinkedArrayListSlot {
                slot: Slot::new(Tag::Index, pos as i64),
                count: size,
            });
        }

        let (a, off_a) = locate(&entries, offset)?;
        let (b, off_b) = locate(&entries, offset + size - 1)?;
        if a == b {
            let entry = entries[a];
            let inner = if off_a == 0 && size == entry.count {
                entry
            } else {
                self.linked_slice_exact(entry.slot.offset()?, shift - 1, off_a, size)?
            };
            let mut out = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            out[0] = sealed(inner);
            let pos = self.append_spine_block(&out)?;
            return Ok(LinkedArrayListSlot {
                slot: Slot::new(Tag::Index, pos as i64),
                count: size,
            });
        }

        // rebuild the two edge children, share the middles
        let left = if off_a == 0 {
            entries[a]
        } else {
            self.linked_slice_exact(
                entries[a].slot.offset()?,
                shift - 1,
                off_a,
                entries[a].count - off_a,
            )?
        };
        let right = if off_b + 1 == entries[b].count {
            entries[b]
        } else {
            self.linked_slice_exact(entries[b].slot.offset()?, shift - 1, 0, off_b + 1)?
        };
        let mut out = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
        let mut at = 0;
        out[at] = sealed(left);
        at += 1;
        for entry in entries.iter().take(b).skip(a + 1) {
            out[at] = sealed(*entry);
            at += 1;
        }
        out[at] = sealed(right);
        let pos = self.append_spine_block(&out)?;
        Ok(LinkedArrayListSlot {
            slot: Slot::new(Tag::Index, pos as i64),
            count: size,
        })
    }

    /// Merge two lists by rebuilding the seam between A's rightmost and B's
    /// leftmost spine, at most two new blocks per level.
    fn linked_concat(
        &self,
        a: &LinkedArrayListHeader,
        b: &LinkedArrayListHeader,
    ) -> Result<LinkedArrayListHeader, Error> {
        if a.size == 0 {
            return Ok(LinkedArrayListHeader {
                size: b.size,
                ptr: self.seal_copy_block(b.ptr, b.shift)?,
                shift: b.shift,
            });
        }
        if b.size == 0 {
            return Ok(*a);
        }

        // equalize heights by wrapping the shorter side
        let (mut a_root, mut a_shift) = (a.ptr, a.shift);
        let (mut b_root, mut b_shift) = (b.ptr, b.shift);
        while a_shift < b_shift {
            let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            entries[0] = sealed(LinkedArrayListSlot {
                slot: Slot::new(Tag::Index, a_root as i64),
                count: a.size,
            });
            a_root = self.append_spine_block(&entries)?;
            a_shift += 1;
        }
        while b_shift < a_shift {
            let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            entries[0] = sealed(LinkedArrayListSlot {
                slot: Slot::new(Tag::Index, b_root as i64),
                count: b.size,
            });
            b_root = self.append_spine_block(&entries)?;
            b_shift += 1;
        }

        // gather the facing spines, root first
        let mut a_spine = Vec::with_capacity(a_shift as usize + 1);
        let mut pos = a_root;
        for level in (0..=a_shift).rev() {
            let entries = self.read_linked_block(pos)?;
            let last = last_used(&entries).ok_or(Error::NoAvailableSlots)?;
            a_spine.push((entries, last));
            if level > 0 {
                pos = entries[last].slot.offset()?;
            }
        }
        let mut b_spine = Vec::with_capacity(b_shift as usize + 1);
        let mut pos = b_root;
        for level in (0..=b_shift).rev() {
            let entries = self.read_linked_block(pos)?;
            let (first, _) = locate(&entries, 0)?;
            b_spine.push((entries, first));
            if level > 0 {
                pos = entries[first].slot.offset()?;
            }
        }

        // merge the seam bottom-up; `carry` holds the 1-2 subtrees that
        // replace it at the next level
        let mut carry: Vec<LinkedArrayListSlot> = Vec::new();
        for level in 0..=a_shift {
            let (a_entries, a_last) = &a_spine[(a_shift - level) as usize];
            let (b_entries, b_first) = &b_spine[(a_shift - level) as usize];
            let mut children: Vec<LinkedArrayListSlot> = Vec::new();
            if level == 0 {
                children.extend(a_entries.iter().take(a_last + 1).copied());
                children.extend(b_entries.iter().skip(*b_first).filter(|e| e.count > 0).copied());
            } else {
                children.extend(
                    a_entries
                        .iter()
                        .take(*a_last)
                        .filter(|e| e.count > 0)
                        .copied(),
                );
                children.append(&mut carry);
                children.extend(
                    b_entries
                        .iter()
                        .skip(b_first + 1)
                        .filter(|e| e.count > 0)
                        .copied(),
                );
            }
            carry = self.write_merged_level(&children, level == 0)?;
        }

        let size = a.size + b.size;
        if carry.len() == 1 {
            Ok(LinkedArrayListHeader {
                size,
                ptr: carry[0].slot.offset()?,
                shift: a_shift,
            })
        } else {
            let shift = a_shift + 1;
            if shift > MAX_SHIFT {
                return Err(Error::MaxShiftExceeded);
            }
            let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            entries[0] = sealed(carry[0]);
            entries[1] = sealed(carry[1]);
            Ok(LinkedArrayListHeader {
                size,
                ptr: self.append_spine_block(&entries)?,
                shift,
            })
        }
    }

    /// Write `children` into one block, or two when they overflow 16.
    fn write_merged_level(
        &self,
        children: &[LinkedArrayListSlot],
        leaf: bool,
    ) -> Result<Vec<LinkedArrayListSlot>, Error> {
        let mut out = Vec::with_capacity(2);
        for chunk in children.chunks(SLOT_COUNT as usize) {
            let mut entries = [LinkedArrayListSlot::default(); SLOT_COUNT as usize];
            for (i, child) in chunk.iter().enumerate() {
                entries[i] = if leaf { *child } else { sealed(*child) };
            }
            let pos = if leaf {
                self.append_linked_block(&entries)?
            } else {
                self.append_spine_block(&entries)?
            };
            out.push(LinkedArrayListSlot {
                slot: Slot::new(Tag::Index, pos as i64),
                count: chunk.iter().map(|c| c.count).sum(),
            });
        }
        Ok(out)
    }

    // ---- path parts --------------------------------------------------------

    pub(crate) fn linked_array_list_init(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
    ) -> Result<SlotPointer, Error> {
        let pos = match ptr.position {
            None => return Err(Error::InvalidTopLevelType),
            Some(pos) => pos,
        };
        let slot = match ptr.slot.tag {
            Tag::None => {
                let header_pos = self.store.len()?;
                let header = LinkedArrayListHeader {
                    size: 0,
                    ptr: header_pos + LinkedArrayListHeader::SIZE,
                    shift: 0,
                };
                header.write(&self.store, header_pos)?;
                self.store.write_all(&[0u8; LINKED_BLOCK_SIZE as usize])?;
                let slot = Slot::new(Tag::LinkedArrayList, header_pos as i64);
                self.write_slot(pos, slot)?;
                slot
            }
            Tag::LinkedArrayList => {
                let header_pos = ptr.slot.offset()?;
                if self.needs_copy(header_pos)? {
                    let header = LinkedArrayListHeader::read(&self.store, header_pos)?;
                    let new_header_pos = self.store.len()?;
                    let copy = LinkedArrayListHeader {
                        size: header.size,
                        ptr: new_header_pos + LinkedArrayListHeader::SIZE,
                        shift: header.shift,
                    };
                    copy.write(&self.store, new_header_pos)?;
                    let mut block = [0u8; LINKED_BLOCK_SIZE as usize];
                    self.store.seek(header.ptr)?;
                    self.store.read_exact(&mut block)?;
                    self.store.seek(copy.ptr)?;
                    self.store.write_all(&block)?;
                    let slot = Slot::new(Tag::LinkedArrayList, new_header_pos as i64);
                    self.write_slot(pos, slot)?;
                    slot
                } else {
                    ptr.slot
                }
            }
            _ => return Err(Error::UnexpectedTag),
        };
        self.execute(mode, path, idx + 1, SlotPointer::new(pos, slot))
    }

    pub(crate) fn linked_array_list_get(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        index: i64,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.linked_header_pos(&ptr)?;
        let mut header = LinkedArrayListHeader::read(&self.store, header_pos)?;
        let key = wrap_index(index, header.size)?;
        if mode == Mode::ReadWrite && self.needs_copy(header.ptr)? {
            header.ptr = self.copy_block(header.ptr, LINKED_BLOCK_SIZE)?;
            header.write(&self.store, header_pos)?;
        }
        let target = self.linked_lookup(mode, header.ptr, header.shift, key)?;
        self.execute(mode, path, idx + 1, target)
    }

    pub(crate) fn linked_array_list_append(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.linked_header_pos(&ptr)?;
        let mut header = LinkedArrayListHeader::read(&self.store, header_pos)?;
        let leaf = self.linked_append(&mut header)?;
        header.write(&self.store, header_pos)?;
        self.execute(
            mode,
            path,
            idx + 1,
            SlotPointer::new(leaf, self.read_slot(leaf)?),
        )
    }

    pub(crate) fn linked_array_list_slice(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        offset: u64,
        size: u64,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.linked_header_pos(&ptr)?;
        let header = LinkedArrayListHeader::read(&self.store, header_pos)?;
        let sliced = self.linked_slice(&header, offset, size)?;
        sliced.write(&self.store, header_pos)?;
        self.execute(mode, path, idx + 1, ptr)
    }

    pub(crate) fn linked_array_list_concat(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        other: Slot,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.linked_header_pos(&ptr)?;
        if other.tag != Tag::LinkedArrayList {
            return Err(Error::UnexpectedTag);
        }
        let a = LinkedArrayListHeader::read(&self.store, header_pos)?;
        let b = LinkedArrayListHeader::read(&self.store, other.offset()?)?;
        let merged = self.linked_concat(&a, &b)?;
        merged.write(&self.store, header_pos)?;
        self.execute(mode, path, idx + 1, ptr)
    }

    pub(crate) fn linked_array_list_insert(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        index: u64,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.linked_header_pos(&ptr)?;
        let header = LinkedArrayListHeader::read(&self.store, header_pos)?;
        if index > header.size {
            return Err(Error::KeyNotFound);
        }
        let mut left = self.linked_slice(&header, 0, index)?;
        self.linked_append(&mut left)?;
        let right = self.linked_slice(&header, index, header.size - index)?;
        let merged = self.linked_concat(&left, &right)?;
        merged.write(&self.store, header_pos)?;
        // resolve the inserted slot in the merged tree
        let target = self.linked_lookup(mode, merged.ptr, merged.shift, index)?;
        self.execute(mode, path, idx + 1, target)
    }

    pub(crate) fn linked_array_list_remove(
        &self,
        mode: Mode,
        path: &[PathPart<'_, S, H>],
        idx: usize,
        ptr: SlotPointer,
        index: u64,
    ) -> Result<SlotPointer, Error> {
        let header_pos = self.linked_header_pos(&ptr)?;
        let header = LinkedArrayListHeader::read(&self.store, header_pos)?;
        if index >= header.size {
            return Err(Error::KeyNotFound);
        }
        let left = self.linked_slice(&header, 0, index)?;
        let right = self.linked_slice(&header, index + 1, header.size - index - 1)?;
        let merged = self.linked_concat(&left, &right)?;
        merged.write(&self.store, header_pos)?;
        self.execute(mode, path, idx + 1, ptr)
    }
}

/// Read view over a linked array list.
pub struct LinkedArrayList<'a, S, H> {
    cursor: ReadCursor<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> LinkedArrayList<'a, S, H> {
    pub fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        match cursor.slot().tag {
            Tag::LinkedArrayList | Tag::None => Ok(LinkedArrayList { cursor }),
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
        cursor.read_path(&[PathPart::LinkedArrayListGet(index)])
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

/// Write view over a linked array list.
pub struct LinkedArrayListMut<'a, S, H> {
    cursor: WriteCursor<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> LinkedArrayListMut<'a, S, H> {
    pub fn new(cursor: WriteCursor<'a, S, H>) -> Result<Self, Error> {
        let cursor = cursor.write_path(&[PathPart::LinkedArrayListInit])?;
        Ok(LinkedArrayListMut { cursor })
    }

    pub fn read_only(&self) -> LinkedArrayList<'a, S, H> {
        LinkedArrayList {
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

    /// The list's own slot, as needed by [`Self::concat`].
    pub fn slot(&self) -> Result<Slot, Error> {
        Ok(self.cursor.read_only().refreshed()?.slot())
    }

    pub fn append(&mut self, value: Value<'_>) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListAppend,
            PathPart::WriteData(value),
        ])?;
        Ok(())
    }

    pub fn append_cursor(&mut self) -> Result<WriteCursor<'a, S, H>, Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListAppend,
        ])
    }

    pub fn put(&mut self, index: i64, value: Value<'_>) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListGet(index),
            PathPart::WriteData(value),
        ])?;
        Ok(())
    }

    /// Keep `size` elements starting at `offset`.
    pub fn slice(&mut self, offset: u64, size: u64) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListSlice { offset, size },
        ])?;
        Ok(())
    }

    /// Append every element of the list behind `other` to this one.
    pub fn concat(&mut self, other: Slot) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListConcat(other),
        ])?;
        Ok(())
    }

    pub fn insert(&mut self, index: u64, value: Value<'_>) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListInsert(index),
            PathPart::WriteData(value),
        ])?;
        Ok(())
    }

    pub fn remove(&mut self, index: u64) -> Result<(), Error> {
        self.cursor.write_path(&[
            PathPart::LinkedArrayListInit,
            PathPart::LinkedArrayListRemove(index),
        ])?;
        Ok(())
    }

    pub fn cursor(&self) -> WriteCursor<'a, S, H> {
        self.cursor
    }
}
