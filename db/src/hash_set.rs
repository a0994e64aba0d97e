// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cursor::{ReadCursor, WriteCursor};
use crate::error::Error;
use crate::hash::Hasher;
use crate::iter::Iter;
use crate::path::{HashTarget, PathPart, Value};
use crate::slot::Tag;
use burl_store::Store;

/// Read view over a hash set. The layout is a hash map whose value slots
/// are unused; the key slot holds the member's literal bytes.
pub struct HashSet<'a, S, H> {
    cursor: ReadCursor<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> HashSet<'a, S, H> {
    pub fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        match cursor.slot().tag {
            Tag::HashSet | Tag::CountedHashSet | Tag::None => Ok(HashSet { cursor }),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub(crate) fn wrap(cursor: ReadCursor<'a, S, H>) -> Self {
        HashSet { cursor }
    }

    /// Cursor over the stored member bytes, when present.
    pub fn get(&self, member: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        let cursor = self.cursor.refreshed()?;
        if cursor.slot().tag == Tag::None {
            return Ok(None);
        }
        cursor.read_path(&[PathPart::HashMapGet {
            target: HashTarget::Key,
            hash: &H::digest(member),
        }])
    }

    pub fn contains(&self, member: &[u8]) -> Result<bool, Error> {
        Ok(self.get(member)?.is_some())
    }

    /// Iterate over the set's pair records in block order.
    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.cursor.iter()
    }

    pub fn cursor(&self) -> ReadCursor<'a, S, H> {
        self.cursor
    }
}

/// Write view over a hash set.
pub struct HashSetMut<'a, S, H> {
    cursor: WriteCursor<'a, S, H>,
    counted: bool,
}

impl<'a, S: Store, H: Hasher> HashSetMut<'a, S, H> {
    pub fn new(cursor: WriteCursor<'a, S, H>) -> Result<Self, Error> {
        Self::init(cursor, false)
    }

    pub(crate) fn init(cursor: WriteCursor<'a, S, H>, counted: bool) -> Result<Self, Error> {
        let cursor = cursor.write_path(&[PathPart::HashMapInit { counted, set: true }])?;
        Ok(HashSetMut { cursor, counted })
    }

    pub fn read_only(&self) -> HashSet<'a, S, H> {
        HashSet::wrap(self.cursor.read_only())
    }

    pub fn get(&self, member: &[u8]) -> Result<Option<ReadCursor<'a, S, H>>, Error> {
        self.read_only().get(member)
    }

    pub fn contains(&self, member: &[u8]) -> Result<bool, Error> {
        self.read_only().contains(member)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.read_only().iter()
    }

    /// Add `member`, reporting whether it was new.
    pub fn put(&mut self, member: &[u8]) -> Result<bool, Error> {
        let hash = H::digest(member);
        let mut key_cursor = self.cursor.write_path(&[
            PathPart::HashMapInit {
                counted: self.counted,
                set: true,
            },
            PathPart::HashMapGet {
                target: HashTarget::Key,
                hash: &hash,
            },
        ])?;
        key_cursor.write_if_empty(Value::Bytes(member))
    }

    /// Remove `member`, reporting whether it was present.
    pub fn remove(&mut self, member: &[u8]) -> Result<bool, Error> {
        match self.cursor.write_path(&[
            PathPart::HashMapInit {
                counted: self.counted,
                set: true,
            },
            PathPart::HashMapRemove(&H::digest(member)),
        ]) {
            Ok(_) => Ok(true),
            Err(Error::KeyNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn cursor(&self) -> WriteCursor<'a, S, H> {
        self.cursor
    }
}

/// Read view over a hash set carrying a population counter.
pub struct CountedHashSet<'a, S, H> {
    inner: HashSet<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> CountedHashSet<'a, S, H> {
    pub fn new(cursor: ReadCursor<'a, S, H>) -> Result<Self, Error> {
        match cursor.slot().tag {
            Tag::CountedHashSet | Tag::None => Ok(CountedHashSet {
                inner: HashSet::wrap(cursor),
            }),
            _ => Err(Error::UnexpectedTag),
        }
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.inner.cursor.refreshed()?.count()
    }

    pub fn contains(&self, member: &[u8]) -> Result<bool, Error> {
        self.inner.contains(member)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.inner.iter()
    }
}

/// Write view over a counted hash set.
pub struct CountedHashSetMut<'a, S, H> {
    inner: HashSetMut<'a, S, H>,
}

impl<'a, S: Store, H: Hasher> CountedHashSetMut<'a, S, H> {
    pub fn new(cursor: WriteCursor<'a, S, H>) -> Result<Self, Error> {
        Ok(CountedHashSetMut {
            inner: HashSetMut::init(cursor, true)?,
        })
    }

    pub fn count(&self) -> Result<u64, Error> {
        self.inner.cursor.read_only().refreshed()?.count()
    }

    pub fn contains(&self, member: &[u8]) -> Result<bool, Error> {
        self.inner.contains(member)
    }

    pub fn iter(&self) -> Result<Iter<'a, S, H>, Error> {
        self.inner.iter()
    }

    pub fn put(&mut self, member: &[u8]) -> Result<bool, Error> {
        self.inner.put(member)
    }

    pub fn remove(&mut self, member: &[u8]) -> Result<bool, Error> {
        self.inner.remove(member)
    }
}
