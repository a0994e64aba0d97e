// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Embedded, single-file, append-only, immutable-history database.
//!
//! A burl database maps a single root value — typically an ordered history
//! list — to a tree of nested collections and scalars, persisted in one
//! randomly accessible byte container. Every mutation is copy-on-write: old
//! data stays addressable by position, each transaction appends new index
//! blocks and data, and snapshots of past states are plain reads against
//! historical positions.
//!
//! Collections come in three shapes: a 16-ary radix [`ArrayList`] for dense
//! ordered sequences, a hash-array-mapped trie behind [`HashMap`] /
//! [`HashSet`] (with counted variants), and an RRB-style
//! [`LinkedArrayList`] supporting slice, concat, insert and remove with
//! structural sharing.
//!
//! ```
//! use burl::{ArrayListMut, Database, HashMapMut, HashMap, Sha1, Value};
//! use burl_store::MemoryStore;
//!
//! let db = Database::<_, Sha1>::open(MemoryStore::new()).unwrap();
//! let mut history = ArrayListMut::new(db.root_write_cursor()).unwrap();
//!
//! // one transaction: append a moment and fill it in
//! history
//!     .append_context(None, |cursor| {
//!         let mut moment = HashMapMut::new(cursor)?;
//!         moment.put(b"name", Value::from("burl"))?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let moment = HashMap::new(history.get(-1).unwrap().unwrap()).unwrap();
//! let name = moment.get(b"name").unwrap().unwrap();
//! assert_eq!(name.read_bytes(None).unwrap(), b"burl");
//! ```

mod array_list;
mod cursor;
mod database;
mod error;
mod hash;
mod hash_map;
mod hash_set;
mod header;
mod iter;
mod linked_array_list;
mod path;
mod slot;

pub use self::array_list::{ArrayList, ArrayListMut};
pub use self::cursor::{BytesObject, KeyValuePairCursor, ReadCursor, Reader, WriteCursor, Writer};
pub use self::database::Database;
pub use self::error::Error;
pub use self::hash::{Hasher, Sha1, Sha256};
pub use self::hash_map::{CountedHashMap, CountedHashMapMut, HashMap, HashMapMut};
pub use self::hash_set::{CountedHashSet, CountedHashSetMut, HashSet, HashSetMut};
pub use self::header::HEADER_LENGTH;
pub use self::iter::{Iter, IterMut};
pub use self::linked_array_list::{LinkedArrayList, LinkedArrayListMut};
pub use self::path::{ContextFn, HashTarget, PathPart, Value};
pub use self::slot::{Slot, SlotPointer, Tag, SLOT_SIZE};
