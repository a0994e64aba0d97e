// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use burl::{ArrayList, ArrayListMut, Database, HashMapMut, Sha1, Value};
use burl_store::MemoryStore;

fn open_db() -> Database<MemoryStore, Sha1> {
    Database::open(MemoryStore::new()).unwrap()
}

/// A nested list under a hash-map root writes in place, with no transaction
/// framing to set up.
fn with_list<F>(f: F)
where
    F: for<'a> FnOnce(&mut ArrayListMut<'a, MemoryStore, Sha1>),
{
    let db = open_db();
    let mut root = HashMapMut::new(db.root_write_cursor()).unwrap();
    let mut list = ArrayListMut::new(root.put_cursor(b"list").unwrap()).unwrap();
    f(&mut list);
}

#[test]
fn append_and_get_across_levels() {
    with_list(|list| {
        for i in 0..1000u64 {
            list.append(Value::Uint(i)).unwrap();
        }
        assert_eq!(list.count().unwrap(), 1000);
        for i in 0..1000u64 {
            let cursor = list.get(i as i64).unwrap().unwrap();
            assert_eq!(cursor.read_uint().unwrap(), i);
        }
        // negative indexes wrap from the end
        assert_eq!(list.get(-1).unwrap().unwrap().read_uint().unwrap(), 999);
        assert_eq!(list.get(-1000).unwrap().unwrap().read_uint().unwrap(), 0);
        assert!(list.get(1000).unwrap().is_none());
        assert!(list.get(-1001).unwrap().is_none());
    });
}

#[test]
fn iteration_is_in_index_order() {
    with_list(|list| {
        for i in 0..40u64 {
            list.append(Value::Uint(i)).unwrap();
        }
        let values: Vec<u64> = list
            .iter()
            .unwrap()
            .map(|c| c.unwrap().read_uint().unwrap())
            .collect();
        assert_eq!(values, (0..40).collect::<Vec<u64>>());
    });
}

#[test]
fn put_overwrites_in_place() {
    with_list(|list| {
        for i in 0..20u64 {
            list.append(Value::Uint(i)).unwrap();
        }
        list.put(7, Value::Uint(700)).unwrap();
        list.put(-1, Value::Uint(1900)).unwrap();
        assert_eq!(list.get(7).unwrap().unwrap().read_uint().unwrap(), 700);
        assert_eq!(list.get(19).unwrap().unwrap().read_uint().unwrap(), 1900);
        assert_eq!(list.get(6).unwrap().unwrap().read_uint().unwrap(), 6);
        assert_eq!(list.count().unwrap(), 20);
    });
}

#[test]
fn slice_keeps_the_prefix() {
    with_list(|list| {
        for i in 0..300u64 {
            list.append(Value::Uint(i)).unwrap();
        }
        list.slice(5).unwrap();
        assert_eq!(list.count().unwrap(), 5);
        for i in 0..5u64 {
            assert_eq!(list.get(i as i64).unwrap().unwrap().read_uint().unwrap(), i);
        }
        assert!(list.get(5).unwrap().is_none());

        // appends continue from the new end
        list.append(Value::Uint(500)).unwrap();
        assert_eq!(list.count().unwrap(), 6);
        assert_eq!(list.get(-1).unwrap().unwrap().read_uint().unwrap(), 500);
    });
}

#[test]
fn slice_to_zero_and_rebuild() {
    with_list(|list| {
        for i in 0..17u64 {
            list.append(Value::Uint(i)).unwrap();
        }
        list.slice(0).unwrap();
        assert_eq!(list.count().unwrap(), 0);
        assert!(list.get(0).unwrap().is_none());

        list.append(Value::Uint(42)).unwrap();
        assert_eq!(list.count().unwrap(), 1);
        assert_eq!(list.get(0).unwrap().unwrap().read_uint().unwrap(), 42);
    });
}

#[test]
fn oversized_slice_is_rejected() {
    with_list(|list| {
        list.append(Value::Uint(1)).unwrap();
        assert_eq!(list.slice(2), Err(burl::Error::KeyNotFound));
    });
}

#[test]
fn top_level_appends_commit_one_transaction_each() {
    let db = open_db();
    let mut history = ArrayListMut::new(db.root_write_cursor()).unwrap();
    for i in 0..30u64 {
        history.append(Value::Uint(i)).unwrap();
    }
    let history = ArrayList::new(db.root_cursor()).unwrap();
    assert_eq!(history.count().unwrap(), 30);
    for i in 0..30u64 {
        assert_eq!(
            history.get(i as i64).unwrap().unwrap().read_uint().unwrap(),
            i
        );
    }
}

#[test]
fn append_cursor_leaves_an_addressable_empty_slot() {
    with_list(|list| {
        list.append(Value::Uint(1)).unwrap();
        {
            let mut cursor = list.append_cursor().unwrap();
            assert!(cursor.slot().is_empty());
            cursor.write(Value::Uint(2)).unwrap();
        }
        assert_eq!(list.count().unwrap(), 2);
        assert_eq!(list.get(1).unwrap().unwrap().read_uint().unwrap(), 2);
    });
}
