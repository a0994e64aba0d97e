// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use burl::{Database, Error, HashMapMut, LinkedArrayListMut, Sha1, Value};
use burl_store::MemoryStore;

fn open_db() -> Database<MemoryStore, Sha1> {
    Database::open(MemoryStore::new()).unwrap()
}

fn with_list<F>(f: F)
where
    F: for<'a> FnOnce(&mut LinkedArrayListMut<'a, MemoryStore, Sha1>),
{
    let db = open_db();
    let mut root = HashMapMut::new(db.root_write_cursor()).unwrap();
    let mut list = LinkedArrayListMut::new(root.put_cursor(b"list").unwrap()).unwrap();
    f(&mut list);
}

fn fill(list: &mut LinkedArrayListMut<'_, MemoryStore, Sha1>, range: std::ops::Range<u64>) {
    for i in range {
        list.append(Value::Uint(i)).unwrap();
    }
}

fn contents(list: &LinkedArrayListMut<'_, MemoryStore, Sha1>) -> Vec<u64> {
    list.iter()
        .unwrap()
        .map(|c| c.unwrap().read_uint().unwrap())
        .collect()
}

#[test]
fn append_and_get_across_levels() {
    with_list(|list| {
        fill(list, 0..500);
        assert_eq!(list.count().unwrap(), 500);
        for i in 0..500u64 {
            assert_eq!(list.get(i as i64).unwrap().unwrap().read_uint().unwrap(), i);
        }
        assert_eq!(list.get(-1).unwrap().unwrap().read_uint().unwrap(), 499);
        assert!(list.get(500).unwrap().is_none());
        assert_eq!(contents(list), (0..500).collect::<Vec<u64>>());
    });
}

#[test]
fn put_overwrites_in_place() {
    with_list(|list| {
        fill(list, 0..40);
        list.put(11, Value::Uint(1100)).unwrap();
        assert_eq!(list.get(11).unwrap().unwrap().read_uint().unwrap(), 1100);
        assert_eq!(list.get(10).unwrap().unwrap().read_uint().unwrap(), 10);
        assert_eq!(list.get(12).unwrap().unwrap().read_uint().unwrap(), 12);
    });
}

#[test]
fn slice_extracts_a_middle_window() {
    with_list(|list| {
        fill(list, 0..300);
        list.slice(37, 100).unwrap();
        assert_eq!(list.count().unwrap(), 100);
        assert_eq!(contents(list), (37..137).collect::<Vec<u64>>());

        // appends after a slice extend the window
        list.append(Value::Uint(9000)).unwrap();
        assert_eq!(list.count().unwrap(), 101);
        assert_eq!(list.get(-1).unwrap().unwrap().read_uint().unwrap(), 9000);
        assert_eq!(list.get(99).unwrap().unwrap().read_uint().unwrap(), 136);
    });
}

#[test]
fn slice_edges() {
    with_list(|list| {
        fill(list, 0..50);
        list.slice(0, 50).unwrap();
        assert_eq!(contents(list), (0..50).collect::<Vec<u64>>());

        list.slice(0, 0).unwrap();
        assert_eq!(list.count().unwrap(), 0);

        fill(list, 0..3);
        assert_eq!(contents(list), vec![0, 1, 2]);
        assert_eq!(list.slice(1, 3), Err(Error::KeyNotFound));
    });
}

#[test]
fn concat_preserves_order_and_sources() {
    let db = open_db();
    let mut root = HashMapMut::new(db.root_write_cursor()).unwrap();
    let mut a = LinkedArrayListMut::new(root.put_cursor(b"a").unwrap()).unwrap();
    let mut b = LinkedArrayListMut::new(root.put_cursor(b"b").unwrap()).unwrap();

    for i in 0..40u64 {
        a.append(Value::Uint(i)).unwrap();
    }
    for i in 1000..1025u64 {
        b.append(Value::Uint(i)).unwrap();
    }

    a.concat(b.slot().unwrap()).unwrap();
    assert_eq!(a.count().unwrap(), 65);
    let mut expected: Vec<u64> = (0..40).collect();
    expected.extend(1000..1025);
    let got: Vec<u64> = a
        .iter()
        .unwrap()
        .map(|c| c.unwrap().read_uint().unwrap())
        .collect();
    assert_eq!(got, expected);

    // the source list is untouched, even after the result keeps growing
    a.append(Value::Uint(7777)).unwrap();
    assert_eq!(b.count().unwrap(), 25);
    let b_got: Vec<u64> = b
        .iter()
        .unwrap()
        .map(|c| c.unwrap().read_uint().unwrap())
        .collect();
    assert_eq!(b_got, (1000..1025).collect::<Vec<u64>>());
    assert_eq!(a.get(65).unwrap().unwrap().read_uint().unwrap(), 7777);
}

#[test]
fn concat_with_empty_sides() {
    let db = open_db();
    let mut root = HashMapMut::new(db.root_write_cursor()).unwrap();
    let mut a = LinkedArrayListMut::new(root.put_cursor(b"a").unwrap()).unwrap();
    let mut b = LinkedArrayListMut::new(root.put_cursor(b"b").unwrap()).unwrap();

    for i in 0..5u64 {
        b.append(Value::Uint(i)).unwrap();
    }
    // empty ++ b
    a.concat(b.slot().unwrap()).unwrap();
    assert_eq!(a.count().unwrap(), 5);

    // a ++ empty
    let empty = LinkedArrayListMut::new(root.put_cursor(b"empty").unwrap()).unwrap();
    a.concat(empty.slot().unwrap()).unwrap();
    assert_eq!(a.count().unwrap(), 5);
    let got: Vec<u64> = a
        .iter()
        .unwrap()
        .map(|c| c.unwrap().read_uint().unwrap())
        .collect();
    assert_eq!(got, (0..5).collect::<Vec<u64>>());
}

#[test]
fn insert_at_the_front_a_thousand_times() {
    with_list(|list| {
        list.append(Value::Uint(1000)).unwrap();
        for v in 0..1000u64 {
            list.insert(0, Value::Uint(v)).unwrap();
        }
        assert_eq!(list.count().unwrap(), 1001);
        for i in 0..1000u64 {
            assert_eq!(
                list.get(i as i64).unwrap().unwrap().read_uint().unwrap(),
                999 - i,
                "wrong value at {}",
                i
            );
        }
        assert_eq!(list.get(1000).unwrap().unwrap().read_uint().unwrap(), 1000);
        assert_eq!(list.get(0).unwrap().unwrap().read_uint().unwrap(), 999);
    });
}

#[test]
fn insert_in_the_middle_and_at_the_end() {
    with_list(|list| {
        fill(list, 0..50);
        list.insert(17, Value::Uint(9999)).unwrap();
        assert_eq!(list.count().unwrap(), 51);
        assert_eq!(list.get(16).unwrap().unwrap().read_uint().unwrap(), 16);
        assert_eq!(list.get(17).unwrap().unwrap().read_uint().unwrap(), 9999);
        assert_eq!(list.get(18).unwrap().unwrap().read_uint().unwrap(), 17);

        list.insert(51, Value::Uint(50)).unwrap();
        assert_eq!(list.get(-1).unwrap().unwrap().read_uint().unwrap(), 50);

        assert_eq!(
            list.insert(53, Value::Uint(0)),
            Err(Error::KeyNotFound)
        );
    });
}

#[test]
fn insert_then_remove_restores_the_sequence() {
    with_list(|list| {
        fill(list, 0..50);
        let before = contents(list);
        list.insert(17, Value::Uint(9999)).unwrap();
        list.remove(17).unwrap();
        assert_eq!(contents(list), before);
    });
}

#[test]
fn remove_edges() {
    with_list(|list| {
        fill(list, 0..20);
        list.remove(0).unwrap();
        assert_eq!(list.get(0).unwrap().unwrap().read_uint().unwrap(), 1);
        list.remove(18).unwrap();
        assert_eq!(list.get(-1).unwrap().unwrap().read_uint().unwrap(), 18);
        assert_eq!(list.count().unwrap(), 18);
        assert_eq!(list.remove(18), Err(Error::KeyNotFound));

        let remaining = contents(list);
        assert_eq!(remaining, (1..19).collect::<Vec<u64>>());
    });
}

#[test]
fn linked_lists_participate_in_transactions() {
    let db = open_db();
    let mut history = burl::ArrayListMut::new(db.root_write_cursor()).unwrap();
    history
        .append_context(None, |cursor| {
            let mut moment = HashMapMut::new(cursor)?;
            let mut list = LinkedArrayListMut::new(moment.put_cursor(b"list")?)?;
            for i in 0..10u64 {
                list.append(Value::Uint(i))?;
            }
            Ok(())
        })
        .unwrap();

    let seed = history.get_slot(-1).unwrap();
    history
        .append_context(seed, |cursor| {
            let mut moment = HashMapMut::new(cursor)?;
            let mut list = LinkedArrayListMut::new(moment.put_cursor(b"list")?)?;
            list.insert(0, Value::Uint(100))?;
            list.remove(10)?;
            Ok(())
        })
        .unwrap();

    let history = burl::ArrayList::new(db.root_cursor()).unwrap();

    let old = burl::HashMap::new(history.get(0).unwrap().unwrap()).unwrap();
    let old_list = burl::LinkedArrayList::new(old.get(b"list").unwrap().unwrap()).unwrap();
    assert_eq!(old_list.count().unwrap(), 10);
    assert_eq!(old_list.get(0).unwrap().unwrap().read_uint().unwrap(), 0);

    let new = burl::HashMap::new(history.get(1).unwrap().unwrap()).unwrap();
    let new_list = burl::LinkedArrayList::new(new.get(b"list").unwrap().unwrap()).unwrap();
    assert_eq!(new_list.count().unwrap(), 10);
    assert_eq!(new_list.get(0).unwrap().unwrap().read_uint().unwrap(), 100);
    assert_eq!(new_list.get(-1).unwrap().unwrap().read_uint().unwrap(), 8);
}
