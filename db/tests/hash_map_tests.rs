// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use burl::{
    CountedHashMapMut, CountedHashSetMut, Database, HashMapMut, HashSetMut, Sha1, Value,
};
use burl_store::MemoryStore;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;

fn open_db() -> Database<MemoryStore, Sha1> {
    Database::open(MemoryStore::new()).unwrap()
}

#[test]
fn put_get_overwrite_remove() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();

    map.put(b"hello", Value::from("world")).unwrap();
    assert_eq!(
        map.get(b"hello").unwrap().unwrap().read_bytes(None).unwrap(),
        b"world"
    );

    map.put(b"hello", Value::from("there")).unwrap();
    assert_eq!(
        map.get(b"hello").unwrap().unwrap().read_bytes(None).unwrap(),
        b"there"
    );

    assert!(map.remove(b"hello").unwrap());
    assert!(map.get(b"hello").unwrap().is_none());
    assert!(!map.remove(b"hello").unwrap());
}

#[test]
fn stored_keys_read_back_literally() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();
    map.put(b"some key", Value::Uint(9)).unwrap();

    let key = map.get_key(b"some key").unwrap().unwrap();
    assert_eq!(key.read_bytes(None).unwrap(), b"some key");

    let pair = map.get_key_value_pair(b"some key").unwrap().unwrap();
    assert_eq!(pair.hash, Database::<MemoryStore, Sha1>::hash(b"some key"));
    assert_eq!(pair.key.read_bytes(None).unwrap(), b"some key");
    assert_eq!(pair.value.read_uint().unwrap(), 9);
}

#[test]
fn many_keys_survive_and_iterate_completely() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();

    for i in 0..200u64 {
        let key = format!("key{}", i);
        map.put(key.as_bytes(), Value::Uint(i)).unwrap();
    }
    for i in 0..200u64 {
        let key = format!("key{}", i);
        assert_eq!(
            map.get(key.as_bytes()).unwrap().unwrap().read_uint().unwrap(),
            i,
            "lost {}",
            key
        );
    }

    let mut seen = BTreeSet::new();
    for entry in map.iter().unwrap() {
        let pair = entry.unwrap().read_key_value_pair().unwrap();
        let key = String::from_utf8(pair.key.read_bytes(None).unwrap()).unwrap();
        let value = pair.value.read_uint().unwrap();
        assert_eq!(format!("key{}", value), key);
        assert!(seen.insert(key));
    }
    assert_eq!(seen.len(), 200);
    assert_eq!(map.cursor().count().unwrap(), 200);
}

#[test]
fn colliding_digests_deepen_the_trie() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();

    // digits are consumed from the digest tail, so sharing the trailing
    // bytes collides through the first levels
    let mut h1 = [0u8; 20];
    let mut h2 = [0u8; 20];
    h1[17] = 0x10;
    h2[17] = 0x20;
    map.put_hashed(&h1, Value::from("k1"), Value::Uint(1)).unwrap();
    map.put_hashed(&h2, Value::from("k2"), Value::Uint(2)).unwrap();

    let read = |map: &HashMapMut<'_, MemoryStore, Sha1>, h: &[u8]| {
        map.read_only()
            .get_hashed(h)
            .unwrap()
            .unwrap()
            .read_uint()
            .unwrap()
    };
    assert_eq!(read(&map, &h1), 1);
    assert_eq!(read(&map, &h2), 2);

    // iteration sees both entries
    let values: BTreeSet<u64> = map
        .iter()
        .unwrap()
        .map(|e| e.unwrap().read_key_value_pair().unwrap().value.read_uint().unwrap())
        .collect();
    assert_eq!(values, BTreeSet::from([1, 2]));

    // removing one flattens the surviving pair back toward the root
    assert!(map.remove_hashed(&h2).unwrap());
    assert_eq!(read(&map, &h1), 1);
    assert!(map.read_only().get_hashed(&h2).unwrap().is_none());
    let values: Vec<u64> = map
        .iter()
        .unwrap()
        .map(|e| e.unwrap().read_key_value_pair().unwrap().value.read_uint().unwrap())
        .collect();
    assert_eq!(values, vec![1]);
}

#[test]
fn wrong_digest_width_is_rejected() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();
    let short = [0u8; 8];
    assert_eq!(
        map.put_hashed(&short, Value::from("k"), Value::Uint(1)),
        Err(burl::Error::InvalidHashSize)
    );
}

#[test]
fn counted_map_tracks_population() {
    let db = open_db();
    let mut map = CountedHashMapMut::new(db.root_write_cursor()).unwrap();
    assert_eq!(map.count().unwrap(), 0);

    for i in 0..50u64 {
        map.put(format!("k{}", i).as_bytes(), Value::Uint(i)).unwrap();
    }
    assert_eq!(map.count().unwrap(), 50);

    // overwriting is not an insertion
    map.put(b"k0", Value::Uint(999)).unwrap();
    assert_eq!(map.count().unwrap(), 50);

    assert!(map.remove(b"k0").unwrap());
    assert!(map.remove(b"k1").unwrap());
    assert!(!map.remove(b"k0").unwrap());
    assert_eq!(map.count().unwrap(), 48);
}

#[test]
fn hash_set_members_round_trip() {
    let db = open_db();
    let mut set = HashSetMut::new(db.root_write_cursor()).unwrap();

    assert!(set.put(b"apple").unwrap());
    assert!(set.put(b"pear").unwrap());
    assert!(!set.put(b"apple").unwrap());

    assert!(set.contains(b"apple").unwrap());
    assert!(!set.contains(b"plum").unwrap());
    assert_eq!(
        set.get(b"pear").unwrap().unwrap().read_bytes(None).unwrap(),
        b"pear"
    );

    let members: BTreeSet<Vec<u8>> = set
        .iter()
        .unwrap()
        .map(|e| e.unwrap().read_key_value_pair().unwrap().key.read_bytes(None).unwrap())
        .collect();
    assert_eq!(
        members,
        BTreeSet::from([b"apple".to_vec(), b"pear".to_vec()])
    );

    assert!(set.remove(b"apple").unwrap());
    assert!(!set.contains(b"apple").unwrap());
}

#[test]
fn counted_set_tracks_population() {
    let db = open_db();
    let mut set = CountedHashSetMut::new(db.root_write_cursor()).unwrap();
    for i in 0..10u64 {
        set.put(format!("m{}", i).as_bytes()).unwrap();
    }
    set.put(b"m3").unwrap();
    assert_eq!(set.count().unwrap(), 10);
    set.remove(b"m3").unwrap();
    assert_eq!(set.count().unwrap(), 9);
}

#[test]
fn maps_nest_arbitrarily() {
    let db = open_db();
    let mut root = HashMapMut::new(db.root_write_cursor()).unwrap();

    {
        let mut people = HashMapMut::new(root.put_cursor(b"people").unwrap()).unwrap();
        let mut alice = HashMapMut::new(people.put_cursor(b"alice").unwrap()).unwrap();
        alice.put(b"age", Value::Uint(25)).unwrap();
        alice.put(b"name", Value::from("alice")).unwrap();
    }

    let people = burl::HashMap::new(root.get(b"people").unwrap().unwrap()).unwrap();
    let alice = burl::HashMap::new(people.get(b"alice").unwrap().unwrap()).unwrap();
    assert_eq!(alice.get(b"age").unwrap().unwrap().read_uint().unwrap(), 25);
    assert_eq!(
        alice.get(b"name").unwrap().unwrap().read_bytes(None).unwrap(),
        b"alice"
    );
}

#[test]
fn random_churn_matches_a_reference_map() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();
    let mut reference = std::collections::HashMap::<Vec<u8>, u64>::new();
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..400 {
        let key = format!("k{}", rng.gen_range(0..120u32)).into_bytes();
        if rng.gen_bool(0.3) {
            assert_eq!(map.remove(&key).unwrap(), reference.remove(&key).is_some());
        } else {
            let value = rng.gen_range(0..1_000_000u64);
            map.put(&key, Value::Uint(value)).unwrap();
            reference.insert(key, value);
        }
    }

    for (key, value) in &reference {
        assert_eq!(map.get(key).unwrap().unwrap().read_uint().unwrap(), *value);
    }
    assert_eq!(map.cursor().count().unwrap(), reference.len() as u64);
}

#[test]
fn put_if_empty_respects_existing_values() {
    let db = open_db();
    let mut map = HashMapMut::new(db.root_write_cursor()).unwrap();
    assert!(map.put_if_empty(b"k", Value::Uint(1)).unwrap());
    assert!(!map.put_if_empty(b"k", Value::Uint(2)).unwrap());
    assert_eq!(map.get(b"k").unwrap().unwrap().read_uint().unwrap(), 1);
}
