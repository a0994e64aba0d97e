// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Error, Store};
use parking_lot::Mutex;

/// An in-memory store, authoritative only for tests and ephemeral databases.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    pos: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstruct a store from previously captured bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            inner: Mutex::new(Inner { data, pos: 0 }),
        }
    }

    /// Consume the store and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner().data
    }
}

impl Store for MemoryStore {
    fn seek(&self, pos: u64) -> Result<(), Error> {
        self.inner.lock().pos = pos;
        Ok(())
    }

    fn position(&self) -> Result<u64, Error> {
        Ok(self.inner.lock().pos)
    }

    fn len(&self) -> Result<u64, Error> {
        Ok(self.inner.lock().data.len() as u64)
    }

    fn set_len(&self, len: u64) -> Result<(), Error> {
        self.inner.lock().data.resize(len as usize, 0);
        Ok(())
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pos = inner.pos as usize;
        let end = pos + buf.len();
        if end > inner.data.len() {
            return Err(Error::EndOfStream);
        }
        buf.copy_from_slice(&inner.data[pos..end]);
        inner.pos = end as u64;
        Ok(())
    }

    fn write_all(&self, buf: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pos = inner.pos as usize;
        let end = pos + buf.len();
        if end > inner.data.len() {
            inner.data.resize(end, 0);
        }
        inner.data[pos..end].copy_from_slice(buf);
        inner.pos = end as u64;
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_round_trip() {
        let store = MemoryStore::new();
        store.write_u64(42).unwrap();
        store.write_all(b"hello").unwrap();

        store.seek(0).unwrap();
        assert_eq!(store.read_u64().unwrap(), 42);
        let mut buf = [0u8; 5];
        store.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(store.len().unwrap(), 13);
    }

    #[test]
    fn read_past_end() {
        let store = MemoryStore::new();
        store.write_all(b"abc").unwrap();
        store.seek(2).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(store.read_exact(&mut buf), Err(Error::EndOfStream));
    }

    #[test]
    fn write_past_end_extends() {
        let store = MemoryStore::new();
        store.seek(10).unwrap();
        store.write_u8(7).unwrap();
        assert_eq!(store.len().unwrap(), 11);

        // the hole reads back as zeroes
        store.seek(0).unwrap();
        assert_eq!(store.read_u64().unwrap(), 0);
    }

    #[test]
    fn set_len_truncates() {
        let store = MemoryStore::new();
        store.write_all(&[1, 2, 3, 4]).unwrap();
        store.set_len(2).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        store.seek(0).unwrap();
        assert_eq!(store.read_u16().unwrap(), 0x0102);
    }
}
