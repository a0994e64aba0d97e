// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Error, Store};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A store backed directly by a file, one syscall per operation.
#[derive(Debug)]
pub struct FileStore {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    len: u64,
}

impl FileStore {
    pub fn new(file: File) -> Result<Self, Error> {
        let len = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(Inner { file, len }),
        })
    }

    /// Open (or create) a database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Self::new(file)
    }

    /// Consume the store and return the underlying file handle.
    pub fn into_file(self) -> File {
        self.inner.into_inner().file
    }
}

impl Store for FileStore {
    fn seek(&self, pos: u64) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn position(&self) -> Result<u64, Error> {
        let mut inner = self.inner.lock();
        Ok(inner.file.seek(SeekFrom::Current(0))?)
    }

    fn len(&self) -> Result<u64, Error> {
        Ok(self.inner.lock().len)
    }

    fn set_len(&self, len: u64) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.file.set_len(len)?;
        inner.len = len;
        Ok(())
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pos = inner.file.seek(SeekFrom::Current(0))?;
        if pos + buf.len() as u64 > inner.len {
            return Err(Error::EndOfStream);
        }
        inner.file.read_exact(buf)?;
        Ok(())
    }

    fn write_all(&self, buf: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pos = inner.file.seek(SeekFrom::Current(0))?;
        inner.file.write_all(buf)?;
        inner.len = inner.len.max(pos + buf.len() as u64);
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}
