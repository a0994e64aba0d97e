// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{Error, Store};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const DEFAULT_CAPACITY: usize = 8 * 1024;

/// A file store with a write-back window.
///
/// Pending writes accumulate in a single contiguous buffer and are flushed
/// when a write would straddle the window, before `set_len`, and on `sync`.
/// Reads merge pending buffered bytes with on-disk bytes transparently.
#[derive(Debug)]
pub struct BufferedStore {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    capacity: usize,
    pos: u64,
    /// Logical length: disk plus pending bytes.
    len: u64,
    /// Physical length of the file on disk.
    disk_len: u64,
    buf: Vec<u8>,
    buf_start: u64,
}

impl BufferedStore {
    pub fn new(file: File) -> Result<Self, Error> {
        Self::with_capacity(file, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(file: File, capacity: usize) -> Result<Self, Error> {
        let len = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                capacity,
                pos: 0,
                len,
                disk_len: len,
                buf: Vec::with_capacity(capacity),
                buf_start: 0,
            }),
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

    /// Flush pending bytes and return the underlying file handle.
    pub fn into_file(self) -> Result<File, Error> {
        let mut inner = self.inner.into_inner();
        flush_inner(&mut inner)?;
        Ok(inner.file)
    }
}

fn flush_inner(inner: &mut Inner) -> Result<(), Error> {
    if inner.buf.is_empty() {
        return Ok(());
    }
    inner.file.seek(SeekFrom::Start(inner.buf_start))?;
    inner.file.write_all(&inner.buf)?;
    inner.disk_len = inner.disk_len.max(inner.buf_start + inner.buf.len() as u64);
    inner.buf.clear();
    Ok(())
}

fn write_direct(inner: &mut Inner, pos: u64, bytes: &[u8]) -> Result<(), Error> {
    inner.file.seek(SeekFrom::Start(pos))?;
    inner.file.write_all(bytes)?;
    inner.disk_len = inner.disk_len.max(pos + bytes.len() as u64);
    Ok(())
}

/// Read from disk at `off`, zero-filling any part past the physical end.
fn read_disk(inner: &mut Inner, off: u64, out: &mut [u8]) -> Result<(), Error> {
    if off >= inner.disk_len {
        out.iter_mut().for_each(|b| *b = 0);
        return Ok(());
    }
    let avail = ((inner.disk_len - off) as usize).min(out.len());
    inner.file.seek(SeekFrom::Start(off))?;
    inner.file.read_exact(&mut out[..avail])?;
    out[avail..].iter_mut().for_each(|b| *b = 0);
    Ok(())
}

impl Store for BufferedStore {
    fn seek(&self, pos: u64) -> Result<(), Error> {
        self.inner.lock().pos = pos;
        Ok(())
    }

    fn position(&self) -> Result<u64, Error> {
        Ok(self.inner.lock().pos)
    }

    fn len(&self) -> Result<u64, Error> {
        Ok(self.inner.lock().len)
    }

    fn set_len(&self, len: u64) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        flush_inner(&mut inner)?;
        inner.file.set_len(len)?;
        inner.disk_len = len;
        inner.len = len;
        Ok(())
    }

    fn read_exact(&self, buf: &mut [u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        let n = buf.len() as u64;
        if pos + n > inner.len {
            return Err(Error::EndOfStream);
        }
        read_disk(&mut inner, pos, buf)?;

        // overlay the pending window
        let buf_end = inner.buf_start + inner.buf.len() as u64;
        let start = pos.max(inner.buf_start);
        let end = (pos + n).min(buf_end);
        if start < end {
            let src = (start - inner.buf_start) as usize;
            let dst = (start - pos) as usize;
            let count = (end - start) as usize;
            buf[dst..dst + count].copy_from_slice(&inner.buf[src..src + count]);
        }
        inner.pos = pos + n;
        Ok(())
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        let n = bytes.len();
        if n > 0 {
            if inner.buf.is_empty() {
                if n >= inner.capacity {
                    write_direct(&mut inner, pos, bytes)?;
                } else {
                    inner.buf_start = pos;
                    inner.buf.extend_from_slice(bytes);
                }
            } else {
                let buf_end = inner.buf_start + inner.buf.len() as u64;
                if pos >= inner.buf_start && pos + n as u64 <= buf_end {
                    // rewrite inside the window
                    let off = (pos - inner.buf_start) as usize;
                    inner.buf[off..off + n].copy_from_slice(bytes);
                } else if pos == buf_end && inner.buf.len() + n <= inner.capacity {
                    inner.buf.extend_from_slice(bytes);
                } else {
                    // the write straddles the window
                    flush_inner(&mut inner)?;
                    if n >= inner.capacity {
                        write_direct(&mut inner, pos, bytes)?;
                    } else {
                        inner.buf_start = pos;
                        inner.buf.extend_from_slice(bytes);
                    }
                }
            }
        }
        inner.len = inner.len.max(pos + n as u64);
        inner.pos = pos + n as u64;
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        flush_inner(&mut inner)?;
        inner.file.flush()?;
        Ok(())
    }

    fn sync(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        flush_inner(&mut inner)?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}
