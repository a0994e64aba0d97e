// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Byte-container backends for the burl database.
//!
//! A store is a monotonically growable, randomly addressable byte sequence.
//! The database owns exactly one store for its lifetime and drives it through
//! the [`Store`] trait; three implementations are provided — [`MemoryStore`]
//! for tests and ephemeral data, [`FileStore`] for direct file access, and
//! [`BufferedStore`] for file access through a write-back window.

mod buffered;
mod errors;
mod file;
mod memory;

pub use buffered::BufferedStore;
pub use errors::Error;
pub use file::FileStore;
pub use memory::MemoryStore;

use byteorder::{BigEndian, ByteOrder};

/// Random-access byte container used as the database's backing storage.
///
/// Operations are sequential from the current position. `len` reflects the
/// largest byte ever written, buffered or not; writes past the end grow the
/// container and reads past the end fail with [`Error::EndOfStream`].
/// Interior mutability is an implementation concern: every operation takes
/// `&self` so callers can hold many lightweight views over one store.
pub trait Store {
    /// Move the read/write position to `pos`.
    fn seek(&self, pos: u64) -> Result<(), Error>;

    /// Current read/write position.
    fn position(&self) -> Result<u64, Error>;

    /// Total number of bytes ever written.
    fn len(&self) -> Result<u64, Error>;

    /// Truncate (or extend with zeroes) to exactly `len` bytes.
    ///
    /// Buffered implementations flush pending bytes first.
    fn set_len(&self, len: u64) -> Result<(), Error>;

    /// Fill `buf` from the current position, advancing it.
    fn read_exact(&self, buf: &mut [u8]) -> Result<(), Error>;

    /// Write all of `buf` at the current position, advancing it.
    fn write_all(&self, buf: &[u8]) -> Result<(), Error>;

    /// Push buffered bytes down to the underlying storage.
    fn flush(&self) -> Result<(), Error>;

    /// Durably persist all written bytes.
    fn sync(&self) -> Result<(), Error>;

    fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    fn read_u8(&self) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u16(&buf))
    }

    fn read_u32(&self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    fn read_u64(&self) -> Result<u64, Error> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u64(&buf))
    }

    fn read_i64(&self) -> Result<i64, Error> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    fn write_u8(&self, v: u8) -> Result<(), Error> {
        self.write_all(&[v])
    }

    fn write_u16(&self, v: u16) -> Result<(), Error> {
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, v);
        self.write_all(&buf)
    }

    fn write_u32(&self, v: u32) -> Result<(), Error> {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, v);
        self.write_all(&buf)
    }

    fn write_u64(&self, v: u64) -> Result<(), Error> {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, v);
        self.write_all(&buf)
    }

    fn write_i64(&self, v: i64) -> Result<(), Error> {
        let mut buf = [0u8; 8];
        BigEndian::write_i64(&mut buf, v);
        self.write_all(&buf)
    }
}
