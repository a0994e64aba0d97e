// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Engine error — the closed failure taxonomy of the storage engine.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    // format validation
    #[error("not a database file")]
    InvalidDatabase,
    #[error("unsupported format version")]
    InvalidVersion,
    #[error("file was created with a different hash digest width")]
    InvalidHashSize,

    // path / schema
    #[error("slot tag does not match the requested operation")]
    UnexpectedTag,
    #[error("this collection cannot live at the top level")]
    InvalidTopLevelType,
    #[error("path part must be the last in its path")]
    PathPartMustBeAtEnd,
    #[error("expected the root node")]
    ExpectedRootNode,

    // lookup
    #[error("key not found")]
    KeyNotFound,

    // permission / semantics
    #[error("write attempted in read-only mode")]
    WriteNotAllowed,
    #[error("cursor is not writeable")]
    CursorNotWriteable,
    #[error("copy-on-write requires an open transaction")]
    ExpectedTxStart,
    #[error("expected an unsigned value")]
    ExpectedUnsignedLong,
    #[error("unsigned value does not fit in a slot")]
    Uint64Overflow,

    // structural
    #[error("ran out of hash bits")]
    KeyOffsetExceeded,
    #[error("no available slots")]
    NoAvailableSlots,
    #[error("new interior slots must be sealed")]
    MustSetNewSlotsToFull,
    #[error("slot is empty")]
    EmptySlot,
    #[error("maximum tree depth exceeded")]
    MaxShiftExceeded,
    #[error("format tag must be exactly two bytes")]
    InvalidFormatTagSize,

    // streaming
    #[error("end of stream")]
    EndOfStream,
    #[error("offset is outside the written region")]
    InvalidOffset,
    #[error("stream is longer than the caller allows")]
    StreamTooLong,
    #[error("writer must be positioned at the end of the payload")]
    UnexpectedWriterPosition,

    #[error(transparent)]
    Store(burl_store::Error),

    /// Failure surfaced from a transaction context callback.
    #[error("{0}")]
    Other(String),
}

impl From<burl_store::Error> for Error {
    fn from(e: burl_store::Error) -> Self {
        match e {
            burl_store::Error::EndOfStream => Error::EndOfStream,
            other => Error::Store(other),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}
