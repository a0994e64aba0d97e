// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cursor::WriteCursor;
use crate::error::Error;
use crate::slot::Slot;

/// Which part of a key/value pair a hash-map lookup should land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashTarget {
    KvPair,
    Key,
    Value,
}

/// Scalar or complex payload accepted by [`PathPart::WriteData`].
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    /// An intentionally empty slot, distinct from a missing one.
    None,
    /// A verbatim slot, used to clone or alias subtrees.
    Slot(Slot),
    Uint(u64),
    Int(i64),
    Float(f64),
    Bytes(&'a [u8]),
    /// Bytes carrying a two-byte format tag labelling a semantic subtype.
    FormatTagged(&'a [u8], [u8; 2]),
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Bytes(s.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(b: &'a [u8]) -> Self {
        Value::Bytes(b)
    }
}

impl From<u64> for Value<'_> {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<i64> for Value<'_> {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value<'_> {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

/// Context callback: runs with a write cursor over the slot its path
/// reached; a returned error aborts the surrounding transaction.
pub type ContextFn<'p, S, H> = dyn for<'c> Fn(WriteCursor<'c, S, H>) -> Result<(), Error> + 'p;

/// One instruction of a path program.
///
/// A path is a lazy program over slots: the executor walks it left to right,
/// allocating blocks and copying on write as required, and produces the final
/// slot pointer for the cursor layer to interpret.
pub enum PathPart<'p, S, H> {
    ArrayListInit,
    ArrayListGet(i64),
    ArrayListAppend,
    ArrayListSlice(u64),
    LinkedArrayListInit,
    LinkedArrayListGet(i64),
    LinkedArrayListAppend,
    LinkedArrayListSlice { offset: u64, size: u64 },
    LinkedArrayListConcat(Slot),
    LinkedArrayListInsert(u64),
    LinkedArrayListRemove(u64),
    HashMapInit { counted: bool, set: bool },
    HashMapGet { target: HashTarget, hash: &'p [u8] },
    HashMapRemove(&'p [u8]),
    WriteData(Value<'p>),
    /// Must be the last part of its path.
    Context(&'p ContextFn<'p, S, H>),
}

impl<'p, S, H> PathPart<'p, S, H> {
    /// Parts that mutate the file; rejected in read-only mode.
    pub(crate) fn requires_write(&self) -> bool {
        !matches!(
            self,
            PathPart::ArrayListGet(_)
                | PathPart::LinkedArrayListGet(_)
                | PathPart::HashMapGet { .. }
        )
    }
}
