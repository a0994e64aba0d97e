// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Store error
#[derive(Debug, Error)]
pub enum Error {
    #[error("read past the end of the store")]
    EndOfStream,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::EndOfStream, Error::EndOfStream) => true,
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
