// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Domain error taxonomy for the image builder.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. The
//! CLI binary wraps these in `anyhow` only at the process boundary
//! (`main`), so library callers never have to downcast an opaque error
//! type to tell a missing file apart from a rejected certificate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} changed size during preparation (was {expected}, is now {actual})")]
    FileChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("failed to initialise {what}: {reason}")]
    CryptoInit { what: &'static str, reason: String },

    #[error("randomness source failed: {0}")]
    Randomness(String),

    #[error("certificate error in {path} (certificate #{index}): {reason}")]
    Cert {
        path: PathBuf,
        index: usize,
        reason: String,
    },

    #[error("cryptographic derivation failed: {0}")]
    Derive(String),

    #[error("internal cryptographic error: {0}")]
    CryptoInternal(String),

    #[error("invalid key size for {what}: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("cannot add component: collection already finalized")]
    ComponentFinalized,

    #[error("internal alignment invariant violated: {0}")]
    ComponentUnaligned(String),

    #[error("cannot change starting offset: components already added")]
    ImageOffset,

    #[error("internal error: {0}")]
    ImageInternal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
