// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! AES-256-GCM sealing, used both for the per-host key-slot wrap and for
//! the secure header's encrypted region. Every caller in this crate only
//! ever seals data that is already a multiple of the AES block size, so
//! `seal`/`open` never pad — ciphertext length always equals plaintext
//! length.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::{Error, Result};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(Error::InvalidKeySize {
            what: "AES-256-GCM key",
            expected: KEY_LEN,
            actual: key.len(),
        });
    }
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)))
}

fn check_iv(iv: &[u8]) -> Result<()> {
    if iv.len() != IV_LEN {
        return Err(Error::InvalidKeySize {
            what: "AES-256-GCM IV",
            expected: IV_LEN,
            actual: iv.len(),
        });
    }
    Ok(())
}

/// Seals `plaintext` under `key`/`iv` with `aad` as additional
/// authenticated data, returning ciphertext of the same length as
/// `plaintext` plus a detached 16-byte tag.
pub fn seal(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = cipher(key)?;
    check_iv(iv)?;
    let nonce = Nonce::from_slice(iv);
    let mut out = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::CryptoInternal(format!("GCM seal failed: {e}")))?;
    let tag_at = out.len() - TAG_LEN;
    let tag: [u8; TAG_LEN] = out[tag_at..].try_into().expect("tag length is fixed");
    out.truncate(tag_at);
    Ok((out, tag))
}

/// Inverse of [`seal`]; used only by tests and by the open-path exercised
/// for round-trip verification, never by the CLI.
pub fn open(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> Result<Vec<u8>> {
    let cipher = cipher(key)?;
    check_iv(iv)?;
    let nonce = Nonce::from_slice(iv);
    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| Error::CryptoInternal("GCM tag verification failed".into()))
}
