// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! EC key generation, ECDH, and the exchange-key finalisation KDF on
//! curve P-521. The finalisation is not a standard named KDF — it is a
//! fixed 70-byte scratch layout (66-byte raw ECDH secret followed by a
//! 4-byte big-endian counter fixed at 1) hashed with SHA-256. Treat the
//! byte layout as a wire contract, not an implementation detail.

use p521::ecdh::diffie_hellman;
use p521::elliptic_curve::rand_core::OsRng;
use p521::elliptic_curve::sec1::ToEncodedPoint;
use p521::{PublicKey, SecretKey};
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};

/// Byte length of one P-521 affine coordinate (ceil(521 / 8)).
pub const COORD_LEN: usize = 66;
/// Length of a public key serialised as two concatenated coordinates.
pub const PUBKEY_EXCHANGE_LEN: usize = COORD_LEN * 2;
/// Length of a raw (un-hashed) P-521 ECDH shared secret.
pub const RAW_SHARED_SECRET_LEN: usize = 66;
/// Length of the wrap key produced by [`finalize_exchange_key`].
pub const WRAP_KEY_LEN: usize = 32;

pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Result<Self> {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Ok(KeyPair { secret, public })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

/// Encodes a public key's affine coordinates as 66-byte big-endian,
/// left-zero-padded values, concatenated x then y.
pub fn serialize_public_key(public: &PublicKey) -> Result<[u8; PUBKEY_EXCHANGE_LEN]> {
    let point = public.to_encoded_point(false);
    let x = point
        .x()
        .ok_or_else(|| Error::CryptoInternal("EC public key missing x coordinate".into()))?;
    let y = point
        .y()
        .ok_or_else(|| Error::CryptoInternal("EC public key missing y coordinate".into()))?;
    let mut out = [0u8; PUBKEY_EXCHANGE_LEN];
    out[..COORD_LEN].copy_from_slice(x.as_slice());
    out[COORD_LEN..].copy_from_slice(y.as_slice());
    Ok(out)
}

/// Derives the raw (66-byte) ECDH shared secret between `secret` and
/// `peer_public`.
pub fn ecdh_raw_secret(
    secret: &SecretKey,
    peer_public: &PublicKey,
) -> Result<[u8; RAW_SHARED_SECRET_LEN]> {
    let shared = diffie_hellman(secret.to_nonzero_scalar(), peer_public.as_affine());
    let bytes = shared.raw_secret_bytes();
    if bytes.len() != RAW_SHARED_SECRET_LEN {
        return Err(Error::Derive(format!(
            "unexpected ECDH shared-secret length {} (expected {RAW_SHARED_SECRET_LEN})",
            bytes.len()
        )));
    }
    let mut out = [0u8; RAW_SHARED_SECRET_LEN];
    out.copy_from_slice(bytes.as_slice());
    Ok(out)
}

/// Exchange-key finalisation: 70-byte scratch = 66-byte raw secret || the
/// 4-byte big-endian counter `1`, hashed with SHA-256.
pub fn finalize_exchange_key(raw_secret: &[u8; RAW_SHARED_SECRET_LEN]) -> [u8; WRAP_KEY_LEN] {
    let mut scratch = [0u8; 70];
    scratch[..RAW_SHARED_SECRET_LEN].copy_from_slice(raw_secret);
    scratch[RAW_SHARED_SECRET_LEN..].copy_from_slice(&1u32.to_be_bytes());
    Sha256::digest(scratch).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_is_symmetric_and_finalises_to_same_wrap_key() {
        let customer = KeyPair::generate().unwrap();
        let host = KeyPair::generate().unwrap();

        let from_customer = ecdh_raw_secret(customer.secret_key(), host.public_key()).unwrap();
        let from_host = ecdh_raw_secret(host.secret_key(), customer.public_key()).unwrap();
        assert_eq!(from_customer, from_host);

        let wrap_a = finalize_exchange_key(&from_customer);
        let wrap_b = finalize_exchange_key(&from_host);
        assert_eq!(wrap_a, wrap_b);
    }

    #[test]
    fn serialized_public_key_has_fixed_length() {
        let pair = KeyPair::generate().unwrap();
        let serialized = serialize_public_key(pair.public_key()).unwrap();
        assert_eq!(serialized.len(), PUBKEY_EXCHANGE_LEN);
    }

    #[test]
    fn finalize_exchange_key_matches_documented_layout() {
        let raw = [0x42u8; RAW_SHARED_SECRET_LEN];
        let mut scratch = [0u8; 70];
        scratch[..66].copy_from_slice(&raw);
        scratch[66..].copy_from_slice(&[0, 0, 0, 1]);
        let expected: [u8; WRAP_KEY_LEN] = Sha256::digest(scratch).into();
        assert_eq!(finalize_exchange_key(&raw), expected);
    }
}
