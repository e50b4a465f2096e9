// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The secure header: the binary structure the ultravisor verifies and
//! decrypts before unpacking a guest image. Layout, byte for byte:
//!
//! ```text
//! [ Head (unencrypted, GCM-authenticated) ]
//! [ key slot 0 ] .. [ key slot nks-1 ]      (unencrypted, authenticated)
//! [ Encrypted region ]                       (GCM-encrypted in place)
//! [ GCM tag, 16 bytes ]
//! ```
//!
//! `Head` and the key slots form the GCM additional authenticated data;
//! the encrypted region is sealed under the customer root key with a
//! real (non-zero) IV generated once per build. Each key slot, by
//! contrast, wraps the root key under a per-host exchange key with an
//! all-zero IV — a wire-format quirk inherited unchanged from the format
//! this header implements, not a weakness introduced here: the wrap key
//! is single-use and derived fresh per host, so nonce reuse never
//! occurs.

use crate::consts::{HEADER_MAGIC, HEADER_VERSION, PCF_NO_DECRYPTION, PSW_MASK_EA_BA};
use crate::crypto::digest::Sha256Stream;
use crate::crypto::ec::{self, KeyPair, PUBKEY_EXCHANGE_LEN};
use crate::crypto::gcm;
use crate::error::{Error, Result};
use p521::PublicKey;

const HEAD_LEN: usize = 8 + 4 + 4 + 12 + 4 + 8 + 8 + 8 + 8 + PUBKEY_EXCHANGE_LEN + 64 + 64 + 64;
const KEY_SLOT_LEN: usize = 32 + 32 + 16;
const ENCRYPTED_LEN: usize = 32 + 32 + 32 + 16 + 8 + 4 + 4;
const TAG_LEN: usize = 16;

/// Measurements produced by [`crate::collection::ComponentCollection::finalize`],
/// carried into the header unchanged.
pub struct Measurements {
    pub pld: [u8; 64],
    pub ald: [u8; 64],
    pub tld: [u8; 64],
    pub nep: u64,
}

/// Inputs the header needs that the image builder owns: the customer's
/// ephemeral EC keypair, the per-host public keys, the root/comm/XTS
/// keys, the control-flag values, and the initial PSW `stage3b` should
/// load once it restores every component.
pub struct HeaderInputs<'a> {
    pub cust_keypair: &'a KeyPair,
    pub host_keys: &'a [PublicKey],
    pub cust_root_key: &'a [u8; 32],
    pub cust_comm_key: &'a [u8; 32],
    pub xts_key: &'a [u8; 64],
    pub gcm_iv: [u8; 12],
    pub pcf: u64,
    pub scf: u64,
    pub measurements: Measurements,
    pub stage3b_addr: u64,
}

/// A fully built, sealed secure header, ready to be written into the
/// stage3a data area.
pub struct SecureHeader {
    bytes: Vec<u8>,
}

/// The total header size for `nks` host key slots. Fixed once `nks` is
/// known — every other field in the header is a constant size, and this
/// crate does not emit optional items.
pub fn header_size(nks: usize) -> usize {
    HEAD_LEN + nks * KEY_SLOT_LEN + ENCRYPTED_LEN + TAG_LEN
}

impl SecureHeader {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Builds and seals a header from `inputs`. Fails only if host-key
    /// serialisation or a cryptographic step fails; the wire layout
    /// itself cannot misalign once every field is the fixed size
    /// declared above.
    pub fn build(inputs: HeaderInputs<'_>) -> Result<Self> {
        if inputs.host_keys.is_empty() {
            return Err(Error::MissingArgument("host-certificate"));
        }

        let nks = inputs.host_keys.len();
        let aad_len = HEAD_LEN + nks * KEY_SLOT_LEN;
        let total_len = aad_len + ENCRYPTED_LEN + TAG_LEN;

        let mut buf = vec![0u8; total_len];
        Self::write_head(&mut buf[..HEAD_LEN], &inputs, total_len as u32)?;
        Self::write_key_slots(&mut buf[HEAD_LEN..aad_len], &inputs)?;
        Self::write_encrypted(&mut buf[aad_len..aad_len + ENCRYPTED_LEN], &inputs);

        let (ciphertext, tag) = gcm::seal(
            inputs.cust_root_key,
            &inputs.gcm_iv,
            &buf[..aad_len],
            &buf[aad_len..aad_len + ENCRYPTED_LEN],
        )?;
        buf[aad_len..aad_len + ENCRYPTED_LEN].copy_from_slice(&ciphertext);
        buf[aad_len + ENCRYPTED_LEN..].copy_from_slice(&tag);

        Ok(SecureHeader { bytes: buf })
    }

    fn write_head(out: &mut [u8], inputs: &HeaderInputs<'_>, total_len: u32) -> Result<()> {
        let mut w = Writer(out);
        w.put_u64(HEADER_MAGIC);
        w.put_u32(HEADER_VERSION);
        w.put_u32(total_len);
        w.put_bytes(&inputs.gcm_iv);
        w.put_u32(0); // res1
        w.put_u64(inputs.host_keys.len() as u64);
        w.put_u64(ENCRYPTED_LEN as u64);
        w.put_u64(inputs.measurements.nep);
        w.put_u64(inputs.pcf);

        let cust_pub = ec::serialize_public_key(inputs.cust_keypair.public_key())?;
        w.put_bytes(&cust_pub);
        w.put_bytes(&inputs.measurements.pld);
        w.put_bytes(&inputs.measurements.ald);
        w.put_bytes(&inputs.measurements.tld);

        debug_assert_eq!(w.0.len(), 0);
        Ok(())
    }

    fn write_key_slots(out: &mut [u8], inputs: &HeaderInputs<'_>) -> Result<()> {
        for (i, host_key) in inputs.host_keys.iter().enumerate() {
            let slot = &mut out[i * KEY_SLOT_LEN..(i + 1) * KEY_SLOT_LEN];
            Self::build_key_slot(slot, inputs.cust_keypair, host_key, inputs.cust_root_key)?;
        }
        Ok(())
    }

    fn build_key_slot(
        out: &mut [u8],
        cust_keypair: &KeyPair,
        host_key: &PublicKey,
        cust_root_key: &[u8; 32],
    ) -> Result<()> {
        let host_pub = ec::serialize_public_key(host_key)?;
        let digest_key = Sha256Stream::digest(&host_pub);

        let raw_secret = ec::ecdh_raw_secret(cust_keypair.secret_key(), host_key)?;
        let wrap_key = ec::finalize_exchange_key(&raw_secret);

        let zero_iv = [0u8; 12];
        let (wrapped, tag) = gcm::seal(&wrap_key, &zero_iv, &[], cust_root_key)?;

        out[..32].copy_from_slice(&digest_key);
        out[32..64].copy_from_slice(&wrapped);
        out[64..80].copy_from_slice(&tag);
        Ok(())
    }

    fn write_encrypted(out: &mut [u8], inputs: &HeaderInputs<'_>) {
        let mut w = Writer(out);
        w.put_bytes(inputs.cust_comm_key);
        w.put_bytes(&inputs.xts_key[..32]);
        w.put_bytes(&inputs.xts_key[32..]);
        w.put_u64(PSW_MASK_EA_BA);
        w.put_u64(inputs.stage3b_addr);
        w.put_u64(inputs.scf);
        w.put_u32(0); // noi: no optional items in this format revision
        w.put_u32(0); // res2
        debug_assert_eq!(w.0.len(), 0);
    }
}

/// Returns the program check flag requesting the no-decryption (debug)
/// unpack mode.
pub fn no_decryption_flag() -> u64 {
    PCF_NO_DECRYPTION
}

struct Writer<'a>(&'a mut [u8]);

impl<'a> Writer<'a> {
    fn take(&mut self, n: usize) -> &mut [u8] {
        let (head, tail) = std::mem::take(&mut self.0).split_at_mut(n);
        self.0 = tail;
        head
    }

    fn put_u32(&mut self, v: u32) {
        self.take(4).copy_from_slice(&v.to_be_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.take(8).copy_from_slice(&v.to_be_bytes());
    }

    fn put_bytes(&mut self, data: &[u8]) {
        self.take(data.len()).copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_for(host_keys: &[PublicKey], cust_keypair: &KeyPair) -> HeaderInputs<'_> {
        HeaderInputs {
            cust_keypair,
            host_keys,
            cust_root_key: &[0x11; 32],
            cust_comm_key: &[0x22; 32],
            xts_key: &[0x33; 64],
            gcm_iv: [0x44; 12],
            pcf: 0,
            scf: 0,
            measurements: Measurements { pld: [0; 64], ald: [0; 64], tld: [0; 64], nep: 3 },
            stage3b_addr: 0x30_0000,
        }
    }

    #[test]
    fn build_rejects_empty_host_key_list() {
        let cust = KeyPair::generate().unwrap();
        let err = SecureHeader::build(inputs_for(&[], &cust)).unwrap_err();
        assert!(matches!(err, Error::MissingArgument(_)));
    }

    #[test]
    fn header_size_matches_head_plus_slots_plus_encrypted_plus_tag() {
        let cust = KeyPair::generate().unwrap();
        let host = KeyPair::generate().unwrap();
        let hosts = vec![host.public_key().clone(), KeyPair::generate().unwrap().public_key().clone()];
        let header = SecureHeader::build(inputs_for(&hosts, &cust)).unwrap();
        assert_eq!(header.size(), HEAD_LEN + 2 * KEY_SLOT_LEN + ENCRYPTED_LEN + TAG_LEN);
    }

    #[test]
    fn phs_field_matches_total_header_size() {
        let cust = KeyPair::generate().unwrap();
        let host = KeyPair::generate().unwrap();
        let header = SecureHeader::build(inputs_for(
            std::slice::from_ref(host.public_key()),
            &cust,
        ))
        .unwrap();
        let phs = u32::from_be_bytes(header.as_bytes()[12..16].try_into().unwrap());
        assert_eq!(phs as usize, header.size());
    }

    #[test]
    fn magic_and_version_are_at_the_front() {
        let cust = KeyPair::generate().unwrap();
        let host = KeyPair::generate().unwrap();
        let header = SecureHeader::build(inputs_for(
            std::slice::from_ref(host.public_key()),
            &cust,
        ))
        .unwrap();
        let magic = u64::from_be_bytes(header.as_bytes()[..8].try_into().unwrap());
        let version = u32::from_be_bytes(header.as_bytes()[8..12].try_into().unwrap());
        assert_eq!(magic, HEADER_MAGIC);
        assert_eq!(version, HEADER_VERSION);
    }
}
