// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The top-level image builder: owns every key, the component
//! collection, and the two trampolines, and drives the fixed build
//! order a secure image must be assembled in.
//!
//! Build order, and why it cannot be reordered:
//!
//! 1. Keys and host slots are derived first — everything downstream
//!    needs the XTS key (to encrypt components) and the root key (to
//!    seal the header).
//! 2. `stage3a`'s total size is fixed next, from the host key count
//!    alone (the header's size is a function of `nks` only) — this
//!    gives every user component its final guest address before any of
//!    them are read.
//! 3. User components are added (aligned, encrypted, measured).
//! 4. `stage3b` is built last among components: it needs every other
//!    component's final address, so it measures into the same
//!    collection and becomes the last entry.
//! 5. The secure header measures the finalized collection and is sealed.
//! 6. `stage3a` is patched with the IPIB and the sealed header and
//!    written out, followed by every component at its assigned address.

use std::path::{Path, PathBuf};

use p521::PublicKey;
use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::collection::ComponentCollection;
use crate::component::{Component, ComponentType};
use crate::consts::{page_align, IMAGE_ENTRY, PSW_MASK_EA_BA, STAGE3A_LOAD_ADDRESS};
use crate::crypto::cert;
use crate::crypto::ec::KeyPair;
use crate::error::{Error, Result};
use crate::header::{self, HeaderInputs, Measurements as HeaderMeasurements, SecureHeader};
use crate::trampoline::{self, Ipib, IpibEntry};

/// Everything the CLI collects before a build can start. Optional key
/// paths fall back to freshly generated keys; `pcf`/`scf`/`psw_addr`
/// default to `0`/`0`/[`IMAGE_ENTRY`].
pub struct BuildConfig {
    pub host_cert_paths: Vec<PathBuf>,
    pub header_key_path: Option<PathBuf>,
    pub comp_key_path: Option<PathBuf>,
    pub comm_key_path: Option<PathBuf>,
    pub pcf: u64,
    pub scf: u64,
    pub psw_addr: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            host_cert_paths: Vec::new(),
            header_key_path: None,
            comp_key_path: None,
            comm_key_path: None,
            pcf: 0,
            scf: 0,
            psw_addr: IMAGE_ENTRY,
        }
    }
}

fn no_decryption(pcf: u64) -> bool {
    pcf & header::no_decryption_flag() != 0
}

fn read_key_file(path: &Path, len: usize) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    if data.len() != len {
        return Err(Error::InvalidKeySize {
            what: "key file",
            expected: len,
            actual: data.len(),
        });
    }
    Ok(data)
}

fn load_or_generate_key(path: Option<&Path>, len: usize) -> Result<Vec<u8>> {
    match path {
        Some(path) => read_key_file(path, len),
        None => {
            let mut buf = vec![0u8; len];
            OsRng
                .try_fill_bytes(&mut buf)
                .map_err(|e| Error::Randomness(e.to_string()))?;
            Ok(buf)
        }
    }
}

/// Final product of a build: the patched `stage3a` bytes (written at
/// [`STAGE3A_LOAD_ADDRESS`]) and the finalized component collection
/// (written at each component's own address).
pub struct BuiltImage {
    pub stage3a: Vec<u8>,
    pub collection: ComponentCollection,
    pub psw_addr: u64,
}

/// Drives one end-to-end build. Not reusable: [`ImageBuilder::finalize`]
/// consumes `self`.
pub struct ImageBuilder {
    tmp_dir: PathBuf,
    cust_keypair: KeyPair,
    host_keys: Vec<PublicKey>,
    cust_root_key: [u8; 32],
    cust_comm_key: [u8; 32],
    xts_key: [u8; 64],
    gcm_iv: [u8; 12],
    pcf: u64,
    scf: u64,
    psw_addr: u64,
    stage3a_template: Vec<u8>,
    collection: ComponentCollection,
}

impl ImageBuilder {
    /// Loads keys and host certificates, reserves `stage3a`'s guest
    /// address space (whose size depends only on the host-key count),
    /// and leaves the collection ready to receive user components at
    /// their final addresses.
    pub fn new(config: BuildConfig, stage3a_template_path: &Path, tmp_dir: PathBuf) -> Result<Self> {
        if config.host_cert_paths.is_empty() {
            return Err(Error::MissingArgument("host-certificate"));
        }

        let mut host_keys = Vec::new();
        for path in &config.host_cert_paths {
            host_keys.extend(cert::load_host_public_keys(path)?);
        }

        let cust_keypair = KeyPair::generate()?;

        let xts_key: [u8; 64] = load_or_generate_key(config.comp_key_path.as_deref(), 64)?
            .try_into()
            .map_err(|_| Error::CryptoInternal("XTS key length invariant violated".into()))?;
        let cust_comm_key: [u8; 32] = load_or_generate_key(config.comm_key_path.as_deref(), 32)?
            .try_into()
            .map_err(|_| Error::CryptoInternal("comm key length invariant violated".into()))?;
        let cust_root_key: [u8; 32] = load_or_generate_key(config.header_key_path.as_deref(), 32)?
            .try_into()
            .map_err(|_| Error::CryptoInternal("root key length invariant violated".into()))?;

        let mut gcm_iv = [0u8; 12];
        OsRng
            .try_fill_bytes(&mut gcm_iv)
            .map_err(|e| Error::Randomness(e.to_string()))?;

        let stage3a_template =
            trampoline::load_template(stage3a_template_path)?;

        let header_len = header::header_size(host_keys.len());
        let ipib_len = trampoline::ipib_fixed_len();
        let data_size = trampoline::stage3a_data_size(ipib_len, header_len);
        let stage3a_total_size = page_align(stage3a_template.len() as u64) + data_size;

        let mut collection = ComponentCollection::new();
        let offset = page_align(STAGE3A_LOAD_ADDRESS + stage3a_total_size);
        collection.set_offset(offset)?;

        Ok(ImageBuilder {
            tmp_dir,
            cust_keypair,
            host_keys,
            cust_root_key,
            cust_comm_key,
            xts_key,
            gcm_iv,
            pcf: config.pcf,
            scf: config.scf,
            psw_addr: config.psw_addr,
            stage3a_template,
            collection,
        })
    }

    /// Reads `path`, aligns it (and, unless no-decryption mode is in
    /// effect, encrypts it) under this build's XTS key, and places it
    /// in the collection.
    pub fn add_component(&mut self, kind: ComponentType, path: &Path) -> Result<()> {
        let mut component = Component::from_file(kind, path)?;
        self.prepare(&mut component)?;
        self.collection.add(component)
    }

    fn prepare(&self, component: &mut Component) -> Result<()> {
        if no_decryption(self.pcf) {
            component.align(&self.tmp_dir)
        } else {
            component.align_and_encrypt(&self.tmp_dir, &self.xts_key)
        }
    }

    /// Builds and places `stage3b`, measures the finished collection,
    /// seals the secure header, and patches `stage3a` with the IPIB and
    /// the header. No component may be added after this call.
    pub fn finalize(mut self, stage3b_template_path: &Path) -> Result<BuiltImage> {
        let stage3b_template = trampoline::load_template(stage3b_template_path)?;
        let stage3b_args = self
            .collection
            .stage3b_args(PSW_MASK_EA_BA, self.psw_addr)?;
        let stage3b_bytes = trampoline::build_stage3b(&stage3b_template, &stage3b_args);

        let mut stage3b = Component::from_buffer(ComponentType::Stage3b, stage3b_bytes)?;
        self.prepare(&mut stage3b)?;
        self.collection.add(stage3b)?;

        let (collection, measurements) = self.collection.finalize()?;
        let stage3b_addr = collection.stage3b()?.src_addr();

        let mut entries = Vec::with_capacity(trampoline::IPIB_NUM_SLOTS);
        for kind in [
            ComponentType::Kernel,
            ComponentType::Initrd,
            ComponentType::Cmdline,
            ComponentType::Stage3b,
        ] {
            let found = collection.iter().find(|c| c.kind() == kind);
            entries.push(match found {
                Some(comp) => IpibEntry {
                    kind: kind as u16,
                    src_addr: comp.src_addr(),
                    size: comp.orig_size(),
                },
                None => IpibEntry { kind: kind as u16, src_addr: 0, size: 0 },
            });
        }

        let header_len = header::header_size(self.host_keys.len());
        let ipib_len = trampoline::ipib_fixed_len();
        let code_len = page_align(self.stage3a_template.len() as u64);
        let ipib_addr = STAGE3A_LOAD_ADDRESS + code_len;
        let header_addr = ipib_addr + page_align(ipib_len as u64);

        let ipib = Ipib::new(entries, header_addr, header_len as u64);
        let header = SecureHeader::build(HeaderInputs {
            cust_keypair: &self.cust_keypair,
            host_keys: &self.host_keys,
            cust_root_key: &self.cust_root_key,
            cust_comm_key: &self.cust_comm_key,
            xts_key: &self.xts_key,
            gcm_iv: self.gcm_iv,
            pcf: self.pcf,
            scf: self.scf,
            measurements: HeaderMeasurements {
                pld: measurements.pld,
                ald: measurements.ald,
                tld: measurements.tld,
                nep: measurements.nep,
            },
            stage3b_addr,
        })?;

        let stage3a = trampoline::build_stage3a(
            &self.stage3a_template,
            STAGE3A_LOAD_ADDRESS,
            &ipib.to_bytes(),
            header.as_bytes(),
        );
        debug_assert_eq!(stage3a.ipib_addr, ipib_addr);
        debug_assert_eq!(stage3a.header_addr, header_addr);

        Ok(BuiltImage {
            stage3a: stage3a.bytes,
            collection,
            psw_addr: self.psw_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal self-signed P-521 certificate is awkward to mint without a
    // full X.509 builder; crypto/cert.rs's tests cover certificate parsing
    // directly. The tests here only exercise paths that do not require one.

    #[test]
    fn new_rejects_empty_host_cert_list() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("stage3a.bin");
        std::fs::write(&template, [0u8; 64]).unwrap();

        let config = BuildConfig::default();
        let err = ImageBuilder::new(config, &template, dir.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::MissingArgument(_)));
    }

    #[test]
    fn new_rejects_missing_host_cert_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            host_cert_paths: vec![dir.path().join("host.pem")],
            ..BuildConfig::default()
        };
        let missing_template = dir.path().join("missing-stage3a.bin");
        let err = ImageBuilder::new(config, &missing_template, dir.path().to_path_buf());
        assert!(matches!(err, Err(Error::Io { .. })));
    }
}
