// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Patches the two trampoline templates (`stage3a`, `stage3b`) installed
//! alongside this binary into their final, per-build form.
//!
//! Both trampolines ship as pre-built binary blobs this crate never
//! assembles itself — `stage3a` is the short, unencrypted loader that
//! asks the ultravisor to unpack the image using the secure header;
//! `stage3b` is the tiny, now-encrypted loader the ultravisor starts
//! after unpacking, which copies every component back to its original
//! address and jumps to the guest's real entry point. Neither template
//! is part of this crate's inputs, so the two "patch areas" below —
//! the IPIB/header tail appended after `stage3a`, and the args header
//! prepended to `stage3b` — are a documented contract between this
//! crate and the templates it loads, not a re-derivation of a format
//! defined elsewhere.

use crate::buffer::pad_to_page;
use crate::collection::Stage3bArgs;
use crate::consts::page_align;
use crate::error::{Error, Result};

/// Magic tag at the start of the IPIB this crate emits.
const IPIB_MAGIC: u64 = 0x5049_4249_0001_0000; // "PIBI" + format 1.0
const IPIB_FIXED_LEN: usize = 8 + 4 + 4 + 4 + 4 + 8 + 8;
const IPIB_ENTRY_LEN: usize = 2 + 2 + 4 + 8 + 8;

/// Fixed number of IPIB slots: one per [`crate::component::ComponentType`]
/// variant, present or not. Keeping the slot count constant means the
/// IPIB's size — and therefore the whole `stage3a` tail data area — is
/// known before any user component has been added, matching the point
/// in the build where the trampoline's total size must already be
/// fixed so user components can be placed after it.
pub const IPIB_NUM_SLOTS: usize = 4;

/// The IPIB's serialised length, which never varies with how many of
/// the four component slots are actually in use.
pub fn ipib_fixed_len() -> usize {
    IPIB_FIXED_LEN + IPIB_NUM_SLOTS * IPIB_ENTRY_LEN
}

/// One entry in the IPIB: a component's role, guest address, and size.
pub struct IpibEntry {
    pub kind: u16,
    pub src_addr: u64,
    pub size: u64,
}

/// The PV IPL parameter information block: tells `stage3a` where every
/// component and the secure header itself ended up in guest memory, so
/// it can hand the ultravisor a complete unpack request.
pub struct Ipib {
    entries: Vec<IpibEntry>,
    header_addr: u64,
    header_size: u64,
}

impl Ipib {
    pub fn new(entries: Vec<IpibEntry>, header_addr: u64, header_size: u64) -> Self {
        Ipib {
            entries,
            header_addr,
            header_size,
        }
    }

    pub fn len(&self) -> usize {
        IPIB_FIXED_LEN + self.entries.len() * IPIB_ENTRY_LEN
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&IPIB_MAGIC.to_be_bytes());
        out.extend_from_slice(&(self.len() as u32).to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes()); // version
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()); // reserved
        out.extend_from_slice(&self.header_addr.to_be_bytes());
        out.extend_from_slice(&self.header_size.to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.kind.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&0u32.to_be_bytes());
            out.extend_from_slice(&entry.src_addr.to_be_bytes());
            out.extend_from_slice(&entry.size.to_be_bytes());
        }
        out
    }
}

/// Loads a template blob from disk. Both trampolines are installed data
/// files, not something this crate generates, so a missing file is a
/// regular I/O error, not an internal bug.
pub fn load_template(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| Error::io(path, e))
}

/// The page-aligned size of `stage3a`'s tail data area (IPIB followed by
/// the secure header), given their unpadded lengths.
pub fn stage3a_data_size(ipib_len: usize, header_len: usize) -> u64 {
    page_align(ipib_len as u64) + page_align(header_len as u64)
}

/// Result of building `stage3a`: its full byte content plus the guest
/// addresses its tail data area ended up at (needed to fill in the
/// IPIB's own header pointer before the header is sealed).
pub struct Stage3a {
    pub bytes: Vec<u8>,
    pub ipib_addr: u64,
    pub header_addr: u64,
}

/// Appends a page-aligned IPIB and a page-aligned secure header after
/// `template`'s own page-aligned code region.
pub fn build_stage3a(template: &[u8], load_address: u64, ipib: &[u8], header: &[u8]) -> Stage3a {
    let code = pad_to_page(template);
    let ipib_addr = load_address + code.len() as u64;
    let ipib_region = pad_to_page(ipib);
    let header_addr = ipib_addr + ipib_region.len() as u64;
    let header_region = pad_to_page(header);

    let mut bytes = code;
    bytes.extend_from_slice(&ipib_region);
    bytes.extend_from_slice(&header_region);

    Stage3a {
        bytes,
        ipib_addr,
        header_addr,
    }
}

const STAGE3B_ARGS_LEN: usize = 16 * 3 + 16;

/// Prepends the kernel/cmdline/initrd placement triples and the initial
/// PSW to `template`. A blob with `dest_size == 0` means "not present";
/// `stage3b` is expected to skip copying it.
pub fn build_stage3b(template: &[u8], args: &Stage3bArgs) -> Vec<u8> {
    let mut header = [0u8; STAGE3B_ARGS_LEN];
    let mut offset = 0;
    let mut put_blob = |buf: &mut [u8], off: &mut usize, addr: u64, size: u64| {
        buf[*off..*off + 8].copy_from_slice(&addr.to_be_bytes());
        buf[*off + 8..*off + 16].copy_from_slice(&size.to_be_bytes());
        *off += 16;
    };
    put_blob(&mut header, &mut offset, args.kernel.src_addr, args.kernel.dest_size);
    let cmdline = args.cmdline.unwrap_or(crate::collection::MemBlob { src_addr: 0, dest_size: 0 });
    put_blob(&mut header, &mut offset, cmdline.src_addr, cmdline.dest_size);
    let initrd = args.initrd.unwrap_or(crate::collection::MemBlob { src_addr: 0, dest_size: 0 });
    put_blob(&mut header, &mut offset, initrd.src_addr, initrd.dest_size);
    header[offset..offset + 8].copy_from_slice(&args.psw_mask.to_be_bytes());
    header[offset + 8..offset + 16].copy_from_slice(&args.psw_addr.to_be_bytes());

    let mut out = Vec::with_capacity(header.len() + template.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(template);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemBlob;

    #[test]
    fn ipib_length_matches_fixed_plus_entries() {
        let ipib = Ipib::new(
            vec![
                IpibEntry { kind: 0, src_addr: 0x1000, size: 0x2000 },
                IpibEntry { kind: 1, src_addr: 0x3000, size: 0x1000 },
            ],
            0x9000,
            512,
        );
        assert_eq!(ipib.to_bytes().len(), IPIB_FIXED_LEN + 2 * IPIB_ENTRY_LEN);
        assert_eq!(ipib.len(), ipib.to_bytes().len());
    }

    #[test]
    fn stage3a_tail_addresses_are_page_aligned_and_sequential() {
        let template = vec![0xAAu8; 100];
        let ipib = vec![0xBBu8; 50];
        let header = vec![0xCCu8; 300];
        let stage3a = build_stage3a(&template, 0x2000, &ipib, &header);

        assert_eq!(stage3a.ipib_addr, 0x2000 + 4096);
        assert_eq!(stage3a.header_addr, stage3a.ipib_addr + 4096);
        assert_eq!(stage3a.bytes.len(), 4096 * 3);
    }

    #[test]
    fn stage3b_args_header_precedes_template_bytes() {
        let template = b"stage3b-code".to_vec();
        let args = Stage3bArgs {
            kernel: MemBlob { src_addr: 0x1_0000, dest_size: 0x2_0000 },
            cmdline: None,
            initrd: Some(MemBlob { src_addr: 0x5_0000, dest_size: 0x400 }),
            psw_mask: 0x1_8000_0000,
            psw_addr: 0x1_0000,
        };
        let out = build_stage3b(&template, &args);
        assert_eq!(out.len(), STAGE3B_ARGS_LEN + template.len());
        assert_eq!(&out[STAGE3B_ARGS_LEN..], &template[..]);

        let kernel_addr = u64::from_be_bytes(out[0..8].try_into().unwrap());
        assert_eq!(kernel_addr, 0x1_0000);
        let cmdline_size = u64::from_be_bytes(out[24..32].try_into().unwrap());
        assert_eq!(cmdline_size, 0);
    }
}
