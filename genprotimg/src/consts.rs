// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire constants for the secure-boot image format.
//!
//! `STAGE3A_LOAD_ADDRESS` and `IMAGE_ENTRY` are not specified by the wire
//! format this crate consumes; they are fixed here as implementation
//! choices (see DESIGN.md) since nothing in this crate's inputs carries
//! them.

/// Guest memory page size. Every address and size the builder produces is
/// a multiple of this.
pub const PAGE_SIZE: u64 = 4096;

/// Magic value at the start of the secure header ("IBMSecEx" read as a
/// big-endian u64).
pub const HEADER_MAGIC: u64 = 0x4942_4d53_6563_4578;

/// Header format version emitted by this crate.
pub const HEADER_VERSION: u32 = 0x0000_0100;

/// `pcf` bit disabling component encryption. Exercised only in tests; the
/// CLI does not expose a way to set it.
pub const PCF_NO_DECRYPTION: u64 = 0x1000_0000;

/// Bit 12 (counted from the left, zero-based) of a PSW mask, used by the
/// short-PSW packing in the output writer.
pub const PSW_MASK_BIT_12: u64 = 0x0008_0000_0000_0000;

/// Address bits usable in a short (32-bit addressing) PSW.
pub const PSW_SHORT_ADDR_MASK: u64 = 0x0000_0000_7FFF_FFFF;

/// `PSW_MASK_EA | PSW_MASK_BA`: the 64-bit/31-bit addressing mode bits set
/// in every PSW this crate constructs.
pub const PSW_MASK_EA_BA: u64 = 0x0000_0001_0000_0000 | 0x0000_0000_8000_0000;

/// Guest load address of the `stage3a` trampoline. Chosen low in guest
/// memory, below the conventional Linux/s390 kernel entry point.
pub const STAGE3A_LOAD_ADDRESS: u64 = 0x0000_2000;

/// Conventional Linux/s390 kernel image entry point; the default PSW
/// address when `--x-psw` is not given.
pub const IMAGE_ENTRY: u64 = 0x0001_0000;

/// Entry point `stage3a` is loaded and started at. Equal to
/// `STAGE3A_LOAD_ADDRESS`: the short PSW at offset 0 jumps straight into
/// the trampoline's first instruction, there is no separate preamble.
pub const STAGE3A_INIT_ENTRY: u64 = STAGE3A_LOAD_ADDRESS;

/// Round `value` up to the next multiple of [`PAGE_SIZE`] (a no-op if
/// already aligned).
pub const fn page_align(value: u64) -> u64 {
    (value + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Whether `value` is already page-aligned.
pub const fn is_page_aligned(value: u64) -> bool {
    value & (PAGE_SIZE - 1) == 0
}
