// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small byte-buffer helpers shared by the buffer-backed component path
//! and the trampoline builders.

use crate::consts::page_align;

/// Returns a copy of `data` right-zero-padded to the next page boundary.
/// If `data` is already page-aligned, the copy has the same length.
pub fn pad_to_page(data: &[u8]) -> Vec<u8> {
    let aligned = page_align(data.len() as u64) as usize;
    let mut out = Vec::with_capacity(aligned);
    out.extend_from_slice(data);
    out.resize(aligned, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PAGE_SIZE;

    #[test]
    fn pads_short_buffer_to_one_page() {
        let out = pad_to_page(b"hello");
        assert_eq!(out.len(), PAGE_SIZE as usize);
        assert_eq!(&out[..5], b"hello");
        assert!(out[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn leaves_exact_multiple_unchanged_in_length() {
        let data = vec![0xAAu8; PAGE_SIZE as usize * 2];
        let out = pad_to_page(&data);
        assert_eq!(out.len(), data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn empty_buffer_is_already_a_page_multiple() {
        // Zero is a page multiple, so padding is a no-op here; the
        // "empty component measures as one page of zeros" rule lives in
        // the component measurement routines, not in this byte helper.
        let out = pad_to_page(&[]);
        assert!(out.is_empty());
    }
}
