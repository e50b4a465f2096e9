// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming digest contexts used both for one-shot hashing (SHA-256 over
//! a serialised public key) and for the three long-lived measurement
//! streams (SHA-512 page/address/tweak digests) kept alive across an
//! entire build.

use sha2::{Digest as _, Sha256, Sha512};

pub const SHA256_LEN: usize = 32;
pub const SHA512_LEN: usize = 64;

/// A SHA-256 context. Used for the exchange-key digest and for identifying
/// a host key in its key slot.
#[derive(Default)]
pub struct Sha256Stream(Sha256);

impl Sha256Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> [u8; SHA256_LEN] {
        self.0.finalize().into()
    }

    /// One-shot convenience used by callers that only need a single digest.
    pub fn digest(data: &[u8]) -> [u8; SHA256_LEN] {
        Sha256::digest(data).into()
    }
}

/// A SHA-512 context, used for the page-list, address-list, and
/// tweak-list measurement streams. Each component absorbs into the same
/// long-lived context across the whole build; `finalize` is only called
/// once, after every component has been measured.
#[derive(Default)]
pub struct Sha512Stream(Sha512);

impl Sha512Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> [u8; SHA512_LEN] {
        self.0.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_stream_matches_one_shot() {
        let mut stream = Sha256Stream::new();
        stream.update(b"hello ");
        stream.update(b"world");
        assert_eq!(stream.finalize(), Sha256Stream::digest(b"hello world"));
    }

    #[test]
    fn sha512_stream_absorbs_in_order() {
        let mut a = Sha512Stream::new();
        a.update(b"ab");
        let mut b = Sha512Stream::new();
        b.update(b"a");
        b.update(b"b");
        assert_eq!(a.finalize(), b.finalize());
    }
}
