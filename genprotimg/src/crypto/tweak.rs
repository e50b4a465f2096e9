// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 128-bit XTS sector tweaks.
//!
//! Layout, all fields big-endian: a 2-byte role index, 6 random bytes, and
//! an 8-byte page index. The page index starts at zero and is advanced by
//! [`Tweak::advance_page`] once per 4096-byte page streamed under it.

use rand::TryRngCore;

use crate::consts::PAGE_SIZE;
use crate::error::{Error, Result};

pub const TWEAK_LEN: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tweak([u8; TWEAK_LEN]);

impl Tweak {
    /// Generates a fresh tweak for `role_index`, filling the random field
    /// from the system CSPRNG and zeroing the page index.
    pub fn generate(role_index: u16) -> Result<Self> {
        let mut bytes = [0u8; TWEAK_LEN];
        bytes[0..2].copy_from_slice(&role_index.to_be_bytes());
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes[2..8])
            .map_err(|e| Error::Randomness(e.to_string()))?;
        // bytes[8..16] (the page index) stays zero.
        Ok(Tweak(bytes))
    }

    pub fn from_bytes(bytes: [u8; TWEAK_LEN]) -> Self {
        Tweak(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TWEAK_LEN] {
        &self.0
    }

    /// Advances the tweak by one page (4096), carrying across the full
    /// 128-bit big-endian value.
    pub fn advance_page(&mut self) {
        let value = u128::from_be_bytes(self.0);
        self.0 = value.wrapping_add(u128::from(PAGE_SIZE)).to_be_bytes();
    }
}

impl std::fmt::Debug for Tweak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Tweak").field(&hex(&self.0)).finish()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
