// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cryptographic primitives: digests, AES-256-GCM, AES-256-XTS, EC
//! P-521/ECDH, tweak generation, and certificate loading.

pub mod cert;
pub mod digest;
pub mod ec;
pub mod gcm;
pub mod tweak;
pub mod xts;
