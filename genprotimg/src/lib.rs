// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds confidential-VM boot images: takes a kernel, an optional
//! ramdisk, an optional kernel command line, and a set of host
//! certificates, and assembles a single, self-bootable image carrying
//! a GCM-sealed secure header.
//!
//! The binary entry point (`main.rs`) is a thin shell around
//! [`cli::Cli`] and [`image::ImageBuilder`]; everything in this crate is
//! exposed as a library so the build pipeline can be driven directly
//! from tests without going through argument parsing.

pub mod buffer;
pub mod cli;
pub mod collection;
pub mod component;
pub mod consts;
pub mod crypto;
pub mod error;
pub mod fileio;
pub mod header;
pub mod image;
pub mod output;
pub mod trampoline;
