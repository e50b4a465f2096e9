// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line surface: parses arguments into a [`BuildConfig`] plus
//! the component paths and verbosity the binary needs, applying the
//! same validation the option parser this tool's flags are modeled on
//! applies (required options, at-most-one-of-each-component-type, and
//! the `--no-cert-check` gate).

use std::path::PathBuf;

use clap::Parser;

use crate::component::ComponentType;
use crate::consts::IMAGE_ENTRY;
use crate::error::{Error, Result};
use crate::image::BuildConfig;

fn parse_hex_u64(s: &str) -> std::result::Result<u64, String> {
    let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| format!("invalid hexadecimal value: {e}"))
}

/// Builds a single, self-bootable confidential-VM boot image from a
/// kernel, an optional ramdisk, an optional kernel command line, and a
/// set of host certificates.
#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct Cli {
    /// Use FILE as a host certificate. At least one host certificate
    /// must be specified.
    #[clap(short = 'c', long = "host-certificate", required = true, value_name = "FILE")]
    pub host_certificate: Vec<PathBuf>,

    /// Set FILE as the output file.
    #[clap(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Use FILE as the Linux kernel image.
    #[clap(short = 'i', long = "image", value_name = "FILE")]
    pub image: PathBuf,

    /// Use FILE as the initial ramdisk (optional).
    #[clap(short = 'r', long = "ramdisk", value_name = "FILE")]
    pub ramdisk: Option<PathBuf>,

    /// Use content of FILE as the kernel cmdline (optional).
    #[clap(short = 'p', long = "parmfile", value_name = "FILE")]
    pub parmfile: Option<PathBuf>,

    /// Use FILE as the AES 256-bit GCM customer root key (optional,
    /// default: auto generation). This key protects the secure header
    /// (confidentiality and integrity).
    #[clap(long = "header-key", value_name = "FILE")]
    pub header_key: Option<PathBuf>,

    /// Use FILE as the AES 256-bit XTS key (optional, default: auto
    /// generation). This key is used for the component encryption.
    #[clap(long = "comp-key", value_name = "FILE")]
    pub comp_key: Option<PathBuf>,

    /// Disable the certification check (optional). Required for now:
    /// host certificate chain verification is not implemented yet.
    #[clap(long = "no-cert-check")]
    pub no_cert_check: bool,

    /// Print memory layout (optional). May be given multiple times.
    #[clap(short = 'V', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Use FILE as the customer communication key (optional, default:
    /// auto generation).
    #[clap(long = "x-comm-key", value_name = "FILE")]
    pub x_comm_key: Option<PathBuf>,

    /// Use VALUE as the plaintext control flags (optional, default:
    /// '0x0'). Must be a hexadecimal value.
    #[clap(long = "x-pcf", value_name = "VALUE", value_parser = parse_hex_u64, default_value = "0x0")]
    pub x_pcf: u64,

    /// Use ADDRESS to load from (optional, default: the kernel's
    /// conventional entry point). Must be a hexadecimal value.
    #[clap(long = "x-psw", value_name = "ADDRESS", value_parser = parse_hex_u64)]
    pub x_psw: Option<u64>,

    /// Use VALUE as the secret control flags (optional, default: '0x0').
    /// Must be a hexadecimal value.
    #[clap(long = "x-scf", value_name = "VALUE", value_parser = parse_hex_u64, default_value = "0x0")]
    pub x_scf: u64,
}

/// One component path tagged with its role, in the order the user
/// supplied it on the command line.
pub struct ComponentArg {
    pub kind: ComponentType,
    pub path: PathBuf,
}

/// Everything a build needs, derived from parsed arguments: the key/cert
/// configuration plus the components to add, already sorted into wire
/// order.
pub struct ParsedArgs {
    pub build_config: BuildConfig,
    pub output: PathBuf,
    pub components: Vec<ComponentArg>,
    pub verbosity: u8,
}

impl Cli {
    /// Validates the parsed arguments and lowers them into a
    /// [`ParsedArgs`], in the same order the flags are checked: output,
    /// image, host certificates, then the certificate-check gate.
    pub fn into_parsed(self) -> Result<ParsedArgs> {
        if self.image.as_os_str().is_empty() {
            return Err(Error::MissingArgument("image"));
        }
        if self.host_certificate.is_empty() {
            return Err(Error::MissingArgument("host-certificate"));
        }
        if !self.no_cert_check {
            return Err(Error::MissingArgument(
                "no-cert-check (certificate verification is not implemented yet)",
            ));
        }

        let mut components = vec![ComponentArg { kind: ComponentType::Kernel, path: self.image }];
        if let Some(path) = self.ramdisk {
            components.push(ComponentArg { kind: ComponentType::Initrd, path });
        }
        if let Some(path) = self.parmfile {
            components.push(ComponentArg { kind: ComponentType::Cmdline, path });
        }
        components.sort_by_key(|c| c.kind);

        let build_config = BuildConfig {
            host_cert_paths: self.host_certificate,
            header_key_path: self.header_key,
            comp_key_path: self.comp_key,
            comm_key_path: self.x_comm_key,
            pcf: self.x_pcf,
            scf: self.x_scf,
            psw_addr: self.x_psw.unwrap_or(IMAGE_ENTRY),
        };

        Ok(ParsedArgs {
            build_config,
            output: self.output,
            components,
            verbosity: self.verbose,
        })
    }
}
