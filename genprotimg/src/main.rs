// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary entry point. Parses arguments, sets up logging, builds the
//! image in a scratch temp directory that is always removed on exit
//! (including on `SIGINT`/`SIGTERM`), and writes the result.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use genprotimg::cli::Cli;
use genprotimg::image::ImageBuilder;
use genprotimg::output;

/// Default install location for the two trampoline templates, overridable
/// by `GENPROTIMG_STAGE3A_PATH`/`GENPROTIMG_STAGE3B_PATH` for development
/// and testing.
const DEFAULT_STAGE3A_PATH: &str = "/usr/share/s390-tools/stage3a.bin";
const DEFAULT_STAGE3B_PATH: &str = "/usr/share/s390-tools/stage3b_reloc.bin";

static TMP_DIR: OnceLock<PathBuf> = OnceLock::new();

fn template_path(env_var: &str, default: &str) -> PathBuf {
    std::env::var_os(env_var).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(default))
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn remove_tmp_dir(path: &Path) {
    let _ = std::fs::remove_dir_all(path);
}

fn install_signal_handler() {
    ctrlc::set_handler(|| {
        if let Some(dir) = TMP_DIR.get() {
            remove_tmp_dir(dir);
        }
        std::process::exit(1);
    })
    .expect("failed to install SIGINT/SIGTERM handler");
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let parsed = cli.into_parsed().context("invalid arguments")?;
    init_logging(parsed.verbosity);

    tracing::debug!(hosts = parsed.build_config.host_cert_paths.len(), "host certificates loaded");
    tracing::warn!("Certificate check is disabled. Please be aware that this is insecure.");

    let tmp_dir = tempfile::Builder::new()
        .prefix("genprotimg-")
        .tempdir()
        .context("failed to create temporary directory")?;
    let tmp_path = tmp_dir.path().to_path_buf();
    TMP_DIR.set(tmp_path.clone()).ok();
    install_signal_handler();

    let stage3a_path = template_path("GENPROTIMG_STAGE3A_PATH", DEFAULT_STAGE3A_PATH);
    let stage3b_path = template_path("GENPROTIMG_STAGE3B_PATH", DEFAULT_STAGE3B_PATH);

    let mut builder = ImageBuilder::new(parsed.build_config, &stage3a_path, tmp_path)
        .context("failed to initialize image builder")?;

    for component in &parsed.components {
        builder
            .add_component(component.kind, &component.path)
            .with_context(|| format!("failed to add {} component", component.kind.name()))?;
    }

    let built = builder.finalize(&stage3b_path).context("failed to finalize image")?;
    output::write_image(&parsed.output, &built).context("failed to write output image")?;

    drop(tmp_dir);
    Ok(())
}

fn main() {
    let result = run();
    if let Some(dir) = TMP_DIR.get() {
        remove_tmp_dir(dir);
    }
    if let Err(err) = result {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}
