// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A single guest-memory payload: the kernel, the initial ramdisk, the
//! kernel command line, or the generated `stage3b` trampoline.
//!
//! A component is backed either by an in-memory buffer (`stage3b`, and any
//! small cmdline that never touches disk after its first read) or by a file
//! on disk (everything the CLI loads directly, so a multi-gigabyte initrd
//! is never resident all at once). Both backings support the same
//! operations — align, align-and-encrypt, the three measurement updates,
//! write-at-offset — so the rest of the builder never has to branch on
//! which one it holds.

use std::path::{Path, PathBuf};

use crate::buffer::pad_to_page;
use crate::consts::{is_page_aligned, page_align, PAGE_SIZE};
use crate::crypto::digest::Sha512Stream;
use crate::crypto::tweak::Tweak;
use crate::crypto::xts::XtsStream;
use crate::error::{Error, Result};
use crate::fileio;

/// Role tag. Declaration order is also wire order: the collection sorts
/// components by this enum's discriminant, so adding a new role before
/// `Stage3b` would change the on-disk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum ComponentType {
    Kernel = 0,
    Initrd = 1,
    Cmdline = 2,
    Stage3b = 3,
}

impl ComponentType {
    pub fn name(self) -> &'static str {
        match self {
            ComponentType::Kernel => "kernel",
            ComponentType::Initrd => "ramdisk",
            ComponentType::Cmdline => "parmline",
            ComponentType::Stage3b => "stage3b",
        }
    }
}

enum Backing {
    Buffer(Vec<u8>),
    File { path: PathBuf, size: u64 },
}

/// A guest-memory payload, backed by a buffer or a file, plus the
/// bookkeeping the builder needs to place and measure it.
pub struct Component {
    kind: ComponentType,
    backing: Backing,
    /// Size before any alignment padding was applied. Never changes after
    /// creation; `stage3b_args` reports this as the destination size the
    /// firmware should restore to.
    orig_size: u64,
    tweak: Tweak,
    /// Unset (`None`) until the owning collection places the component.
    src_addr: Option<u64>,
}

impl Component {
    /// Loads `path`'s current size and wraps it as a file-backed
    /// component, tagged by `kind` and carrying a fresh tweak.
    pub fn from_file(kind: ComponentType, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = fileio::stat_size(&path)?;
        Ok(Component {
            kind,
            backing: Backing::File { path, size },
            orig_size: size,
            tweak: Tweak::generate(kind as u16)?,
            src_addr: None,
        })
    }

    /// Wraps an owned buffer as a buffer-backed component (used only for
    /// the builder-generated `stage3b` blob).
    pub fn from_buffer(kind: ComponentType, data: Vec<u8>) -> Result<Self> {
        let orig_size = data.len() as u64;
        Ok(Component {
            kind,
            backing: Backing::Buffer(data),
            orig_size,
            tweak: Tweak::generate(kind as u16)?,
            src_addr: None,
        })
    }

    pub fn kind(&self) -> ComponentType {
        self.kind
    }

    pub fn orig_size(&self) -> u64 {
        self.orig_size
    }

    pub fn tweak(&self) -> Tweak {
        self.tweak
    }

    pub fn src_addr(&self) -> u64 {
        self.src_addr.expect("component queried before placement")
    }

    pub(crate) fn set_src_addr(&mut self, addr: u64) {
        self.src_addr = Some(addr);
    }

    /// Current (possibly already padded/encrypted) size.
    pub fn size(&self) -> u64 {
        match &self.backing {
            Backing::Buffer(data) => data.len() as u64,
            Backing::File { size, .. } => *size,
        }
    }

    fn is_page_aligned(&self) -> bool {
        is_page_aligned(self.size())
    }

    /// Right-zero-pads to the next page boundary, leaving an
    /// already-aligned component untouched.
    pub fn align(&mut self, tmp_dir: &Path) -> Result<()> {
        if self.is_page_aligned() {
            return Ok(());
        }
        match &mut self.backing {
            Backing::Buffer(data) => {
                *data = pad_to_page(data);
            }
            Backing::File { path, .. } => {
                let dst = tmp_dir.join(self.kind.name());
                let total = fileio::stream_pages(path, &dst, |_page| Ok(()))?;
                *path = dst;
                self.backing = Backing::File { path: path.clone(), size: total };
            }
        }
        Ok(())
    }

    /// Aligns and drives every page through AES-256-XTS under `xts_key`
    /// and the component's own tweak. The file path re-stats the source
    /// before committing, surfacing [`Error::FileChanged`] if it moved
    /// under us between construction and this call.
    pub fn align_and_encrypt(&mut self, tmp_dir: &Path, xts_key: &[u8]) -> Result<()> {
        let mut xts = XtsStream::new(xts_key, self.tweak)?;
        match &mut self.backing {
            Backing::Buffer(data) => {
                let mut padded = pad_to_page(data);
                for page in padded.chunks_mut(PAGE_SIZE as usize) {
                    xts.encrypt_page(page)?;
                }
                *data = padded;
            }
            Backing::File { path, size } => {
                let current = fileio::stat_size(path)?;
                if current != *size {
                    return Err(Error::FileChanged {
                        path: path.clone(),
                        expected: *size,
                        actual: current,
                    });
                }
                let dst = tmp_dir.join(self.kind.name());
                let total = fileio::stream_pages(path, &dst, |page| xts.encrypt_page(page))?;
                *path = dst;
                *size = total;
            }
        }
        Ok(())
    }

    /// Number of pages this component occupies once aligned (an empty
    /// component still occupies one).
    fn page_count(&self) -> u64 {
        let size = self.size();
        if size == 0 {
            1
        } else {
            page_align(size) / PAGE_SIZE
        }
    }

    /// Absorbs the component's full page-aligned content into `ctx`,
    /// substituting one page of zeros for an empty component. Returns the
    /// page count absorbed.
    pub fn update_pld(&self, ctx: &mut Sha512Stream) -> Result<u64> {
        match &self.backing {
            Backing::Buffer(data) => {
                if data.is_empty() {
                    ctx.update(&[0u8; PAGE_SIZE as usize]);
                } else {
                    ctx.update(data);
                }
            }
            Backing::File { path, size } => {
                if *size == 0 {
                    ctx.update(&[0u8; PAGE_SIZE as usize]);
                } else {
                    let mut file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
                    let mut remaining = *size;
                    while remaining > 0 {
                        use std::io::Read;
                        let mut page = [0u8; PAGE_SIZE as usize];
                        file.read_exact(&mut page).map_err(|e| Error::io(path, e))?;
                        ctx.update(&page);
                        remaining -= PAGE_SIZE;
                    }
                }
            }
        }
        Ok(self.page_count())
    }

    /// Absorbs the big-endian 64-bit guest address of every page the
    /// component occupies.
    pub fn update_ald(&self, ctx: &mut Sha512Stream) -> u64 {
        let addr = self.src_addr();
        let count = self.page_count();
        for i in 0..count {
            ctx.update(&(addr + i * PAGE_SIZE).to_be_bytes());
        }
        count
    }

    /// Absorbs the tweak value for every page the component occupies,
    /// advancing a local copy by one page each time (the component's own
    /// tweak, used for encryption, is untouched).
    pub fn update_tld(&self, ctx: &mut Sha512Stream) -> u64 {
        let mut tweak = self.tweak;
        let count = self.page_count();
        for _ in 0..count {
            ctx.update(tweak.as_bytes());
            tweak.advance_page();
        }
        count
    }

    /// Writes the component's current bytes at its assigned address in
    /// `out`.
    pub fn write_to(&self, out: &mut std::fs::File) -> Result<()> {
        let offset = self.src_addr();
        match &self.backing {
            Backing::Buffer(data) => fileio::seek_and_write_buffer(out, offset, data),
            Backing::File { path, .. } => fileio::seek_and_write_file(out, offset, path),
        }
    }
}
