// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ordered component collection: the guest-address allocator and the
//! three parallel measurement streams kept alive across a whole build.

use crate::component::{Component, ComponentType};
use crate::consts::{page_align, PAGE_SIZE};
use crate::crypto::digest::{Sha512Stream, SHA512_LEN};
use crate::error::{Error, Result};

/// The three aggregate measurements produced by [`ComponentCollection::finalize`].
pub struct Measurements {
    pub pld: [u8; SHA512_LEN],
    pub ald: [u8; SHA512_LEN],
    pub tld: [u8; SHA512_LEN],
    pub nep: u64,
}

/// The big-endian `(src_addr, dest_size)` pair `stage3b` needs for one
/// placed component.
#[derive(Clone, Copy)]
pub struct MemBlob {
    pub src_addr: u64,
    pub dest_size: u64,
}

/// Arguments `stage3b` needs to restore every component to its original
/// address and size and then load the initial PSW. `stage3b` itself
/// contributes nothing beyond its own placement.
pub struct Stage3bArgs {
    pub kernel: MemBlob,
    pub cmdline: Option<MemBlob>,
    pub initrd: Option<MemBlob>,
    pub psw_mask: u64,
    pub psw_addr: u64,
}

/// Ordered, append-only sequence of components sharing one guest-address
/// cursor and one set of measurement streams.
///
/// Callers are responsible for adding components in role order (the CLI
/// and the builder guarantee this); the collection itself only enforces
/// that `next_src` stays page-aligned and that nothing is added after
/// [`finalize`](Self::finalize).
pub struct ComponentCollection {
    next_src: u64,
    nep: u64,
    pld_ctx: Sha512Stream,
    ald_ctx: Sha512Stream,
    tld_ctx: Sha512Stream,
    components: Vec<Component>,
    finalized: bool,
}

impl ComponentCollection {
    pub fn new() -> Self {
        ComponentCollection {
            next_src: 0,
            nep: 0,
            pld_ctx: Sha512Stream::new(),
            ald_ctx: Sha512Stream::new(),
            tld_ctx: Sha512Stream::new(),
            components: Vec::new(),
            finalized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Reserves `offset` bytes of guest address space ahead of the first
    /// component. Only legal before any component has been added.
    pub fn set_offset(&mut self, offset: u64) -> Result<()> {
        if !self.components.is_empty() {
            return Err(Error::ImageOffset);
        }
        self.next_src += offset;
        Ok(())
    }

    /// Assigns `component`'s guest address and appends it. The caller
    /// must have already aligned (and, unless no-decryption mode is in
    /// effect, encrypted) the component.
    pub fn add(&mut self, mut component: Component) -> Result<()> {
        if self.finalized {
            return Err(Error::ComponentFinalized);
        }
        let size = component.size();
        let step = if size == 0 { PAGE_SIZE } else { page_align(size).max(PAGE_SIZE) };
        component.set_src_addr(self.next_src);
        self.next_src += step;
        self.components.push(component);
        Ok(())
    }

    /// Iterates components in collection (address) order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter()
    }

    /// The placed `stage3b` component, if one has been added. `stage3b`
    /// must be the last component once the build reaches header
    /// construction.
    pub fn stage3b(&self) -> Result<&Component> {
        match self.components.last() {
            Some(comp) if comp.kind() == ComponentType::Stage3b => Ok(comp),
            _ => Err(Error::ImageInternal("stage3b component missing".into())),
        }
    }

    /// Builds the `(src_addr, dest_size)` triples `stage3b` needs, paired
    /// with the big-endian initial PSW it should load once every
    /// component is restored.
    pub fn stage3b_args(&self, psw_mask: u64, psw_addr: u64) -> Result<Stage3bArgs> {
        let mut kernel = None;
        let mut cmdline = None;
        let mut initrd = None;

        for comp in &self.components {
            let blob = MemBlob { src_addr: comp.src_addr(), dest_size: comp.orig_size() };
            match comp.kind() {
                ComponentType::Kernel => kernel = Some(blob),
                ComponentType::Cmdline => cmdline = Some(blob),
                ComponentType::Initrd => initrd = Some(blob),
                ComponentType::Stage3b => {}
            }
        }

        let kernel = kernel
            .ok_or_else(|| Error::ImageInternal("stage3b args built without a kernel".into()))?;
        Ok(Stage3bArgs { kernel, cmdline, initrd, psw_mask, psw_addr })
    }

    /// Marks the collection finalized and streams every component's
    /// content, addresses, and tweaks through the three measurement
    /// contexts, in collection order. Idempotent-unsafe: may only be
    /// called once.
    pub fn finalize(mut self) -> Result<(Self, Measurements)> {
        self.finalized = true;
        for comp in &self.components {
            let pld_pages = comp.update_pld(&mut self.pld_ctx)?;
            let ald_pages = comp.update_ald(&mut self.ald_ctx);
            let tld_pages = comp.update_tld(&mut self.tld_ctx);
            if pld_pages != ald_pages || ald_pages != tld_pages {
                return Err(Error::ImageInternal(format!(
                    "measurement page counts diverged for {}: pld={pld_pages} ald={ald_pages} tld={tld_pages}",
                    comp.kind().name()
                )));
            }
            self.nep += pld_pages;
        }

        let nep = self.nep;
        let pld = self.pld_ctx.finalize();
        let ald = self.ald_ctx.finalize();
        let tld = self.tld_ctx.finalize();

        Ok((
            ComponentCollection {
                next_src: self.next_src,
                nep,
                pld_ctx: Sha512Stream::new(),
                ald_ctx: Sha512Stream::new(),
                tld_ctx: Sha512Stream::new(),
                components: self.components,
                finalized: true,
            },
            Measurements { pld, ald, tld, nep },
        ))
    }
}

impl Default for ComponentCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(bytes: usize) -> Component {
        Component::from_buffer(ComponentType::Kernel, vec![0xABu8; bytes]).unwrap()
    }

    #[test]
    fn add_advances_next_src_by_aligned_size() {
        let mut coll = ComponentCollection::new();
        coll.add(kernel(PAGE_SIZE as usize)).unwrap();
        coll.add(kernel(PAGE_SIZE as usize * 2)).unwrap();
        let addrs: Vec<u64> = coll.iter().map(|c| c.src_addr()).collect();
        assert_eq!(addrs, vec![0, PAGE_SIZE]);
    }

    #[test]
    fn empty_component_still_advances_by_one_page() {
        let mut coll = ComponentCollection::new();
        coll.add(kernel(0)).unwrap();
        coll.add(kernel(PAGE_SIZE as usize)).unwrap();
        let addrs: Vec<u64> = coll.iter().map(|c| c.src_addr()).collect();
        assert_eq!(addrs, vec![0, PAGE_SIZE]);
    }

    #[test]
    fn set_offset_rejected_after_first_add() {
        let mut coll = ComponentCollection::new();
        coll.add(kernel(PAGE_SIZE as usize)).unwrap();
        assert!(matches!(coll.set_offset(PAGE_SIZE).unwrap_err(), Error::ImageOffset));
    }

    #[test]
    fn add_rejected_after_finalize() {
        let mut coll = ComponentCollection::new();
        coll.add(kernel(PAGE_SIZE as usize)).unwrap();
        let (coll, _) = coll.finalize().unwrap();
        let mut coll = coll;
        assert!(matches!(
            coll.add(kernel(PAGE_SIZE as usize)).unwrap_err(),
            Error::ComponentFinalized
        ));
    }

    #[test]
    fn nep_sums_per_component_page_counts() {
        let mut coll = ComponentCollection::new();
        coll.add(kernel(PAGE_SIZE as usize * 2)).unwrap();
        coll.add(kernel(0)).unwrap();
        let (_, measurements) = coll.finalize().unwrap();
        assert_eq!(measurements.nep, 3);
    }
}
