// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Writes a [`BuiltImage`] to its final output file: a short PSW at
//! offset 0, `stage3a` at [`STAGE3A_LOAD_ADDRESS`], then every component
//! at its assigned address.

use std::fs::File;
use std::path::Path;

use crate::component::Component;
use crate::consts::{PSW_MASK_BIT_12, PSW_MASK_EA_BA, PSW_SHORT_ADDR_MASK, STAGE3A_INIT_ENTRY, STAGE3A_LOAD_ADDRESS};
use crate::error::{Error, Result};
use crate::fileio::seek_and_write_buffer;
use crate::image::BuiltImage;

/// Packs a mask/address pair into the 8-byte short PSW a firmware loader
/// reads at offset 0. Rejects any mask or address that would not
/// round-trip through the short form: a mask that already touches the
/// low 31 address bits or bit 12, or an address that does not fit in 31
/// bits.
fn convert_psw_to_short_psw(mask: u64, addr: u64) -> Result<u64> {
    if mask & PSW_SHORT_ADDR_MASK != 0 {
        return Err(Error::ImageInternal("PSW mask overlaps short address bits".into()));
    }
    if mask & PSW_MASK_BIT_12 != 0 {
        return Err(Error::ImageInternal("PSW mask already sets bit 12".into()));
    }
    if addr & !PSW_SHORT_ADDR_MASK != 0 {
        return Err(Error::ImageInternal("PSW address does not fit in 31 bits".into()));
    }
    Ok(mask | PSW_MASK_BIT_12 | addr)
}

/// Writes `image` to `path`: the short PSW that hands control to
/// `stage3a`, `stage3a` itself, then every component in collection
/// (address) order.
pub fn write_image(path: &Path, image: &BuiltImage) -> Result<()> {
    let short_psw = convert_psw_to_short_psw(PSW_MASK_EA_BA, STAGE3A_INIT_ENTRY)?;

    let mut file = File::create(path).map_err(|e| Error::io(path, e))?;
    seek_and_write_buffer(&mut file, 0, &short_psw.to_be_bytes())?;
    seek_and_write_buffer(&mut file, STAGE3A_LOAD_ADDRESS, &image.stage3a)?;

    for component in image.collection.iter() {
        write_component(&mut file, component)?;
    }

    Ok(())
}

fn write_component(file: &mut File, component: &Component) -> Result<()> {
    component.write_to(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PAGE_SIZE;

    #[test]
    fn short_psw_sets_bit_12_and_keeps_address() {
        let packed = convert_psw_to_short_psw(PSW_MASK_EA_BA, 0x1_0000).unwrap();
        assert_eq!(packed & PSW_MASK_BIT_12, PSW_MASK_BIT_12);
        assert_eq!(packed & PSW_SHORT_ADDR_MASK, 0x1_0000);
        assert_eq!(packed & !(PSW_MASK_BIT_12 | PSW_SHORT_ADDR_MASK), PSW_MASK_EA_BA);
    }

    #[test]
    fn short_psw_rejects_address_beyond_31_bits() {
        let err = convert_psw_to_short_psw(PSW_MASK_EA_BA, 1u64 << 31).unwrap_err();
        assert!(matches!(err, Error::ImageInternal(_)));
    }

    #[test]
    fn short_psw_rejects_mask_with_bit_12_already_set() {
        let err = convert_psw_to_short_psw(PSW_MASK_EA_BA | PSW_MASK_BIT_12, 0x1_0000).unwrap_err();
        assert!(matches!(err, Error::ImageInternal(_)));
    }

    #[test]
    fn write_image_places_stage3a_and_components_at_expected_offsets() {
        use crate::collection::ComponentCollection;
        use crate::component::{Component, ComponentType};

        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.img");

        let mut collection = ComponentCollection::new();
        collection
            .set_offset(STAGE3A_LOAD_ADDRESS + PAGE_SIZE)
            .unwrap();
        let kernel = Component::from_buffer(ComponentType::Kernel, vec![0xAB; PAGE_SIZE as usize]).unwrap();
        collection.add(kernel).unwrap();
        let (collection, _measurements) = collection.finalize().unwrap();

        let image = BuiltImage {
            stage3a: vec![0xCD; PAGE_SIZE as usize],
            collection,
            psw_addr: crate::consts::IMAGE_ENTRY,
        };

        write_image(&out_path, &image).unwrap();

        let bytes = std::fs::read(&out_path).unwrap();
        let short_psw = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        assert_eq!(short_psw & PSW_MASK_BIT_12, PSW_MASK_BIT_12);
        assert!(bytes[STAGE3A_LOAD_ADDRESS as usize..(STAGE3A_LOAD_ADDRESS + PAGE_SIZE) as usize]
            .iter()
            .all(|&b| b == 0xCD));
        let kernel_addr = (STAGE3A_LOAD_ADDRESS + PAGE_SIZE) as usize;
        assert!(bytes[kernel_addr..kernel_addr + PAGE_SIZE as usize]
            .iter()
            .all(|&b| b == 0xAB));
    }
}
