// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streamed file I/O helpers: stat, page-wise transform-and-pad, and
//! seek-and-write. These exist so a multi-gigabyte initrd never has to be
//! resident in memory at once — every file-backed component is read,
//! transformed, and written one page at a time.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::consts::PAGE_SIZE;
use crate::error::{Error, Result};

/// Returns the current size of the file at `path`.
pub fn stat_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| Error::io(path, e))
}

fn read_fill(path: &Path, file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io(path, e)),
        }
    }
    Ok(filled)
}

/// Streams `src` into a freshly created `dst`, one page at a time, right
/// zero-padding the final short page, calling `per_page` on every page
/// (including the zero-padded tail) before it is written out. Returns the
/// page-aligned total length written. Callers only invoke this once they
/// know the source is *not* already page-aligned — an already-aligned
/// file (including an empty one) is left untouched by the component
/// layer instead of being copied here.
pub fn stream_pages(
    src: &Path,
    dst: &Path,
    mut per_page: impl FnMut(&mut [u8]) -> Result<()>,
) -> Result<u64> {
    let mut src_file = File::open(src).map_err(|e| Error::io(src, e))?;
    let mut dst_file = File::create(dst).map_err(|e| Error::io(dst, e))?;
    let mut total = 0u64;

    loop {
        let mut page = vec![0u8; PAGE_SIZE as usize];
        let n = read_fill(src, &mut src_file, &mut page)?;
        if n == 0 {
            break;
        }
        // `page` was zero-initialised, so bytes beyond `n` are already
        // the required zero padding for a short final page.
        per_page(&mut page)?;
        dst_file.write_all(&page).map_err(|e| Error::io(dst, e))?;
        total += PAGE_SIZE;
    }

    Ok(total)
}

/// Seeks `out` to `offset` and writes `data` there.
pub fn seek_and_write_buffer(out: &mut File, offset: u64, data: &[u8]) -> Result<()> {
    out.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io("<output>", e))?;
    out.write_all(data).map_err(|e| Error::io("<output>", e))
}

/// Seeks `out` to `offset` and streams the full contents of `src` there.
pub fn seek_and_write_file(out: &mut File, offset: u64, src: &Path) -> Result<()> {
    out.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io("<output>", e))?;
    let mut src_file = File::open(src).map_err(|e| Error::io(src, e))?;
    let mut buf = [0u8; PAGE_SIZE as usize];
    loop {
        let n = read_fill(src, &mut src_file, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(|e| Error::io("<output>", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_pages_pads_final_page_and_counts_aligned_length() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        std::fs::write(&src, vec![0xAAu8; 5000]).unwrap();

        let total = stream_pages(&src, &dst, |_| Ok(())).unwrap();
        assert_eq!(total, PAGE_SIZE * 2);

        let written = std::fs::read(&dst).unwrap();
        assert_eq!(written.len(), total as usize);
        assert!(written[..5000].iter().all(|&b| b == 0xAA));
        assert!(written[5000..].iter().all(|&b| b == 0));
    }

    #[test]
    fn seek_and_write_buffer_places_bytes_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let mut file = File::create(&path).unwrap();
        file.set_len(PAGE_SIZE * 2).unwrap();
        seek_and_write_buffer(&mut file, PAGE_SIZE, b"hi").unwrap();
        drop(file);

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[PAGE_SIZE as usize..PAGE_SIZE as usize + 2], b"hi");
    }
}
