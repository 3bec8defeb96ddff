// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Reading of 8-bit palettised and 24-bit BMP files; writing of 8-bit mono
//! BMP with a grayscale palette.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::image::{Image, PALETTE_ENTRIES, PixelFormat};

const FILE_HEADER_SIZE: u32 = 14;
const INFO_HEADER_SIZE: u32 = 40;
const BI_RGB: u32 = 0;

struct BmpInfo {
    width: u32,
    height: u32,
    top_down: bool,
    bit_count: u16,
    data_offset: u32,
    palette_entries: u32,
}

fn read_headers<R: Read + Seek>(r: &mut R, path: &Path) -> Result<BmpInfo> {
    let mut magic = [0u8; 2];
    r.read_exact(&mut magic)?;
    if &magic != b"BM" {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }
    let _file_size = r.read_u32::<LittleEndian>()?;
    let _reserved = r.read_u32::<LittleEndian>()?;
    let data_offset = r.read_u32::<LittleEndian>()?;

    let header_size = r.read_u32::<LittleEndian>()?;
    if header_size < INFO_HEADER_SIZE {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }
    let width = r.read_i32::<LittleEndian>()?;
    let height = r.read_i32::<LittleEndian>()?;
    let _planes = r.read_u16::<LittleEndian>()?;
    let bit_count = r.read_u16::<LittleEndian>()?;
    let compression = r.read_u32::<LittleEndian>()?;
    let _size_image = r.read_u32::<LittleEndian>()?;
    let _ppm_x = r.read_i32::<LittleEndian>()?;
    let _ppm_y = r.read_i32::<LittleEndian>()?;
    let clr_used = r.read_u32::<LittleEndian>()?;
    let _clr_important = r.read_u32::<LittleEndian>()?;

    if compression != BI_RGB || width <= 0 || height == 0 {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }
    if bit_count != 8 && bit_count != 24 {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }

    // Skip any remaining header fields before the palette.
    r.seek(SeekFrom::Start((FILE_HEADER_SIZE + header_size) as u64))?;

    let palette_entries = if bit_count == 8 {
        if clr_used == 0 { 256 } else { clr_used }
    } else {
        0
    };

    Ok(BmpInfo {
        width: width as u32,
        height: height.unsigned_abs(),
        top_down: height < 0,
        bit_count,
        data_offset,
        palette_entries,
    })
}

pub fn bmp_size(path: &Path) -> Result<(u32, u32)> {
    let mut r = BufReader::new(File::open(path)?);
    let info = read_headers(&mut r, path)?;
    Ok((info.width, info.height))
}

pub fn read_bmp(path: &Path) -> Result<Image> {
    let mut r = BufReader::new(File::open(path)?);
    let info = read_headers(&mut r, path)?;

    let format = if info.bit_count == 8 {
        PixelFormat::Pal8
    } else {
        PixelFormat::Rgb8
    };
    let mut img = Image::new(info.width, info.height, format)?;

    if info.bit_count == 8 {
        let mut palette = [0u8; 3 * PALETTE_ENTRIES];
        for i in 0..info.palette_entries.min(PALETTE_ENTRIES as u32) as usize {
            // Palette entries are stored as BGRA.
            let mut quad = [0u8; 4];
            r.read_exact(&mut quad)?;
            palette[3 * i] = quad[2];
            palette[3 * i + 1] = quad[1];
            palette[3 * i + 2] = quad[0];
        }
        img.set_palette(palette);
    }

    r.seek(SeekFrom::Start(info.data_offset as u64))?;

    let src_bpp = info.bit_count as usize / 8;
    let padded_row = (info.width as usize * src_bpp).div_ceil(4) * 4;
    let mut row_buf = vec![0u8; padded_row];

    for i in 0..info.height {
        // Pixel rows are stored bottom-up unless the height was negative.
        let y = if info.top_down {
            i
        } else {
            info.height - 1 - i
        };
        r.read_exact(&mut row_buf)?;
        let dest = img.row_bytes_mut(y);
        if info.bit_count == 8 {
            dest.copy_from_slice(&row_buf[..info.width as usize]);
        } else {
            // BGR -> RGB
            for x in 0..info.width as usize {
                dest[3 * x] = row_buf[3 * x + 2];
                dest[3 * x + 1] = row_buf[3 * x + 1];
                dest[3 * x + 2] = row_buf[3 * x];
            }
        }
    }

    Ok(img)
}

/// Writes a `Mono8` image as an 8-bit BMP with a grayscale palette.
pub fn write_bmp(path: &Path, img: &Image) -> Result<()> {
    assert_eq!(img.format(), PixelFormat::Mono8);

    let mut w = BufWriter::new(File::create(path)?);

    let padded_row = (img.width() as usize).div_ceil(4) * 4;
    let palette_size = 4 * PALETTE_ENTRIES as u32;
    let data_offset = FILE_HEADER_SIZE + INFO_HEADER_SIZE + palette_size;
    let file_size = data_offset + (padded_row as u32) * img.height();

    w.write_all(b"BM")?;
    w.write_u32::<LittleEndian>(file_size)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(data_offset)?;

    w.write_u32::<LittleEndian>(INFO_HEADER_SIZE)?;
    w.write_i32::<LittleEndian>(img.width() as i32)?;
    w.write_i32::<LittleEndian>(img.height() as i32)?;
    w.write_u16::<LittleEndian>(1)?; // planes
    w.write_u16::<LittleEndian>(8)?; // bits per pixel
    w.write_u32::<LittleEndian>(BI_RGB)?;
    w.write_u32::<LittleEndian>(0)?; // image size (may be 0 for BI_RGB)
    w.write_i32::<LittleEndian>(0)?;
    w.write_i32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(PALETTE_ENTRIES as u32)?;
    w.write_u32::<LittleEndian>(0)?;

    for i in 0..PALETTE_ENTRIES as u8 {
        w.write_all(&[i, i, i, 0])?;
    }

    let padding = vec![0u8; padded_row - img.width() as usize];
    for i in (0..img.height()).rev() {
        w.write_all(img.row_bytes(i))?;
        w.write_all(&padding)?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn mono8_roundtrip_via_palette() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.bmp");

        let mut img = Image::new(5, 3, PixelFormat::Mono8).unwrap();
        for y in 0..3 {
            for x in 0..5usize {
                img.row_mut::<u8>(y)[x] = (40 * y) as u8 + 10 * x as u8;
            }
        }
        write_bmp(&path, &img).unwrap();

        assert_eq!(bmp_size(&path).unwrap(), (5, 3));

        let restored = read_bmp(&path).unwrap();
        assert_eq!(restored.format(), PixelFormat::Pal8);
        let mono = restored
            .convert_pixel_format(PixelFormat::Mono8, None)
            .unwrap();
        for y in 0..3 {
            assert_eq!(mono.row::<u8>(y), img.row::<u8>(y));
        }
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bmp");
        std::fs::write(&path, b"definitely not a bitmap").unwrap();
        assert!(read_bmp(&path).is_err());
    }
}
