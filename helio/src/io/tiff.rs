// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! TIFF reading (uncompressed, chunky, `BlackIsZero`/`WhiteIsZero`/`RGB`,
//! 8/16-bit integer and 32-bit float samples, any strip layout) and writing
//! of uncompressed mono images.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_PLANAR_CONFIG: u16 = 284;
const TAG_SAMPLE_FORMAT: u16 = 339;

const COMPRESSION_NONE: u16 = 1;
const PHOTOMETRIC_WHITE_IS_ZERO: u16 = 0;
const PHOTOMETRIC_BLACK_IS_ZERO: u16 = 1;
const PHOTOMETRIC_RGB: u16 = 2;
const PLANAR_CHUNKY: u16 = 1;
const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_IEEEFP: u16 = 3;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

#[derive(Default)]
struct IfdEntryValues {
    width: u32,
    height: u32,
    bits_per_sample: u16,
    compression: u16,
    photometric: u16,
    samples_per_pixel: u16,
    rows_per_strip: u32,
    planar_config: u16,
    sample_format: u16,
    strip_offsets: Vec<u32>,
    strip_byte_counts: Vec<u32>,
}

fn unsupported(path: &Path) -> Error {
    Error::UnsupportedFormat(path.display().to_string())
}

/// Reads one IFD entry's integer values (SHORT or LONG, inline or offset).
fn entry_values<B: ByteOrder>(data: &[u8], entry: &[u8], path: &Path) -> Result<Vec<u32>> {
    let typ = B::read_u16(&entry[2..]);
    let count = B::read_u32(&entry[4..]) as usize;
    let elem_size = match typ {
        TYPE_SHORT => 2,
        TYPE_LONG => 4,
        _ => return Err(unsupported(path)),
    };
    let total = count * elem_size;
    let src: &[u8] = if total <= 4 {
        &entry[8..12]
    } else {
        let offset = B::read_u32(&entry[8..]) as usize;
        data.get(offset..offset + total).ok_or(unsupported(path))?
    };
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(match typ {
            TYPE_SHORT => B::read_u16(&src[i * 2..]) as u32,
            _ => B::read_u32(&src[i * 4..]),
        });
    }
    Ok(out)
}

fn parse_ifd<B: ByteOrder>(data: &[u8], path: &Path) -> Result<IfdEntryValues> {
    let ifd_offset = B::read_u32(&data[4..]) as usize;
    let num_entries = B::read_u16(data.get(ifd_offset..ifd_offset + 2).ok_or(unsupported(path))?)
        as usize;

    let mut v = IfdEntryValues {
        compression: COMPRESSION_NONE,
        photometric: PHOTOMETRIC_BLACK_IS_ZERO,
        samples_per_pixel: 1,
        rows_per_strip: u32::MAX,
        planar_config: PLANAR_CHUNKY,
        sample_format: SAMPLE_FORMAT_UINT,
        bits_per_sample: 1,
        ..Default::default()
    };

    for i in 0..num_entries {
        let at = ifd_offset + 2 + 12 * i;
        let entry = data.get(at..at + 12).ok_or(unsupported(path))?;
        let tag = B::read_u16(entry);
        let first = |vals: Vec<u32>| vals.first().copied().unwrap_or(0);
        match tag {
            TAG_IMAGE_WIDTH => v.width = first(entry_values::<B>(data, entry, path)?),
            TAG_IMAGE_LENGTH => v.height = first(entry_values::<B>(data, entry, path)?),
            TAG_BITS_PER_SAMPLE => {
                let vals = entry_values::<B>(data, entry, path)?;
                // All samples must share one depth.
                if vals.windows(2).any(|w| w[0] != w[1]) {
                    return Err(unsupported(path));
                }
                v.bits_per_sample = first(vals) as u16;
            }
            TAG_COMPRESSION => v.compression = first(entry_values::<B>(data, entry, path)?) as u16,
            TAG_PHOTOMETRIC => v.photometric = first(entry_values::<B>(data, entry, path)?) as u16,
            TAG_STRIP_OFFSETS => v.strip_offsets = entry_values::<B>(data, entry, path)?,
            TAG_SAMPLES_PER_PIXEL => {
                v.samples_per_pixel = first(entry_values::<B>(data, entry, path)?) as u16
            }
            TAG_ROWS_PER_STRIP => {
                v.rows_per_strip = first(entry_values::<B>(data, entry, path)?)
            }
            TAG_STRIP_BYTE_COUNTS => v.strip_byte_counts = entry_values::<B>(data, entry, path)?,
            TAG_PLANAR_CONFIG => {
                v.planar_config = first(entry_values::<B>(data, entry, path)?) as u16
            }
            TAG_SAMPLE_FORMAT => {
                v.sample_format = first(entry_values::<B>(data, entry, path)?) as u16
            }
            _ => {}
        }
    }
    Ok(v)
}

fn pixel_format_of(v: &IfdEntryValues, path: &Path) -> Result<PixelFormat> {
    match (v.samples_per_pixel, v.bits_per_sample, v.sample_format) {
        (1, 8, SAMPLE_FORMAT_UINT) => Ok(PixelFormat::Mono8),
        (1, 16, SAMPLE_FORMAT_UINT) => Ok(PixelFormat::Mono16),
        (1, 32, SAMPLE_FORMAT_IEEEFP) => Ok(PixelFormat::Mono32F),
        (3, 8, SAMPLE_FORMAT_UINT) => Ok(PixelFormat::Rgb8),
        (3, 16, SAMPLE_FORMAT_UINT) => Ok(PixelFormat::Rgb16),
        (3, 32, SAMPLE_FORMAT_IEEEFP) => Ok(PixelFormat::Rgb32F),
        _ => Err(unsupported(path)),
    }
}

pub fn tiff_size(path: &Path) -> Result<(u32, u32)> {
    let data = std::fs::read(path)?;
    let v = parse_header_and_ifd(&data, path)?;
    Ok((v.width, v.height))
}

fn parse_header_and_ifd(data: &[u8], path: &Path) -> Result<IfdEntryValues> {
    if data.len() < 8 {
        return Err(unsupported(path));
    }
    match &data[0..4] {
        b"II\x2a\x00" => parse_ifd::<LittleEndian>(data, path),
        b"MM\x00\x2a" => parse_ifd::<BigEndian>(data, path),
        _ => Err(unsupported(path)),
    }
}

pub fn read_tiff(path: &Path) -> Result<Image> {
    let data = std::fs::read(path)?;
    let big_endian = data.get(0..2) == Some(b"MM");
    let v = parse_header_and_ifd(&data, path)?;

    if v.compression != COMPRESSION_NONE || v.planar_config != PLANAR_CHUNKY {
        return Err(unsupported(path));
    }
    if !matches!(
        v.photometric,
        PHOTOMETRIC_WHITE_IS_ZERO | PHOTOMETRIC_BLACK_IS_ZERO | PHOTOMETRIC_RGB
    ) {
        return Err(unsupported(path));
    }
    if v.strip_offsets.is_empty() || v.strip_offsets.len() != v.strip_byte_counts.len() {
        return Err(unsupported(path));
    }

    let format = pixel_format_of(&v, path)?;
    let mut img = Image::new(v.width, v.height, format)?;
    let bpr = img.bytes_per_row();

    // Concatenate strip payloads row by row.
    let mut y = 0u32;
    let mut row_fill = 0usize;
    for (offset, count) in v.strip_offsets.iter().zip(&v.strip_byte_counts) {
        let strip = data
            .get(*offset as usize..(*offset + *count) as usize)
            .ok_or(unsupported(path))?;
        let mut at = 0usize;
        while at < strip.len() && y < v.height {
            let take = (bpr - row_fill).min(strip.len() - at);
            img.row_bytes_mut(y)[row_fill..row_fill + take]
                .copy_from_slice(&strip[at..at + take]);
            row_fill += take;
            at += take;
            if row_fill == bpr {
                row_fill = 0;
                y += 1;
            }
        }
    }
    if y < v.height {
        return Err(unsupported(path));
    }

    // Multi-byte samples arrive in file order; flip to native.
    if big_endian && v.bits_per_sample == 16 {
        for s in img.pixels_mut::<u16>() {
            *s = s.swap_bytes();
        }
    } else if big_endian && v.bits_per_sample == 32 {
        let byte_len = img.bytes().len();
        let bytes = img.bytes_mut();
        for i in (0..byte_len).step_by(4) {
            bytes.swap(i, i + 3);
            bytes.swap(i + 1, i + 2);
        }
    }

    if v.photometric == PHOTOMETRIC_WHITE_IS_ZERO {
        negate(&mut img);
    }

    Ok(img)
}

/// Inverts brightness in place (for `WhiteIsZero` sources).
fn negate(img: &mut Image) {
    match img.format() {
        PixelFormat::Mono8 => {
            for v in img.pixels_mut::<u8>() {
                *v = 0xFF - *v;
            }
        }
        PixelFormat::Mono16 => {
            for v in img.pixels_mut::<u16>() {
                *v = 0xFFFF - *v;
            }
        }
        PixelFormat::Mono32F => {
            for v in img.pixels_mut::<f32>() {
                *v = 1.0 - *v;
            }
        }
        _ => {}
    }
}

/// Writes a mono (`Mono8`/`Mono16`/`Mono32F`) image as uncompressed
/// little-endian TIFF with a single strip.
pub fn write_tiff(path: &Path, img: &Image) -> Result<()> {
    let (bits, sample_format) = match img.format() {
        PixelFormat::Mono8 => (8u16, SAMPLE_FORMAT_UINT),
        PixelFormat::Mono16 => (16, SAMPLE_FORMAT_UINT),
        PixelFormat::Mono32F => (32, SAMPLE_FORMAT_IEEEFP),
        _ => return Err(Error::UnsupportedFormat(format!("{:?}", img.format()))),
    };

    let mut w = BufWriter::new(File::create(path)?);

    let data_len = img.bytes().len() as u32;
    let data_offset = 8u32;
    let ifd_offset = data_offset + data_len;
    let num_entries: u16 = 10;

    w.write_all(b"II\x2a\x00")?;
    w.write_u32::<LittleEndian>(ifd_offset)?;
    w.write_all(img.bytes())?;

    w.write_u16::<LittleEndian>(num_entries)?;
    let entry = |w: &mut BufWriter<File>, tag: u16, typ: u16, value: u32| -> Result<()> {
        w.write_u16::<LittleEndian>(tag)?;
        w.write_u16::<LittleEndian>(typ)?;
        w.write_u32::<LittleEndian>(1)?;
        if typ == TYPE_SHORT {
            w.write_u16::<LittleEndian>(value as u16)?;
            w.write_u16::<LittleEndian>(0)?;
        } else {
            w.write_u32::<LittleEndian>(value)?;
        }
        Ok(())
    };

    entry(&mut w, TAG_IMAGE_WIDTH, TYPE_LONG, img.width())?;
    entry(&mut w, TAG_IMAGE_LENGTH, TYPE_LONG, img.height())?;
    entry(&mut w, TAG_BITS_PER_SAMPLE, TYPE_SHORT, bits as u32)?;
    entry(&mut w, TAG_COMPRESSION, TYPE_SHORT, COMPRESSION_NONE as u32)?;
    entry(
        &mut w,
        TAG_PHOTOMETRIC,
        TYPE_SHORT,
        PHOTOMETRIC_BLACK_IS_ZERO as u32,
    )?;
    entry(&mut w, TAG_STRIP_OFFSETS, TYPE_LONG, data_offset)?;
    entry(&mut w, TAG_SAMPLES_PER_PIXEL, TYPE_SHORT, 1)?;
    entry(&mut w, TAG_ROWS_PER_STRIP, TYPE_LONG, img.height())?;
    entry(&mut w, TAG_STRIP_BYTE_COUNTS, TYPE_LONG, data_len)?;
    entry(&mut w, TAG_SAMPLE_FORMAT, TYPE_SHORT, sample_format as u32)?;
    w.write_u32::<LittleEndian>(0)?; // no further IFDs
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn roundtrip(format: PixelFormat) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.tif");

        let mut img = Image::new(6, 4, format).unwrap();
        match format {
            PixelFormat::Mono8 => {
                for (i, v) in img.pixels_mut::<u8>().iter_mut().enumerate() {
                    *v = (i * 11) as u8;
                }
            }
            PixelFormat::Mono16 => {
                for (i, v) in img.pixels_mut::<u16>().iter_mut().enumerate() {
                    *v = (i * 2749) as u16;
                }
            }
            _ => {
                for (i, v) in img.pixels_mut::<f32>().iter_mut().enumerate() {
                    *v = i as f32 / 24.0;
                }
            }
        }

        write_tiff(&path, &img).unwrap();
        assert_eq!(tiff_size(&path).unwrap(), (6, 4));
        let restored = read_tiff(&path).unwrap();
        assert_eq!(restored.format(), format);
        assert_eq!(restored.bytes(), img.bytes());
    }

    #[test]
    fn mono8_roundtrip() {
        roundtrip(PixelFormat::Mono8);
    }

    #[test]
    fn mono16_roundtrip() {
        roundtrip(PixelFormat::Mono16);
    }

    #[test]
    fn mono32f_roundtrip() {
        roundtrip(PixelFormat::Mono32F);
    }

    #[test]
    fn big_endian_mono16_is_swapped() {
        // Hand-built minimal big-endian TIFF, 1x1, 16-bit, value 0x1234.
        let mut data = Vec::new();
        data.extend_from_slice(b"MM\x00\x2a");
        data.extend_from_slice(&10u32.to_be_bytes()); // IFD offset
        data.extend_from_slice(&0x1234u16.to_be_bytes()); // pixel data at offset 8
        let mut entry = |tag: u16, typ: u16, value: u32, data: &mut Vec<u8>| {
            data.extend_from_slice(&tag.to_be_bytes());
            data.extend_from_slice(&typ.to_be_bytes());
            data.extend_from_slice(&1u32.to_be_bytes());
            if typ == TYPE_SHORT {
                data.extend_from_slice(&(value as u16).to_be_bytes());
                data.extend_from_slice(&[0, 0]);
            } else {
                data.extend_from_slice(&value.to_be_bytes());
            }
        };
        data.extend_from_slice(&7u16.to_be_bytes());
        entry(TAG_IMAGE_WIDTH, TYPE_LONG, 1, &mut data);
        entry(TAG_IMAGE_LENGTH, TYPE_LONG, 1, &mut data);
        entry(TAG_BITS_PER_SAMPLE, TYPE_SHORT, 16, &mut data);
        entry(TAG_PHOTOMETRIC, TYPE_SHORT, 1, &mut data);
        entry(TAG_STRIP_OFFSETS, TYPE_LONG, 8, &mut data);
        entry(TAG_ROWS_PER_STRIP, TYPE_LONG, 1, &mut data);
        entry(TAG_STRIP_BYTE_COUNTS, TYPE_LONG, 2, &mut data);
        data.extend_from_slice(&0u32.to_be_bytes());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("be.tif");
        std::fs::write(&path, &data).unwrap();

        let img = read_tiff(&path).unwrap();
        assert_eq!(img.format(), PixelFormat::Mono16);
        assert_eq!(img.row::<u16>(0)[0], 0x1234);
    }

    #[test]
    fn white_is_zero_negates() {
        let mut data = Vec::new();
        data.extend_from_slice(b"II\x2a\x00");
        data.extend_from_slice(&10u32.to_le_bytes());
        data.push(10); // single 8-bit pixel at offset 8
        data.push(0); // padding
        let mut entry = |tag: u16, typ: u16, value: u32, data: &mut Vec<u8>| {
            data.extend_from_slice(&tag.to_le_bytes());
            data.extend_from_slice(&typ.to_le_bytes());
            data.extend_from_slice(&1u32.to_le_bytes());
            if typ == TYPE_SHORT {
                data.extend_from_slice(&(value as u16).to_le_bytes());
                data.extend_from_slice(&[0, 0]);
            } else {
                data.extend_from_slice(&value.to_le_bytes());
            }
        };
        data.extend_from_slice(&7u16.to_le_bytes());
        entry(TAG_IMAGE_WIDTH, TYPE_LONG, 1, &mut data);
        entry(TAG_IMAGE_LENGTH, TYPE_LONG, 1, &mut data);
        entry(TAG_BITS_PER_SAMPLE, TYPE_SHORT, 8, &mut data);
        entry(TAG_PHOTOMETRIC, TYPE_SHORT, PHOTOMETRIC_WHITE_IS_ZERO as u32, &mut data);
        entry(TAG_STRIP_OFFSETS, TYPE_LONG, 8, &mut data);
        entry(TAG_ROWS_PER_STRIP, TYPE_LONG, 1, &mut data);
        entry(TAG_STRIP_BYTE_COUNTS, TYPE_LONG, 1, &mut data);
        data.extend_from_slice(&0u32.to_le_bytes());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wiz.tif");
        std::fs::write(&path, &data).unwrap();

        let img = read_tiff(&path).unwrap();
        assert_eq!(img.row::<u8>(0)[0], 245);
    }

    #[test]
    fn compressed_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.tif");
        let img = Image::new(2, 2, PixelFormat::Mono8).unwrap();
        write_tiff(&path, &img).unwrap();
        let mut data = std::fs::read(&path).unwrap();
        // Patch the compression entry (tag 259) to LZW (5).
        let ifd = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let n = u16::from_le_bytes([data[ifd], data[ifd + 1]]) as usize;
        for i in 0..n {
            let at = ifd + 2 + 12 * i;
            if u16::from_le_bytes([data[at], data[at + 1]]) == TAG_COMPRESSION {
                data[at + 8] = 5;
            }
        }
        std::fs::write(&path, &data).unwrap();
        assert!(read_tiff(&path).is_err());
    }
}
