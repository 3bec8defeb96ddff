// Copyright (c) the Helio Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Single-HDU FITS images: BITPIX 8/16/32/-32 reading (honouring
//! BZERO/BSCALE) and BITPIX 8/16/-32 writing. Floating-point data with a
//! maximum above 1 is optionally normalized into `[0, 1]` on load.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::image::{Image, PixelFormat};

const RECORD_LEN: usize = 80;
const BLOCK_LEN: usize = 2880;

fn unsupported(path: &Path) -> Error {
    Error::UnsupportedFormat(path.display().to_string())
}

struct FitsHeader {
    bitpix: i32,
    width: u32,
    height: u32,
    bzero: f64,
    bscale: f64,
    data_offset: usize,
}

fn card_value(card: &str) -> Option<&str> {
    card.split_once('=')
        .map(|(_, v)| v.split('/').next().unwrap_or("").trim())
}

fn parse_header(data: &[u8], path: &Path) -> Result<FitsHeader> {
    let mut bitpix: Option<i32> = None;
    let mut naxis: Option<u32> = None;
    let mut naxis1: Option<u32> = None;
    let mut naxis2: Option<u32> = None;
    let mut bzero = 0.0f64;
    let mut bscale = 1.0f64;

    let mut offset = 0usize;
    let mut ended = false;
    'blocks: while offset + BLOCK_LEN <= data.len() || (offset == 0 && !data.is_empty()) {
        let block = data.get(offset..offset + BLOCK_LEN).ok_or(unsupported(path))?;
        for rec in block.chunks(RECORD_LEN) {
            let card = std::str::from_utf8(rec).map_err(|_| unsupported(path))?;
            let keyword = card.get(0..8).unwrap_or("").trim_end();
            match keyword {
                "END" => {
                    ended = true;
                    offset += BLOCK_LEN;
                    break 'blocks;
                }
                "SIMPLE" => {
                    if card_value(card) != Some("T") {
                        return Err(unsupported(path));
                    }
                }
                "BITPIX" => {
                    bitpix = card_value(card).and_then(|v| v.parse().ok());
                }
                "NAXIS" => {
                    naxis = card_value(card).and_then(|v| v.parse().ok());
                }
                "NAXIS1" => {
                    naxis1 = card_value(card).and_then(|v| v.parse().ok());
                }
                "NAXIS2" => {
                    naxis2 = card_value(card).and_then(|v| v.parse().ok());
                }
                "BZERO" => {
                    bzero = card_value(card).and_then(|v| v.parse().ok()).unwrap_or(0.0);
                }
                "BSCALE" => {
                    bscale = card_value(card)
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(1.0);
                }
                _ => {}
            }
        }
        offset += BLOCK_LEN;
    }
    if !ended {
        return Err(unsupported(path));
    }

    let bitpix = bitpix.ok_or(unsupported(path))?;
    let naxis = naxis.ok_or(unsupported(path))?;
    if !(2..=3).contains(&naxis) {
        return Err(unsupported(path));
    }
    Ok(FitsHeader {
        bitpix,
        width: naxis1.ok_or(unsupported(path))?,
        height: naxis2.ok_or(unsupported(path))?,
        bzero,
        bscale,
        data_offset: offset,
    })
}

pub fn fits_size(path: &Path) -> Result<(u32, u32)> {
    let data = std::fs::read(path)?;
    let h = parse_header(&data, path)?;
    Ok((h.width, h.height))
}

pub fn read_fits(path: &Path, normalize: bool) -> Result<Image> {
    let data = std::fs::read(path)?;
    let h = parse_header(&data, path)?;

    let sample_bytes = (h.bitpix.unsigned_abs() / 8) as usize;
    let count = h.width as usize * h.height as usize;
    let payload = data
        .get(h.data_offset..h.data_offset + count * sample_bytes)
        .ok_or(unsupported(path))?;

    let img = match h.bitpix {
        8 => {
            let mut img = Image::new(h.width, h.height, PixelFormat::Mono8)?;
            for (i, v) in img.pixels_mut::<u8>().iter_mut().enumerate() {
                *v = (payload[i] as f64 * h.bscale + h.bzero).clamp(0.0, 255.0) as u8;
            }
            img
        }
        16 => {
            let mut img = Image::new(h.width, h.height, PixelFormat::Mono16)?;
            for (i, v) in img.pixels_mut::<u16>().iter_mut().enumerate() {
                let raw = BigEndian::read_i16(&payload[i * 2..]) as f64;
                *v = (raw * h.bscale + h.bzero).clamp(0.0, 65535.0) as u16;
            }
            img
        }
        32 => {
            // 32-bit integers downscale to the float range.
            let mut img = Image::new(h.width, h.height, PixelFormat::Mono32F)?;
            for (i, v) in img.pixels_mut::<f32>().iter_mut().enumerate() {
                let raw = BigEndian::read_i32(&payload[i * 4..]) as f64;
                *v = ((raw * h.bscale + h.bzero) / i32::MAX as f64) as f32;
            }
            img
        }
        -32 => {
            let mut img = Image::new(h.width, h.height, PixelFormat::Mono32F)?;
            for (i, v) in img.pixels_mut::<f32>().iter_mut().enumerate() {
                let raw = BigEndian::read_f32(&payload[i * 4..]) as f64;
                *v = (raw * h.bscale + h.bzero) as f32;
            }
            img
        }
        _ => return Err(unsupported(path)),
    };

    let mut img = img;
    if img.format() == PixelFormat::Mono32F && normalize {
        let max = img
            .pixels::<f32>()
            .iter()
            .fold(f32::MIN, |acc, &v| acc.max(v));
        if max > 1.0 {
            for v in img.pixels_mut::<f32>() {
                *v /= max;
            }
        }
    }
    Ok(img)
}

fn push_card(header: &mut Vec<u8>, text: &str) {
    let mut card = [b' '; RECORD_LEN];
    card[..text.len()].copy_from_slice(text.as_bytes());
    header.extend_from_slice(&card);
}

fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    while buf.len() % BLOCK_LEN != 0 {
        buf.push(fill);
    }
}

/// Writes a mono image as a single-HDU FITS file (BITPIX 8, 16 or -32).
pub fn write_fits(path: &Path, img: &Image) -> Result<()> {
    let bitpix = match img.format() {
        PixelFormat::Mono8 => 8,
        PixelFormat::Mono16 => 16,
        PixelFormat::Mono32F => -32,
        _ => return Err(Error::UnsupportedFormat(format!("{:?}", img.format()))),
    };

    let mut out = Vec::new();
    push_card(&mut out, "SIMPLE  =                    T");
    push_card(&mut out, &format!("BITPIX  = {bitpix:>20}"));
    push_card(&mut out, "NAXIS   =                    2");
    push_card(&mut out, &format!("NAXIS1  = {:>20}", img.width()));
    push_card(&mut out, &format!("NAXIS2  = {:>20}", img.height()));
    if bitpix == 16 {
        // Unsigned 16-bit data stored as offset signed integers.
        push_card(&mut out, "BZERO   =                32768");
        push_card(&mut out, "BSCALE  =                    1");
    }
    push_card(&mut out, "END");
    pad_to_block(&mut out, b' ');

    match img.format() {
        PixelFormat::Mono8 => out.extend_from_slice(img.bytes()),
        PixelFormat::Mono16 => {
            for &v in img.pixels::<u16>() {
                let stored = (v as i32 - 32768) as i16;
                out.extend_from_slice(&stored.to_be_bytes());
            }
        }
        _ => {
            for &v in img.pixels::<f32>() {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }
    pad_to_block(&mut out, 0);

    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(&out)?;
    w.flush()?;
    Ok(())
}
