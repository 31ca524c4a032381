// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! PNG text chunk and EXIF reader

use image::{ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use super::MetadataMap;
use crate::{Result, SortError};

/// Textual EXIF tags merged as informational fields, with the key each is stored under
const EXIF_TEXT_FIELDS: &[(exif::Tag, &str)] = &[
    (exif::Tag::ImageDescription, "description"),
    (exif::Tag::Software, "Software"),
    (exif::Tag::Artist, "Author"),
    (exif::Tag::Copyright, "Copyright"),
];

/// Fail unless the file content is a PNG, whatever its extension says
fn ensure_png(path: &Path) -> Result<()> {
    let format = ImageReader::open(path)?.with_guessed_format()?.format();
    if format != Some(ImageFormat::Png) {
        return Err(SortError::NotPng(path.to_path_buf()));
    }
    Ok(())
}

/// Read all textual metadata from a PNG file.
///
/// The whole image is decoded; truncated or corrupt pixel data is an error
/// even when the text chunks before it are intact.
///
/// `tEXt`, `zTXt` and `iTXt` chunks are applied in that order and a later
/// chunk replaces an earlier one with the same keyword. Textual EXIF tags
/// from an `eXIf` chunk are then added where the key is still free.
pub fn read_text_metadata(path: &Path) -> Result<MetadataMap> {
    ensure_png(path)?;

    let decoder = png::Decoder::new(BufReader::new(File::open(path)?));
    let mut reader = decoder.read_info()?;

    // Chunks stored after IDAT are only parsed once the frame has been read.
    // A file whose image data does not decode counts as unreadable.
    let mut buf = vec![0; reader.output_buffer_size()];
    reader.next_frame(&mut buf)?;

    let info = reader.info();
    let mut map = MetadataMap::new();

    for chunk in &info.uncompressed_latin1_text {
        map.insert(chunk.keyword.as_str(), chunk.text.as_str());
    }
    for chunk in &info.compressed_latin1_text {
        match chunk.get_text() {
            Ok(text) => map.insert(chunk.keyword.as_str(), text),
            Err(e) => debug!("Skipping zTXt chunk {:?}: {}", chunk.keyword, e),
        }
    }
    for chunk in &info.utf8_text {
        match chunk.get_text() {
            Ok(text) => map.insert(chunk.keyword.as_str(), text),
            Err(e) => debug!("Skipping iTXt chunk {:?}: {}", chunk.keyword, e),
        }
    }

    if let Some(raw) = info.exif_metadata.as_deref() {
        merge_exif_fields(&mut map, raw);
    }

    Ok(map)
}

/// Merge ASCII EXIF tags from raw TIFF-structured EXIF data
fn merge_exif_fields(map: &mut MetadataMap, raw: &[u8]) {
    let exif = match exif::Reader::new().read_raw(raw.to_vec()) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("Ignoring unreadable eXIf chunk: {}", e);
            return;
        }
    };

    for (tag, key) in EXIF_TEXT_FIELDS {
        let Some(field) = exif.get_field(*tag, exif::In::PRIMARY) else {
            continue;
        };
        if let exif::Value::Ascii(ref parts) = field.value {
            if let Some(bytes) = parts.first() {
                let text = String::from_utf8_lossy(bytes);
                map.insert_if_absent(*key, text.trim_end_matches('\0'));
            }
        }
    }
}

/// Write a 1x1 RGB PNG carrying the given text chunks.
///
/// Each chunk is `(kind, keyword, text)` where kind is `tEXt`, `zTXt` or `iTXt`.
#[cfg(test)]
pub(crate) fn write_test_png(path: &Path, chunks: &[(&str, &str, &str)]) {
    let mut data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut data, 1, 1);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        for (kind, keyword, text) in chunks {
            match *kind {
                "zTXt" => encoder.add_ztxt_chunk(keyword.to_string(), text.to_string()).unwrap(),
                "iTXt" => encoder.add_itxt_chunk(keyword.to_string(), text.to_string()).unwrap(),
                _ => encoder.add_text_chunk(keyword.to_string(), text.to_string()).unwrap(),
            }
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0, 0, 0]).unwrap();
        writer.finish().unwrap();
    }
    std::fs::write(path, data).unwrap();
}

/// Write a 64x64 PNG with the given text chunks, cut off halfway through its image data
#[cfg(test)]
pub(crate) fn write_truncated_test_png(path: &Path, chunks: &[(&str, &str, &str)]) {
    let (width, height) = (64u32, 64u32);
    // Noisy pixels so the compressed data stays large
    let mut seed = 0x2545_f491u32;
    let pixels: Vec<u8> = (0..width * height * 3)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            (seed >> 24) as u8
        })
        .collect();

    let mut data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut data, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        for (_, keyword, text) in chunks {
            encoder.add_text_chunk(keyword.to_string(), text.to_string()).unwrap();
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&pixels).unwrap();
        writer.finish().unwrap();
    }
    let keep = data.len() / 2;
    std::fs::write(path, &data[..keep]).unwrap();
}
