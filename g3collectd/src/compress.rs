/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;
use std::io::{self, Write};
use std::str::FromStr;

use anyhow::anyhow;
use flate2::Compression as Level;
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};

/// Compression applied to a whole flushed buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Snappy,
    Gzip,
    Zlib,
    Deflate,
}

impl Compression {
    pub const fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Snappy => Some("snappy"),
            Compression::Gzip => Some("gzip"),
            Compression::Zlib => Some("zlib"),
            Compression::Deflate => Some("deflate"),
        }
    }

    pub fn compress<'a>(&self, data: &'a [u8]) -> io::Result<Cow<'a, [u8]>> {
        match self {
            Compression::None => Ok(Cow::Borrowed(data)),
            Compression::Snappy => snap::raw::Encoder::new()
                .compress_vec(data)
                .map(Cow::Owned)
                .map_err(io::Error::other),
            Compression::Gzip => {
                let mut encoder =
                    GzEncoder::new(Vec::with_capacity(data.len() / 2), Level::default());
                encoder.write_all(data)?;
                encoder.finish().map(Cow::Owned)
            }
            Compression::Zlib => {
                let mut encoder =
                    ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Level::default());
                encoder.write_all(data)?;
                encoder.finish().map(Cow::Owned)
            }
            Compression::Deflate => {
                let mut encoder =
                    DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Level::default());
                encoder.write_all(data)?;
                encoder.finish().map(Cow::Owned)
            }
        }
    }
}

impl FromStr for Compression {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" | "" => Ok(Compression::None),
            "snappy" => Ok(Compression::Snappy),
            "gzip" => Ok(Compression::Gzip),
            "zlib" => Ok(Compression::Zlib),
            "deflate" => Ok(Compression::Deflate),
            _ => Err(anyhow!("unsupported compression {s}")),
        }
    }
}
