/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Content type detection from the leading bytes of a message part,
//! following the WHATWG MIME sniffing signatures.

pub const SNIFF_LEN: usize = 512;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

enum Signature {
    /// Case-insensitive HTML tag, must be followed by a space or `>`.
    Html(&'static [u8]),
    /// Exact prefix, optionally after leading whitespace.
    Prefix {
        pattern: &'static [u8],
        skip_ws: bool,
        content_type: &'static str,
    },
    /// Prefix compared under a byte mask.
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        content_type: &'static str,
    },
}

const fn exact(pattern: &'static [u8], content_type: &'static str) -> Signature {
    Signature::Prefix {
        pattern,
        skip_ws: false,
        content_type,
    }
}

static SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Prefix {
        pattern: b"<?xml",
        skip_ws: true,
        content_type: "text/xml; charset=utf-8",
    },
    exact(b"%PDF-", "application/pdf"),
    exact(b"%!PS-Adobe-", "application/postscript"),
    exact(b"\xFE\xFF", "text/plain; charset=utf-16be"),
    exact(b"\xFF\xFE", "text/plain; charset=utf-16le"),
    exact(b"\xEF\xBB\xBF", TEXT_PLAIN),
    exact(b"\x00\x00\x01\x00", "image/x-icon"),
    exact(b"\x00\x00\x02\x00", "image/x-icon"),
    exact(b"BM", "image/bmp"),
    exact(b"GIF87a", "image/gif"),
    exact(b"GIF89a", "image/gif"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        content_type: "image/webp",
    },
    exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    exact(b"\xFF\xD8\xFF", "image/jpeg"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        content_type: "audio/aiff",
    },
    exact(b"ID3", "audio/mpeg"),
    exact(b"OggS\x00", "application/ogg"),
    exact(b"MThd\x00\x00\x00\x06", "audio/midi"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        content_type: "video/avi",
    },
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        content_type: "audio/wave",
    },
    exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    exact(b"wOFF", "font/woff"),
    exact(b"wOF2", "font/woff2"),
    exact(b"\x00\x01\x00\x00", "font/ttf"),
    exact(b"OTTO", "font/otf"),
    exact(b"\x1F\x8B\x08", "application/x-gzip"),
    exact(b"PK\x03\x04", "application/zip"),
    exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    exact(b"\x00\x61\x73\x6D", "application/wasm"),
];

/// Returns the MIME type of `data`, looking at no more than its first
/// 512 bytes. Never fails: unknown binary content is
/// `application/octet-stream`, anything else is UTF-8 plain text.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let trimmed = skip_whitespace(data);

    SIGNATURES
        .iter()
        .find_map(|signature| signature.matches(data, trimmed))
        .unwrap_or_else(|| {
            if data.iter().any(|byte| is_binary(*byte)) {
                OCTET_STREAM
            } else {
                TEXT_PLAIN
            }
        })
}

impl Signature {
    fn matches(&self, data: &[u8], trimmed: &[u8]) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let prefix = trimmed.get(..tag.len())?;
                if prefix.eq_ignore_ascii_case(tag)
                    && matches!(trimmed.get(tag.len()), Some(b' ' | b'>'))
                {
                    Some("text/html; charset=utf-8")
                } else {
                    None
                }
            }
            Signature::Prefix {
                pattern,
                skip_ws,
                content_type,
            } => {
                let data = if *skip_ws { trimmed } else { data };
                data.starts_with(pattern).then_some(*content_type)
            }
            Signature::Masked {
                mask,
                pattern,
                content_type,
            } => {
                let prefix = data.get(..pattern.len())?;
                prefix
                    .iter()
                    .zip(mask.iter())
                    .zip(pattern.iter())
                    .all(|((byte, mask), pattern)| byte & mask == *pattern)
                    .then_some(*content_type)
            }
        }
    }
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|byte| !matches!(byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_binary(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
