//! Content-sniffing decompression for fetched blobs.
//!
//! Published blobs may arrive base64-wrapped, gzip-compressed, both, or
//! plain; there is no encoding signal on the wire, so the pipeline sniffs:
//! text that matches the base64 alphabet (and is long enough to not be a
//! false positive) is decoded, and decoded bytes opening with the gzip
//! magic are decompressed. Best effort only: a long plaintext file that
//! happens to be pure base64 alphabet will be mis-decoded.

use async_compression::tokio::bufread::GzipDecoder;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Minimum length before text is considered base64-shaped.
const MIN_BASE64_LEN: usize = 50;

#[derive(Debug, Error)]
#[error("content decode failed: {0}")]
pub struct DecodeError(String);

fn base64_shaped(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.len() > MIN_BASE64_LEN
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}

async fn gunzip(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = GzipDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .await
        .map_err(|e| DecodeError(format!("gzip: {e}")))?;
    Ok(out)
}

/// Decode fetched bytes into servable content.
///
/// Non-text and non-base64-shaped input passes through unmodified. A
/// base64 decode failure also falls back to the raw bytes; only a broken
/// gzip stream is a hard error, since at that point the content was
/// unambiguously compressed.
pub async fn decode_content(raw: Bytes) -> Result<Bytes, DecodeError> {
    let Ok(text) = std::str::from_utf8(&raw) else {
        return Ok(raw);
    };
    if !base64_shaped(text) {
        return Ok(raw);
    }

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = match STANDARD.decode(compact.as_bytes()) {
        Ok(decoded) => decoded,
        Err(_) => return Ok(raw),
    };

    if decoded.starts_with(&GZIP_MAGIC) {
        Ok(Bytes::from(gunzip(&decoded).await?))
    } else {
        Ok(Bytes::from(decoded))
    }
}
