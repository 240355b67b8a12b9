//! Inline batch bodies: brotli compressed data posted directly to the inbox.

use std::io::{Read, Write};

use crate::header::BROTLI_MESSAGE_HEADER_BYTE;
use crate::DaError;

/// Brotli window size used for inline bodies.
pub const BROTLI_WINDOW: u32 = 22;

const BUFFER_SIZE: usize = 4096;

/// Compresses `payload` and prefixes it with [`BROTLI_MESSAGE_HEADER_BYTE`].
pub fn encode_inline(payload: &[u8], quality: u32) -> Result<Vec<u8>, DaError> {
    let mut out = vec![BROTLI_MESSAGE_HEADER_BYTE];
    {
        let mut writer =
            brotli::CompressorWriter::new(&mut out, BUFFER_SIZE, quality.min(11), BROTLI_WINDOW);
        writer.write_all(payload)?;
        writer.flush()?;
    }
    Ok(out)
}

/// Decompresses an inline body, refusing to produce more than `max_size` bytes.
pub fn decode_inline(body: &[u8], max_size: usize) -> Result<Vec<u8>, DaError> {
    let compressed = match body.split_first() {
        Some((&BROTLI_MESSAGE_HEADER_BYTE, rest)) => rest,
        _ => {
            return Err(DaError::MalformedCertificate(
                "inline body does not start with the brotli header byte".to_string(),
            ))
        }
    };
    let mut out = Vec::new();
    brotli::Decompressor::new(compressed, BUFFER_SIZE)
        .take(max_size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DaError::MalformedPayload(format!("brotli decompression failed: {e}")))?;
    if out.len() > max_size {
        return Err(DaError::MalformedPayload(format!(
            "inline body decompresses to more than {max_size} bytes"
        )));
    }
    Ok(out)
}
