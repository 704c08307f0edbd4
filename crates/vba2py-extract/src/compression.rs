use thiserror::Error;

/// Decompressed size of every chunk but the last.
pub(crate) const CHUNK_SIZE: usize = 4096;

/// Default cap on decompressed output relative to the compressed input.
pub const DEFAULT_EXPANSION_RATIO: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressionError {
    #[error("compressed container is empty")]
    Empty,
    #[error("invalid compressed container signature {0:#04x}")]
    InvalidSignature(u8),
    #[error("truncated compressed chunk header")]
    TruncatedChunkHeader,
    #[error("invalid compressed chunk signature bits {0:#x}")]
    InvalidChunkSignature(u16),
    #[error("truncated compressed chunk data")]
    TruncatedChunkData,
    #[error("truncated copy token")]
    TruncatedCopyToken,
    #[error("copy token references data before start of buffer (offset={offset}, out_len={out_len})")]
    BadCopyOffset { offset: usize, out_len: usize },
    #[error("decompressed output exceeds the {limit}-byte limit")]
    OutputLimitExceeded { limit: usize },
}

/// Output cap used by [`decompress_container`] for an input of `input_len` bytes.
pub fn output_limit(input_len: usize, expansion_ratio: usize) -> usize {
    input_len.saturating_mul(expansion_ratio).max(CHUNK_SIZE)
}

/// Decompress an MS-OVBA "CompressedContainer" (MS-OVBA 2.4.1) with the default output cap.
///
/// Used for the `VBA/dir` stream and for the source portion (`TextOffset..`) of module streams.
pub fn decompress_container(input: &[u8]) -> Result<Vec<u8>, CompressionError> {
    decompress_container_with_limit(input, output_limit(input.len(), DEFAULT_EXPANSION_RATIO))
}

/// Like [`decompress_container`], failing with [`CompressionError::OutputLimitExceeded`] as soon
/// as the output would grow past `limit` bytes.
pub fn decompress_container_with_limit(input: &[u8], limit: usize) -> Result<Vec<u8>, CompressionError> {
    let (&sig, rest) = input.split_first().ok_or(CompressionError::Empty)?;
    if sig != 0x01 {
        return Err(CompressionError::InvalidSignature(sig));
    }

    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset < rest.len() {
        if offset + 2 > rest.len() {
            return Err(CompressionError::TruncatedChunkHeader);
        }

        let header = u16::from_le_bytes([rest[offset], rest[offset + 1]]);
        offset += 2;

        // bits 12..14 must be 0b011.
        let signature_bits = (header & 0x7000) >> 12;
        if signature_bits != 0b011 {
            return Err(CompressionError::InvalidChunkSignature(signature_bits));
        }

        let compressed = (header & 0x8000) != 0;
        // The size field counts the two header bytes as well.
        let chunk_data_size = (header & 0x0FFF) as usize + 1;

        if offset + chunk_data_size > rest.len() {
            return Err(CompressionError::TruncatedChunkData);
        }
        let chunk_data = &rest[offset..offset + chunk_data_size];
        offset += chunk_data_size;

        let decoded;
        let bytes = if compressed {
            decoded = decompress_chunk(chunk_data)?;
            decoded.as_slice()
        } else {
            chunk_data
        };
        if out.len() + bytes.len() > limit {
            return Err(CompressionError::OutputLimitExceeded { limit });
        }
        out.extend_from_slice(bytes);
    }

    Ok(out)
}

fn decompress_chunk(chunk: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let mut out: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
    let mut idx = 0usize;

    while idx < chunk.len() && out.len() < CHUNK_SIZE {
        let flags = chunk[idx];
        idx += 1;
        for bit in 0..8 {
            if idx >= chunk.len() || out.len() >= CHUNK_SIZE {
                break;
            }

            if flags & (1 << bit) == 0 {
                out.push(chunk[idx]);
                idx += 1;
                continue;
            }

            if idx + 2 > chunk.len() {
                return Err(CompressionError::TruncatedCopyToken);
            }
            let token = u16::from_le_bytes([chunk[idx], chunk[idx + 1]]);
            idx += 2;

            let (offset, length) = unpack_copy_token(token, out.len());
            if offset > out.len() {
                return Err(CompressionError::BadCopyOffset {
                    offset,
                    out_len: out.len(),
                });
            }

            for _ in 0..length {
                if out.len() >= CHUNK_SIZE {
                    break;
                }
                let byte = out[out.len() - offset];
                out.push(byte);
            }
        }
    }

    Ok(out)
}

fn unpack_copy_token(token: u16, decompressed_len: usize) -> (usize, usize) {
    let bit_count = copy_token_bit_count(decompressed_len);
    let length_bit_count = 16 - bit_count;
    let length_mask: u16 = (1u16 << length_bit_count) - 1;
    let offset = (token >> length_bit_count) as usize + 1;
    let length = (token & length_mask) as usize + 3;
    (offset, length)
}

/// CopyTokenBitCount, derived from the decompressed size so far within the current chunk.
fn copy_token_bit_count(current_decompressed_len: usize) -> u32 {
    let n = current_decompressed_len.saturating_sub(1);
    let bits_needed = if n == 0 {
        0
    } else {
        usize::BITS - n.leading_zeros()
    };
    bits_needed.clamp(4, 12)
}

/// Compress `data` into an MS-OVBA CompressedContainer using greedy longest-match tokens.
///
/// A chunk whose compressed form would not be smaller is stored raw.
pub fn compress_container(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01];
    for chunk in data.chunks(CHUNK_SIZE) {
        let body = compress_chunk(chunk);
        if body.len() < chunk.len() {
            let header = 0xB000 | (body.len() + 2 - 3) as u16;
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(&body);
        } else {
            let header = 0x3000 | (chunk.len() + 2 - 3) as u16;
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(chunk);
        }
    }
    out
}

fn compress_chunk(chunk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 8 + 1);
    let mut pos = 0usize;
    while pos < chunk.len() {
        let flag_index = out.len();
        out.push(0u8);
        for bit in 0..8 {
            if pos >= chunk.len() {
                break;
            }
            let bit_count = copy_token_bit_count(pos);
            let max_length = (0xFFFFusize >> bit_count) + 3;
            let (offset, length) = longest_match(chunk, pos, max_length);
            if length >= 3 {
                let token = (((offset - 1) as u16) << (16 - bit_count)) | (length - 3) as u16;
                out.extend_from_slice(&token.to_le_bytes());
                out[flag_index] |= 1 << bit;
                pos += length;
            } else {
                out.push(chunk[pos]);
                pos += 1;
            }
        }
    }
    out
}

fn longest_match(chunk: &[u8], pos: usize, max_length: usize) -> (usize, usize) {
    let mut best = (0, 0);
    let limit = max_length.min(chunk.len() - pos);
    for candidate in (0..pos).rev() {
        let mut len = 0;
        while len < limit && chunk[candidate + len] == chunk[pos + len] {
            len += 1;
        }
        if len > best.1 {
            best = (pos - candidate, len);
            if len == limit {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decompresses_spec_example() {
        // MS-OVBA 3.2.3 "Example: Decompressing a Compressed Container".
        let compressed = [
            0x01, 0x2F, 0xB0, 0x00, 0x23, 0x61, 0x61, 0x61, 0x62, 0x63, 0x64, 0x65, 0x82, 0x66,
            0x00, 0x70, 0x61, 0x67, 0x68, 0x69, 0x6A, 0x01, 0x38, 0x08, 0x61, 0x6B, 0x6C, 0x00,
            0x30, 0x6D, 0x6E, 0x6F, 0x70, 0x06, 0x71, 0x02, 0x70, 0x04, 0x10, 0x72, 0x73, 0x74,
            0x75, 0x76, 0x10, 0x77, 0x78, 0x79, 0x7A, 0x00, 0x3C,
        ];
        let out = decompress_container(&compressed).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "#aaabcdefaaaaghijaaaaaklaaamnopqaaaaaaaaaaaarstuvwxyzaaa"
        );
    }

    #[test]
    fn round_trips_source_text() {
        let text = "Attribute VB_Name = \"Module1\"\r\nSub Main()\r\n    MsgBox \"hello\"\r\nEnd Sub\r\n".repeat(120);
        let compressed = compress_container(text.as_bytes());
        assert!(compressed.len() < text.len());
        assert_eq!(decompress_container(&compressed).unwrap(), text.as_bytes());
    }

    #[test]
    fn output_guard_rejects_high_expansion() {
        let bomb = compress_container(&vec![b'A'; CHUNK_SIZE * 20]);
        assert!(bomb.len() < 200);
        assert!(matches!(
            decompress_container(&bomb),
            Err(CompressionError::OutputLimitExceeded { .. })
        ));
        assert_eq!(decompress_container_with_limit(&bomb, CHUNK_SIZE * 20).unwrap().len(), CHUNK_SIZE * 20);
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(decompress_container(&[]), Err(CompressionError::Empty));
        assert_eq!(decompress_container(&[0x02]), Err(CompressionError::InvalidSignature(0x02)));
        assert_eq!(decompress_container(&[0x01, 0x00]), Err(CompressionError::TruncatedChunkHeader));
        assert_eq!(
            decompress_container(&[0x01, 0x00, 0x80]),
            Err(CompressionError::InvalidChunkSignature(0))
        );
        // Copy token pointing before the start of the chunk.
        assert!(matches!(
            decompress_container(&[0x01, 0x03, 0xB0, 0x02, b'a', 0xFF, 0xFF]),
            Err(CompressionError::BadCopyOffset { .. })
        ));
    }
}
