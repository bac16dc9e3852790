//! The block-backend's self-describing 512-byte info-block format.
//!
//! Pure byte-level encode/decode, independent of any actual device I/O, so
//! it can be unit tested directly (see the invariants in the crate's test
//! module and `whiteboard-backend`'s device-facing tests).
//!
//! Binary layout, all integers in network byte order:
//! ```text
//! next:u64 | name_len:u8 | name:[u8; 63] | (start:u64, size:u64)* | (0, 0) | crc32:u32
//! ```

use nom::bytes::complete::take;
use nom::number::complete::{be_u64, be_u8};
use nom::IResult;

use crate::constants::{BLOCK_SIZE, MAX_SERVICE_NAME_LEN};

const HEADER_LEN: usize = 8 + 1 + MAX_SERVICE_NAME_LEN; // next + len-prefixed name
const PIECE_LEN: usize = 8 + 8;
const CRC_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum InfoBlockError {
    #[error("service name {0:?} is longer than {MAX_SERVICE_NAME_LEN} bytes")]
    NameTooLong(String),
    #[error("info block must be exactly {BLOCK_SIZE} bytes, got {0}")]
    WrongSize(usize),
    #[error("malformed info block: {0}")]
    Malformed(String),
}

/// One decoded info-block. `valid` reflects whether the trailing CRC32
/// matched the computed checksum of the preceding bytes; a `false` here is
/// not a parse failure, it is the signal the block backend uses to refuse
/// to connect (invariant 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoBlock {
    pub next: u64,
    pub name: String,
    pub pieces: Vec<(u64, u64)>,
    pub valid: bool,
}

/// Decode the header's length-prefixed name field.
fn name_field(input: &[u8]) -> IResult<&[u8], String> {
    let (input, len) = be_u8(input)?;
    let (input, raw) = take(MAX_SERVICE_NAME_LEN)(input)?;
    let len = (len as usize).min(MAX_SERVICE_NAME_LEN);
    let name = String::from_utf8_lossy(&raw[..len]).into_owned();
    Ok((input, name))
}

fn piece(input: &[u8]) -> IResult<&[u8], (u64, u64)> {
    let (input, start) = be_u64(input)?;
    let (input, size) = be_u64(input)?;
    Ok((input, (start, size)))
}

/// Parse a 512-byte info-block, validating its trailing CRC32. Never
/// returns an error for a CRC mismatch; instead `valid` is `false`. Fails
/// only for structurally malformed input (wrong size, or a piece list that
/// runs past the end of the block without ever hitting the sentinel).
pub fn parse_info_block(block: &[u8]) -> Result<InfoBlock, InfoBlockError> {
    if block.len() != BLOCK_SIZE {
        return Err(InfoBlockError::WrongSize(block.len()));
    }

    let (rest, next) =
        be_u64::<_, nom::error::Error<&[u8]>>(block).map_err(|e| InfoBlockError::Malformed(e.to_string()))?;
    let (mut rest, name) =
        name_field(rest).map_err(|e| InfoBlockError::Malformed(e.to_string()))?;

    let mut pieces = Vec::new();
    let sentinel_at;
    loop {
        let (next_rest, p) =
            piece(rest).map_err(|e| InfoBlockError::Malformed(e.to_string()))?;
        rest = next_rest;
        if p == (0, 0) {
            sentinel_at = block.len() - rest.len();
            break;
        }
        pieces.push(p);
    }

    let consumed = &block[..sentinel_at];
    let crc_bytes = rest
        .get(..CRC_LEN)
        .ok_or_else(|| InfoBlockError::Malformed("block truncated before CRC".into()))?;
    let expected_crc = u32::from_be_bytes(crc_bytes.try_into().unwrap());
    let computed_crc = crc32fast::hash(consumed);

    Ok(InfoBlock { next, name, pieces, valid: computed_crc == expected_crc })
}

/// Encode `next`/`name`/`pieces` into a fresh, valid 512-byte info-block
/// (CRC computed and appended).
pub fn encode_info_block(
    next: u64,
    name: &str,
    pieces: &[(u64, u64)],
) -> Result<[u8; BLOCK_SIZE], InfoBlockError> {
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Err(InfoBlockError::NameTooLong(name.to_string()));
    }

    let mut body = Vec::with_capacity(BLOCK_SIZE);
    body.extend_from_slice(&next.to_be_bytes());
    body.push(name.len() as u8);
    let mut name_bytes = [0u8; MAX_SERVICE_NAME_LEN];
    name_bytes[..name.len()].copy_from_slice(name.as_bytes());
    body.extend_from_slice(&name_bytes);
    for &(start, size) in pieces {
        body.extend_from_slice(&start.to_be_bytes());
        body.extend_from_slice(&size.to_be_bytes());
    }
    // sentinel
    body.extend_from_slice(&0u64.to_be_bytes());
    body.extend_from_slice(&0u64.to_be_bytes());

    let crc = crc32fast::hash(&body);

    let mut block = [0u8; BLOCK_SIZE];
    if HEADER_LEN + pieces.len() * PIECE_LEN + PIECE_LEN + CRC_LEN > BLOCK_SIZE {
        return Err(InfoBlockError::Malformed(
            "too many pieces to fit in one info block".into(),
        ));
    }
    block[..body.len()].copy_from_slice(&body);
    block[body.len()..body.len() + CRC_LEN].copy_from_slice(&crc.to_be_bytes());

    Ok(block)
}
