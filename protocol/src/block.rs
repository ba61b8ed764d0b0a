/// This module implements the IEEE 488.2 definite length binary block used for waveform,
/// panel and file transfers: `#<n><n digits of length><raw bytes>`.
use serde::{Deserialize, Serialize};

use crate::numeric::{decode_numeric, Endianness, NumericScheme};
use crate::Error;

/// Instruments may echo a command header in front of the block, e.g. `C1:WF ALL,#9...`.
pub const MAX_PREFIX_LENGTH: usize = 25;

/// Location of the payload within a response buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Number of bytes in front of the payload, including any response prefix.
    pub offset: usize,
    /// Declared number of payload bytes.
    pub length: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryBlock {
    pub header_len: usize,
    pub declared_len: usize,
    #[serde(
        serialize_with = "crate::util::to_base64",
        deserialize_with = "crate::util::from_base64"
    )]
    pub data: Vec<u8>,
}

impl BinaryBlock {
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Reinterpret the payload as a sequence of numbers.
    pub fn decode(&self, scheme: NumericScheme, endianness: Endianness) -> crate::Result<Vec<f64>> {
        decode_numeric(&self.data, scheme, endianness)
    }
}

/// Frame `data` as a definite length block.
pub fn encode_block(data: &[u8]) -> Vec<u8> {
    let length = data.len().to_string();
    let mut ret = Vec::with_capacity(data.len() + length.len() + 2);
    ret.push(b'#');
    ret.extend_from_slice(length.len().to_string().as_bytes());
    ret.extend_from_slice(length.as_bytes());
    ret.extend_from_slice(data);
    ret
}

/// Parse a block header at the start of `rx`.
///
/// Returns `Ok(None)` if `rx` does not yet contain the complete header.
pub fn parse_block_header(rx: &[u8]) -> crate::Result<Option<BlockHeader>> {
    let searched = &rx[..rx.len().min(MAX_PREFIX_LENGTH + 1)];
    let begin = match searched.iter().position(|x| *x == b'#') {
        Some(begin) => begin,
        None if rx.len() > MAX_PREFIX_LENGTH => {
            return Err(Error::framing(format!(
                "No block header found in `{}`",
                String::from_utf8_lossy(searched)
            )))
        }
        None => return Ok(None),
    };
    let header_length = match rx.get(begin + 1) {
        Some(x @ b'1'..=b'9') => (x - b'0') as usize,
        Some(x) => {
            return Err(Error::framing(format!(
                "Invalid length of length field: `{}`",
                *x as char
            )))
        }
        None => return Ok(None),
    };
    let offset = begin + 2 + header_length;
    if offset > rx.len() {
        return Ok(None);
    }
    let digits = &rx[begin + 2..offset];
    if !digits.iter().all(|x| x.is_ascii_digit()) {
        return Err(Error::framing(format!(
            "Invalid length field: `{}`",
            String::from_utf8_lossy(digits)
        )));
    }
    let length = std::str::from_utf8(digits)
        .ok()
        .and_then(|x| x.parse::<usize>().ok())
        .ok_or_else(|| Error::framing("Block length out of range"))?;
    Ok(Some(BlockHeader { offset, length }))
}

/// Decode a block from a buffer holding the complete response.
pub fn decode_block(rx: &[u8]) -> crate::Result<BinaryBlock> {
    let header = parse_block_header(rx)?
        .ok_or_else(|| Error::framing("Response ended inside the block header"))?;
    let end = header.offset + header.length;
    if end > rx.len() {
        return Err(Error::framing(format!(
            "Block truncated: expected {} bytes, got {}",
            header.length,
            rx.len() - header.offset
        )));
    }
    Ok(BinaryBlock {
        header_len: header.offset,
        declared_len: header.length,
        data: rx[header.offset..end].to_vec(),
    })
}
