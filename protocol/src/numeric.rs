use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::Error;

/// How the payload of a binary block is to be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericScheme {
    Ascii,
    Int8,
    Int16,
    Float32,
}

impl NumericScheme {
    /// Width of one element in bytes, `None` for the delimited ASCII representation.
    pub fn width(&self) -> Option<usize> {
        match self {
            NumericScheme::Ascii => None,
            NumericScheme::Int8 => Some(1),
            NumericScheme::Int16 => Some(2),
            NumericScheme::Float32 => Some(4),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ascii" => Some(NumericScheme::Ascii),
            "int8" | "byte" => Some(NumericScheme::Int8),
            "int16" | "word" => Some(NumericScheme::Int16),
            "float32" | "float" => Some(NumericScheme::Float32),
            _ => None,
        }
    }
}

/// Byte order of multi-byte elements in binary transfers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Big
    }
}

pub const ASCII_DELIMITER: char = ',';

/// Decode a block payload into numbers.
pub fn decode_numeric(data: &[u8], scheme: NumericScheme, endianness: Endianness) -> crate::Result<Vec<f64>> {
    let read: fn(&[u8]) -> f64 = match (scheme, endianness) {
        (NumericScheme::Ascii, _) => {
            let text = std::str::from_utf8(data).map_err(|_| Error::format("ASCII data is not valid UTF-8"))?;
            return decode_ascii(text, ASCII_DELIMITER);
        }
        (NumericScheme::Int8, _) => read_i8,
        (NumericScheme::Int16, Endianness::Big) => read_i16::<BigEndian>,
        (NumericScheme::Int16, Endianness::Little) => read_i16::<LittleEndian>,
        (NumericScheme::Float32, Endianness::Big) => read_f32::<BigEndian>,
        (NumericScheme::Float32, Endianness::Little) => read_f32::<LittleEndian>,
    };
    let width = scheme.width().unwrap_or(1);
    if data.len() % width != 0 {
        return Err(Error::framing(format!(
            "{} bytes is not a multiple of the element width {}",
            data.len(),
            width
        )));
    }
    Ok(data.chunks_exact(width).map(read).collect())
}

fn read_i8(x: &[u8]) -> f64 {
    x[0] as i8 as f64
}

fn read_i16<B: ByteOrder>(x: &[u8]) -> f64 {
    B::read_i16(x) as f64
}

fn read_f32<B: ByteOrder>(x: &[u8]) -> f64 {
    B::read_f32(x) as f64
}

/// Split `text` on `delimiter` and parse every token as a float.
pub fn decode_ascii(text: &str, delimiter: char) -> crate::Result<Vec<f64>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(delimiter)
        .map(|token| {
            let token = token.trim();
            token
                .parse::<f64>()
                .map_err(|_| Error::format(format!("Not a number: `{}`", token)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii() {
        let ret = decode_numeric(b"1,2,3", NumericScheme::Ascii, Endianness::Big).unwrap();
        assert_eq!(ret, vec![1.0, 2.0, 3.0]);
        let ret = decode_ascii(" -1.5e-3, 4 ,0\n", ',').unwrap();
        assert_eq!(ret, vec![-1.5e-3, 4.0, 0.0]);
        assert!(decode_ascii("", ',').unwrap().is_empty());
    }

    #[test]
    fn ascii_invalid_token() {
        let ret = decode_numeric(b"1,x,3", NumericScheme::Ascii, Endianness::Big);
        assert!(matches!(ret, Err(Error::Format(_))));
        assert!(matches!(decode_ascii("1,,3", ','), Err(Error::Format(_))));
    }

    #[test]
    fn int8() {
        let ret = decode_numeric(&[0xFF, 0x01, 0x80], NumericScheme::Int8, Endianness::Big).unwrap();
        assert_eq!(ret, vec![-1.0, 1.0, -128.0]);
    }

    #[test]
    fn int16_endianness() {
        let data = [0x01, 0x00, 0xFF, 0xFE];
        let big = decode_numeric(&data, NumericScheme::Int16, Endianness::Big).unwrap();
        assert_eq!(big, vec![256.0, -2.0]);
        let little = decode_numeric(&data, NumericScheme::Int16, Endianness::Little).unwrap();
        assert_eq!(little, vec![1.0, -257.0]);
    }

    #[test]
    fn float32() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5_f32.to_le_bytes());
        data.extend_from_slice(&(-2.25_f32).to_le_bytes());
        let ret = decode_numeric(&data, NumericScheme::Float32, Endianness::Little).unwrap();
        assert_eq!(ret, vec![1.5, -2.25]);
    }

    #[test]
    fn width_mismatch() {
        let ret = decode_numeric(&[1, 2, 3], NumericScheme::Int16, Endianness::Big);
        assert!(matches!(ret, Err(Error::Framing(_))));
        let ret = decode_numeric(&[1, 2, 3, 4, 5], NumericScheme::Float32, Endianness::Big);
        assert!(matches!(ret, Err(Error::Framing(_))));
    }
}
