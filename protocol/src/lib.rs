//! Transport independent data model of the dsolink oscilloscope session: errors, binary
//! block framing, numeric decoding and the request/response types.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

pub mod block;
pub mod error;
pub mod numeric;
pub mod status;
mod util;

pub use crate::block::{decode_block, encode_block, parse_block_header, BinaryBlock, BlockHeader};
pub use crate::error::{Error, TransportError};
pub use crate::numeric::{decode_ascii, decode_numeric, Endianness, NumericScheme};
pub use crate::status::{ErrorRecord, Identity, NO_ERROR};

pub type Result<T> = std::result::Result<T, Error>;

/// The physical link carrying the bytes to the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Vicp,
    Vxi11,
    Usbtmc,
    Gpib,
    ActiveDso,
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Vicp => "VICP",
            TransportKind::Vxi11 => "VXI-11",
            TransportKind::Usbtmc => "USBTMC",
            TransportKind::Gpib => "GPIB",
            TransportKind::ActiveDso => "ActiveDSO",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ScpiRequest {
    Write(String),
    WriteBlock {
        header: String,
        #[serde(
            serialize_with = "crate::util::to_base64",
            deserialize_with = "crate::util::from_base64"
        )]
        data: Vec<u8>,
    },
    QueryString(String),
    QueryBinary {
        query: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        byte_count_hint: Option<usize>,
    },
    ReadRaw {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        max_bytes: Option<usize>,
    },
}

impl ScpiRequest {
    pub fn expects_response(&self) -> bool {
        !matches!(self, ScpiRequest::Write(_) | ScpiRequest::WriteBlock { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScpiResponse {
    Done,
    String(String),
    Binary {
        #[serde(
            serialize_with = "crate::util::to_base64",
            deserialize_with = "crate::util::from_base64"
        )]
        data: Vec<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_response_as_base64() {
        let resp = ScpiResponse::Binary {
            data: vec![0, 1, 2, 255],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"Binary":{"data":"AAEC/w=="}}"#);
        let back: ScpiResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn request_response_flag() {
        assert!(!ScpiRequest::Write("*CLS".to_string()).expects_response());
        assert!(ScpiRequest::QueryString("*IDN?".to_string()).expects_response());
        let req: ScpiRequest = serde_json::from_str(r#"{"QueryBinary":{"query":"C1:WF?"}}"#).unwrap();
        match req {
            ScpiRequest::QueryBinary { query, byte_count_hint } => {
                assert_eq!(query, "C1:WF?");
                assert_eq!(byte_count_hint, None);
            }
            _ => panic!(),
        }
    }
}
