//! Parsing of the status replies every oscilloscope session relies on: error queue entries
//! and the `*IDN?` identification string.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Code reported by the error query once the error queue is empty.
pub const NO_ERROR: i32 = 0;

/// One entry of the instrument's error queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: i32,
    pub message: String,
}

impl ErrorRecord {
    pub fn new<T: Into<String>>(code: i32, message: T) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_error() -> Self {
        Self::new(NO_ERROR, "No error")
    }

    pub fn is_no_error(&self) -> bool {
        self.code == NO_ERROR
    }

    /// Parse a reply to an error query.
    ///
    /// Accepts `<code>`, `<code>,<text>` and `<code>,"<text>"`. A leading header word as
    /// sent with command headers enabled (`CMR 13`) is skipped.
    pub fn parse(reply: &str) -> crate::Result<Self> {
        let reply = reply.trim();
        let (code, message) = match reply.split_once(',') {
            Some((code, message)) => (code, message),
            None => (reply, ""),
        };
        let code = code
            .split_whitespace()
            .last()
            .ok_or_else(|| Error::format(format!("Empty error query reply: `{}`", reply)))?;
        let code: i32 = code
            .parse()
            .map_err(|_| Error::format(format!("Invalid error code in reply: `{}`", reply)))?;
        let message = message.trim().trim_matches('"').to_string();
        Ok(Self { code, message })
    }
}

impl Display for ErrorRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// The identification of an instrument as returned by `*IDN?`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub raw: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_version: String,
}

impl Identity {
    pub fn parse(idn: &str) -> crate::Result<Self> {
        let raw = idn.trim();
        let fields: Vec<_> = raw.splitn(4, ',').map(|x| x.trim().to_string()).collect();
        if fields.len() != 4 {
            return Err(Error::format(format!(
                "Identification needs 4 comma separated fields: `{}`",
                raw
            )));
        }
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        Ok(Self {
            raw: raw.to_string(),
            manufacturer: next(),
            model: next(),
            serial_number: next(),
            firmware_version: next(),
        })
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scpi_error() {
        let record = ErrorRecord::parse("-113,\"Undefined header\"\n").unwrap();
        assert_eq!(record.code, -113);
        assert_eq!(record.message, "Undefined header");
        assert!(!record.is_no_error());
    }

    #[test]
    fn parse_code_only() {
        let record = ErrorRecord::parse("0").unwrap();
        assert!(record.is_no_error());
        assert_eq!(record.message, "");

        let record = ErrorRecord::parse("CMR 13").unwrap();
        assert_eq!(record.code, 13);
    }

    #[test]
    fn parse_garbage() {
        assert!(matches!(ErrorRecord::parse("WARNING"), Err(Error::Format(_))));
        assert!(matches!(ErrorRecord::parse(""), Err(Error::Format(_))));
    }

    #[test]
    fn parse_identity() {
        let idn = Identity::parse("LECROY,DDA804ZI,LCRY0401N22234,9.6.0").unwrap();
        assert_eq!(idn.manufacturer, "LECROY");
        assert_eq!(idn.model, "DDA804ZI");
        assert_eq!(idn.serial_number, "LCRY0401N22234");
        assert_eq!(idn.firmware_version, "9.6.0");
        assert_eq!(idn.to_string(), "LECROY,DDA804ZI,LCRY0401N22234,9.6.0");

        assert!(Identity::parse("LECROY,DDA804ZI").is_err());
    }
}
