//! The transport capability interface. Every physical link (VXI-11, VICP, USBTMC, ...)
//! is reduced to a byte pipe with end-of-message signalling, a timeout and a clear.

use std::time::Duration;

use async_trait::async_trait;

use crate::address::Address;
use crate::TransportKind;

pub mod activedso;
pub mod mock;
pub mod vxi;

pub use activedso::ActiveDsoDriver;
pub use mock::{MockDriver, MockInstrument, MockTransport, Reply};
pub use vxi::{VxiDriver, VxiTransport};

/// The result of a single read on a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadChunk {
    pub data: Vec<u8>,
    /// The transport signalled end-of-message (EOI/END) with this chunk.
    pub end: bool,
}

impl ReadChunk {
    pub fn new(data: Vec<u8>, end: bool) -> Self {
        Self { data, end }
    }
}

#[async_trait]
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// The resource string this transport was opened with.
    fn resource(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Write `data`, returning the number of bytes accepted. May be less than `data.len()`.
    async fn write(&mut self, data: &[u8]) -> crate::Result<usize>;

    /// Read at most `max_bytes` (or whatever the transport delivers if `None`).
    /// May return fewer bytes than requested.
    async fn read(&mut self, max_bytes: Option<usize>) -> crate::Result<ReadChunk>;

    /// Device clear: discard pending input and output on both ends.
    async fn clear(&mut self) -> crate::Result<()>;

    /// Close the connection. Closing a closed transport is a no-op.
    async fn close(&mut self) -> crate::Result<()>;

    fn timeout(&self) -> Duration;

    fn set_timeout(&mut self, timeout: Duration);

    /// Largest number of bytes moved by a single `write` or `read`.
    fn max_transfer_size(&self) -> usize;
}

/// Opens transports of one kind.
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Open a connection to `addr`. Fails with `Error::Connection` if the instrument
    /// cannot be reached or the transport is not available on this platform.
    async fn open(&self, addr: &Address, timeout: Duration) -> crate::Result<Box<dyn Transport>>;
}
