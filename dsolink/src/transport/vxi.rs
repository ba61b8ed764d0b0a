use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use async_vxi11::CoreClient;
use tokio::time::sleep;

use crate::address::Address;
use crate::transport::{Driver, ReadChunk, Transport};
use crate::{Error, TransportKind};

const MAX_TRANSFER_SIZE: usize = 1024 * 1024;
const RECONNECT_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, Default)]
pub struct VxiDriver;

#[async_trait]
impl Driver for VxiDriver {
    fn kind(&self) -> TransportKind {
        TransportKind::Vxi11
    }

    async fn open(&self, addr: &Address, timeout: Duration) -> crate::Result<Box<dyn Transport>> {
        let host = match addr {
            Address::Vxi11 { host, .. } => host,
            _ => {
                return Err(Error::argument(anyhow!(
                    "Not a VXI-11 resource: `{}`",
                    addr
                )))
            }
        };
        let ip = resolve(host)?;
        let mut ret = VxiTransport::new(ip, addr.to_string(), timeout);
        ret.connect().await?;
        Ok(Box::new(ret))
    }
}

fn resolve(host: &str) -> crate::Result<IpAddr> {
    let format_addr = format!("{}:111", host).to_socket_addrs();
    let mut iter = format_addr.map_err(Error::connection)?;
    if let Some(x) = iter.next() {
        Ok(x.ip())
    } else {
        Err(Error::connection(anyhow!("Cannot resolve host: {:?}", host)))
    }
}

/// A VXI-11 link, delegating the RPC protocol to `async-vxi11`.
///
/// A VXI-11 `device_read` always returns a complete message. If the caller asks for
/// fewer bytes, the rest is kept and handed out by subsequent reads.
pub struct VxiTransport {
    addr: IpAddr,
    resource: String,
    client: Option<CoreClient>,
    pending: Vec<u8>,
    timeout: Duration,
}

impl VxiTransport {
    pub fn new(addr: IpAddr, resource: String, timeout: Duration) -> Self {
        Self {
            addr,
            resource,
            client: None,
            pending: Vec::new(),
            timeout,
        }
    }

    async fn connect(&mut self) -> crate::Result<()> {
        let fut = CoreClient::connect(self.addr);
        let ret = tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::connection(anyhow!("Timeout connecting to `{}`", self.resource)))?;
        let client = ret.map_err(|err| match map_error(err) {
            Error::Io(x) => Error::Connection(x),
            x => x,
        })?;
        log::debug!("Connected to `{}`", self.resource);
        self.client.replace(client);
        Ok(())
    }

    fn client(&mut self) -> crate::Result<&mut CoreClient> {
        let resource = &self.resource;
        self.client.as_mut().ok_or_else(|| {
            Error::io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("`{}` is closed", resource),
            ))
        })
    }

    fn take_pending(&mut self, max_bytes: Option<usize>) -> ReadChunk {
        let n = max_bytes.unwrap_or(self.pending.len()).min(self.pending.len());
        let data: Vec<u8> = self.pending.drain(..n).collect();
        ReadChunk::new(data, self.pending.is_empty())
    }
}

#[async_trait]
impl Transport for VxiTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Vxi11
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        let ret = self.client()?.device_write(data.to_vec()).await.map_err(map_error);
        match ret {
            Ok(_) => Ok(data.len()),
            Err(err) if err.should_retry() => {
                log::debug!("Write to `{}` failed, reconnecting: {}", self.resource, err);
                self.client.take();
                sleep(RECONNECT_DELAY).await;
                self.connect().await?;
                self.client()?.device_write(data.to_vec()).await.map_err(map_error)?;
                Ok(data.len())
            }
            Err(err) => Err(err),
        }
    }

    async fn read(&mut self, max_bytes: Option<usize>) -> crate::Result<ReadChunk> {
        if self.pending.is_empty() {
            let data = self.client()?.device_read().await.map_err(map_error)?;
            self.pending = data;
        }
        Ok(self.take_pending(max_bytes))
    }

    async fn clear(&mut self) -> crate::Result<()> {
        // async-vxi11 exposes no device_clear, a fresh link drops anything in flight
        self.pending.clear();
        self.client.take();
        self.connect().await
    }

    async fn close(&mut self) -> crate::Result<()> {
        self.pending.clear();
        if self.client.take().is_some() {
            log::debug!("Closed `{}`", self.resource);
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn max_transfer_size(&self) -> usize {
        MAX_TRANSFER_SIZE
    }
}

fn map_error(err: async_vxi11::Error) -> Error {
    match err {
        async_vxi11::Error::Io(io) => Error::io(io),
        err => Error::io(anyhow!(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_rejects_other_addresses() {
        let addr = Address::parse("VICP::127.0.0.1").unwrap();
        let ret = VxiDriver.open(&addr, Duration::from_millis(10)).await;
        match ret {
            Err(Error::Argument(_)) => {}
            _ => panic!(),
        }
    }

    #[test]
    fn partial_reads_drain_pending() {
        let mut transport = VxiTransport::new(
            "127.0.0.1".parse().unwrap(),
            "TCPIP0::127.0.0.1::inst0::INSTR".to_string(),
            Duration::from_secs(1),
        );
        assert!(!transport.is_open());
        transport.pending = b"#15hello\n".to_vec();
        let chunk = transport.take_pending(Some(4));
        assert_eq!(chunk, ReadChunk::new(b"#15h".to_vec(), false));
        let chunk = transport.take_pending(None);
        assert_eq!(chunk, ReadChunk::new(b"ello\n".to_vec(), true));
    }
}
