use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use cfg_if::cfg_if;

use crate::address::Address;
use crate::transport::{Driver, Transport};
use crate::{Error, TransportKind};

cfg_if! {
    if #[cfg(target_os = "windows")] {
        const UNAVAILABLE: &str = "the ActiveDSO control is not registered on this system";
    } else {
        const UNAVAILABLE: &str = "the ActiveDSO control is only available on Windows";
    }
}

/// Driver for resources routed through the vendor ActiveDSO control.
///
/// The control itself is not part of this crate, so opening always fails. Failing at
/// `open` means a session is never bound to a connection that cannot work.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActiveDsoDriver;

#[async_trait]
impl Driver for ActiveDsoDriver {
    fn kind(&self) -> TransportKind {
        TransportKind::ActiveDso
    }

    async fn open(&self, addr: &Address, _timeout: Duration) -> crate::Result<Box<dyn Transport>> {
        log::debug!("Refusing to open `{}`: {}", addr, UNAVAILABLE);
        Err(Error::connection(anyhow!("Cannot open `{}`: {}", addr, UNAVAILABLE)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_fails_with_connection_error() {
        let addr = Address::parse("ACTIVEDSO::VXI11:127.0.0.1").unwrap();
        let ret = ActiveDsoDriver.open(&addr, Duration::from_secs(1)).await;
        match ret {
            Err(Error::Connection(_)) => {}
            _ => panic!(),
        }
    }
}
