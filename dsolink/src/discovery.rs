use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use crate::address::Address;
use crate::transport::{ActiveDsoDriver, Driver, Transport, VxiDriver};
use crate::{Error, TransportKind};

/// Maps resource strings to the driver able to open them.
#[derive(Clone)]
pub struct Discovery {
    drivers: HashMap<TransportKind, Arc<dyn Driver>>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Discovery {
    /// A registry with the built-in VXI-11 and ActiveDSO drivers.
    pub fn new() -> Self {
        let mut ret = Self::empty();
        ret.register(Arc::new(VxiDriver));
        ret.register(Arc::new(ActiveDsoDriver));
        ret
    }

    pub fn empty() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register a driver, replacing any driver previously registered for the same kind.
    pub fn register(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(driver.kind(), driver);
        self
    }

    pub fn kinds(&self) -> Vec<TransportKind> {
        self.drivers.keys().cloned().collect()
    }

    pub fn resolve(&self, resource: &str) -> crate::Result<(Address, Arc<dyn Driver>)> {
        let addr = Address::parse(resource)?;
        let kind = addr.kind();
        match self.drivers.get(&kind) {
            Some(driver) => Ok((addr, driver.clone())),
            None => Err(Error::connection(anyhow!(
                "No driver registered for {} resource `{}`",
                kind,
                resource
            ))),
        }
    }

    pub async fn open(&self, resource: &str, timeout: Duration) -> crate::Result<Box<dyn Transport>> {
        let (addr, driver) = self.resolve(resource)?;
        log::debug!("Opening `{}` using the {} driver", addr, driver.kind());
        driver.open(&addr, timeout).await
    }
}
