use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::policy::ErrorPolicy;
use crate::{Endianness, Error};

/// What an operation does if another one is in flight on the same session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the running operation to finish.
    Block,
    /// Fail immediately with `Error::SessionBusy`.
    Fail,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        BusyPolicy::Block
    }
}

/// Command strings the session issues on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    pub identify: String,
    pub operation_complete: String,
    pub panel_query: String,
    pub panel_command: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            identify: "*IDN?".to_string(),
            operation_complete: "*OPC?".to_string(),
            panel_query: "PNSU?".to_string(),
            panel_command: "PNSU".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Pause between sending a query and reading its response.
    pub query_delay_ms: u64,
    pub endianness: Endianness,
    pub busy_policy: BusyPolicy,
    pub errors: ErrorPolicy,
    /// Wait for `*OPC?` after every command and query.
    pub insert_wait_opc: bool,
    pub terminator: String,
    /// Read size requested for text responses.
    pub max_response_len: usize,
    pub commands: Commands,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            poll_interval_ms: 50,
            query_delay_ms: 0,
            endianness: Endianness::default(),
            busy_policy: BusyPolicy::default(),
            errors: ErrorPolicy::default(),
            insert_wait_opc: false,
            terminator: "\n".to_string(),
            max_response_len: 1_000_000,
            commands: Commands::default(),
        }
    }
}

impl SessionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|err| Error::argument(anyhow!("Cannot read `{}`: {}", path.display(), err)))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> crate::Result<Self> {
        let ret: Self = serde_json::from_str(data).map_err(|err| Error::argument(anyhow!("Invalid config: {}", err)))?;
        if ret.terminator.is_empty() {
            return Err(Error::argument(anyhow!("Invalid config: empty terminator")));
        }
        Ok(ret)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_query_delay(mut self, query_delay: Duration) -> Self {
        self.query_delay_ms = query_delay.as_millis() as u64;
        self
    }

    pub fn with_busy_policy(mut self, busy_policy: BusyPolicy) -> Self {
        self.busy_policy = busy_policy;
        self
    }

    pub fn with_errors(mut self, errors: ErrorPolicy) -> Self {
        self.errors = errors;
        self
    }
}
