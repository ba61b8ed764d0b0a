//! The instrument session: oscilloscope level operations on top of a transport.
//!
//! A session owns exactly one transport and runs one operation at a time. Operations
//! take the connection lock, which either waits or fails with `Error::SessionBusy`
//! depending on `BusyPolicy`. `close()` and `device_clear()` abort a running operation
//! without waiting for the transport timeout.
//!
//! The `*_with` variants take `CallOptions` to override the transport timeout or the
//! query delay for one call.

use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::Instant;
use uuid::Uuid;

use crate::address::Address;
use crate::config::{BusyPolicy, SessionConfig};
use crate::discovery::Discovery;
use crate::link::{wait_closed, Link};
use crate::policy::{drain, escalate, ErrorPoll};
use crate::transport::{Driver, Transport};
use crate::{BinaryBlock, Error, ErrorRecord, Identity, NumericScheme, ScpiRequest, ScpiResponse};

/// Appended by the instrument to transferred files.
pub const FILE_MARKER: &[u8] = b"ffffffff";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Unbound,
    Bound,
    Busy,
    Closed,
}

/// Per call overrides of the session settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Transport timeout in place of the session timeout.
    pub timeout: Option<Duration>,
    /// Pause between sending a query and reading the response, in place of the
    /// configured query delay.
    pub query_delay: Option<Duration>,
}

impl CallOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn query_delay(mut self, query_delay: Duration) -> Self {
        self.query_delay = Some(query_delay);
        self
    }
}

/// Where the connection came from, so it can be opened again.
struct Origin {
    addr: Address,
    driver: Arc<dyn Driver>,
}

struct Inner {
    transport: Option<Box<dyn Transport>>,
    origin: Option<Origin>,
}

struct Status {
    state: SessionState,
    timeout: Duration,
    identity: Option<Identity>,
    history: Vec<ErrorRecord>,
    last_fault: Option<Error>,
    operation_complete: bool,
}

pub struct Session {
    id: Uuid,
    config: SessionConfig,
    inner: Mutex<Inner>,
    status: StdMutex<Status>,
    closed_tx: watch::Sender<bool>,
    closed: watch::Receiver<bool>,
    interrupt_tx: watch::Sender<u64>,
    interrupt: watch::Receiver<u64>,
}

/// Holds the connection lock while an operation runs.
struct Operation<'s> {
    session: &'s Session,
    inner: MutexGuard<'s, Inner>,
    generation: u64,
    busy: bool,
}

impl<'s> Operation<'s> {
    fn link(&mut self) -> crate::Result<Link<'_>> {
        let session = self.session;
        let transport = self.inner.transport.as_mut().ok_or(Error::NotBound)?;
        Ok(Link::new(
            transport,
            session.closed.clone(),
            session.interrupt.clone(),
            self.generation,
            &session.config.terminator,
            session.config.max_response_len,
        ))
    }
}

impl<'s> Drop for Operation<'s> {
    fn drop(&mut self) {
        if self.busy {
            let mut status = self.session.status.lock().unwrap();
            if status.state == SessionState::Busy {
                status.state = SessionState::Bound;
            }
        }
    }
}

impl Session {
    fn build(config: SessionConfig, transport: Option<Box<dyn Transport>>, origin: Option<Origin>) -> Self {
        let state = if transport.is_some() {
            SessionState::Bound
        } else {
            SessionState::Unbound
        };
        let (closed_tx, closed) = watch::channel(false);
        let (interrupt_tx, interrupt) = watch::channel(0);
        let ret = Self {
            id: Uuid::new_v4(),
            status: StdMutex::new(Status {
                state,
                timeout: config.timeout(),
                identity: None,
                history: Vec::new(),
                last_fault: None,
                operation_complete: false,
            }),
            config,
            inner: Mutex::new(Inner { transport, origin }),
            closed_tx,
            closed,
            interrupt_tx,
            interrupt,
        };
        log::debug!("[{}] New session ({:?})", ret.id, state);
        ret
    }

    /// A session without connection, see `bind()`.
    pub fn new(config: SessionConfig) -> Self {
        Self::build(config, None, None)
    }

    pub fn with_transport(mut transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        transport.set_timeout(config.timeout());
        Self::build(config, Some(transport), None)
    }

    /// Open `resource` using a driver registered with `discovery`. The session remembers
    /// the driver, see `reconnect()`.
    pub async fn open(discovery: &Discovery, resource: &str, config: SessionConfig) -> crate::Result<Self> {
        let (addr, driver) = discovery.resolve(resource)?;
        log::debug!("Opening `{}` using the {} driver", addr, driver.kind());
        let mut transport = driver.open(&addr, config.timeout()).await?;
        transport.set_timeout(config.timeout());
        let ret = Self::build(config, Some(transport), Some(Origin { addr, driver }));
        log::debug!("[{}] Opened `{}`", ret.id, resource);
        Ok(ret)
    }

    pub async fn bind(&self, mut transport: Box<dyn Transport>) -> crate::Result<()> {
        let inner = self.lock(BusyPolicy::Block).await?;
        let mut op = self.operation(inner);
        if op.inner.transport.is_some() {
            return Err(Error::argument(anyhow!("Session is already bound to a connection")));
        }
        transport.set_timeout(self.timeout());
        log::debug!("[{}] Bound to `{}`", self.id, transport.resource());
        op.inner.transport = Some(transport);
        self.set_state(SessionState::Bound);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.status.lock().unwrap().state
    }

    pub fn timeout(&self) -> Duration {
        self.status.lock().unwrap().timeout
    }

    pub async fn set_timeout(&self, timeout: Duration) -> crate::Result<()> {
        let mut op = self.acquire().await?;
        self.status.lock().unwrap().timeout = timeout;
        if let Some(transport) = op.inner.transport.as_mut() {
            transport.set_timeout(timeout);
        }
        Ok(())
    }

    /// The most recent error reported by the instrument.
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.status.lock().unwrap().history.last().cloned()
    }

    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.status.lock().unwrap().history.clone()
    }

    pub fn take_error_history(&self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.status.lock().unwrap().history)
    }

    /// The most recent transport fault.
    pub fn last_fault(&self) -> Option<Error> {
        self.status.lock().unwrap().last_fault.clone()
    }

    /// Whether the last operation-complete wait succeeded.
    pub fn is_operation_complete(&self) -> bool {
        self.status.lock().unwrap().operation_complete
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.status.lock().unwrap().state = state;
    }

    async fn acquire(&self) -> crate::Result<Operation<'_>> {
        self.acquire_with(self.config.busy_policy).await
    }

    /// Take the connection lock for an operation. An operation still waiting for the
    /// lock when a device clear is requested fails with `Error::Cleared`.
    async fn acquire_with(&self, policy: BusyPolicy) -> crate::Result<Operation<'_>> {
        let generation = *self.interrupt.borrow();
        let inner = self.lock(policy).await?;
        if *self.interrupt.borrow() != generation {
            return Err(Error::Cleared);
        }
        Ok(self.operation(inner))
    }

    async fn lock(&self, policy: BusyPolicy) -> crate::Result<MutexGuard<'_, Inner>> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let inner = match policy {
            BusyPolicy::Fail => self.inner.try_lock().map_err(|_| Error::SessionBusy)?,
            BusyPolicy::Block => {
                let mut closed = self.closed.clone();
                tokio::select! {
                    inner = self.inner.lock() => inner,
                    _ = wait_closed(&mut closed) => return Err(Error::SessionClosed),
                }
            }
        };
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(inner)
    }

    fn operation<'s>(&'s self, inner: MutexGuard<'s, Inner>) -> Operation<'s> {
        let generation = *self.interrupt.borrow();
        let busy = {
            let mut status = self.status.lock().unwrap();
            if status.state == SessionState::Bound {
                status.state = SessionState::Busy;
                true
            } else {
                false
            }
        };
        Operation {
            session: self,
            inner,
            generation,
            busy,
        }
    }

    fn query_delay(&self, options: &CallOptions) -> Duration {
        options.query_delay.unwrap_or_else(|| self.config.query_delay())
    }

    fn record<T>(&self, ret: crate::Result<T>) -> crate::Result<T> {
        if let Err(err) = &ret {
            if err.is_transport_fault() {
                log::debug!("[{}] Transport fault: {}", self.id, err);
                self.status.lock().unwrap().last_fault = Some(err.clone());
            }
        }
        ret
    }

    fn push_errors(&self, poll: &ErrorPoll) {
        if poll.records.is_empty() {
            return;
        }
        for record in &poll.records {
            log::debug!("[{}] Instrument reported error {}", self.id, record);
        }
        let mut status = self.status.lock().unwrap();
        status.history.extend(poll.records.iter().cloned());
    }

    /// Applies the configured synchronisation and error polling after a successful call.
    async fn finish<T>(&self, link: &mut Link<'_>, ret: crate::Result<T>) -> crate::Result<T> {
        let ret = self.record(ret)?;
        if self.config.insert_wait_opc {
            self.record(self.wait_opc(link, self.timeout()).await)?;
        }
        if self.config.errors.polls_after_operation() {
            let poll = self.record(drain(link, &self.config.errors).await)?;
            self.push_errors(&poll);
            escalate(&poll, &self.config.errors)?;
        }
        Ok(ret)
    }

    pub async fn send_command(&self, text: &str) -> crate::Result<()> {
        self.send_command_with(text, CallOptions::default()).await
    }

    pub async fn send_command_with(&self, text: &str, options: CallOptions) -> crate::Result<()> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        if let Some(timeout) = options.timeout {
            link.shadow_timeout(timeout);
        }
        log::debug!("[{}] > {}", self.id, text);
        let ret = link.write_message(text.as_bytes()).await;
        link.restore_timeout();
        self.finish(&mut link, ret).await
    }

    /// Send `header` followed by `data` framed as a definite length block.
    pub async fn send_command_block(&self, header: &str, data: &[u8]) -> crate::Result<()> {
        self.send_command_block_with(header, data, CallOptions::default()).await
    }

    pub async fn send_command_block_with(&self, header: &str, data: &[u8], options: CallOptions) -> crate::Result<()> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        if let Some(timeout) = options.timeout {
            link.shadow_timeout(timeout);
        }
        log::debug!("[{}] > {}<{} bytes>", self.id, header, data.len());
        let ret = link.write_block(header, data).await;
        link.restore_timeout();
        self.finish(&mut link, ret).await
    }

    pub async fn send_query(&self, text: &str) -> crate::Result<String> {
        self.send_query_with(text, CallOptions::default()).await
    }

    /// Like `send_query()` but with `timeout` in place of the session timeout.
    pub async fn send_query_timeout(&self, text: &str, timeout: Duration) -> crate::Result<String> {
        self.send_query_with(text, CallOptions::default().timeout(timeout)).await
    }

    pub async fn send_query_with(&self, text: &str, options: CallOptions) -> crate::Result<String> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        if let Some(timeout) = options.timeout {
            link.shadow_timeout(timeout);
        }
        log::debug!("[{}] > {}", self.id, text);
        let ret = link.query_text_after(text, self.query_delay(&options)).await;
        link.restore_timeout();
        if let Ok(answer) = &ret {
            log::debug!("[{}] < {}", self.id, answer);
        }
        self.finish(&mut link, ret).await
    }

    /// Query a binary block. `byte_count_hint` sizes the first read.
    pub async fn send_query_block(&self, text: &str, byte_count_hint: Option<usize>) -> crate::Result<BinaryBlock> {
        self.send_query_block_with(text, byte_count_hint, CallOptions::default())
            .await
    }

    pub async fn send_query_block_with(
        &self,
        text: &str,
        byte_count_hint: Option<usize>,
        options: CallOptions,
    ) -> crate::Result<BinaryBlock> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        if let Some(timeout) = options.timeout {
            link.shadow_timeout(timeout);
        }
        log::debug!("[{}] > {}", self.id, text);
        let ret = link
            .query_block(text, byte_count_hint, self.query_delay(&options))
            .await;
        link.restore_timeout();
        if let Ok(block) = &ret {
            log::debug!("[{}] < <{} bytes>", self.id, block.data.len());
        }
        self.finish(&mut link, ret).await
    }

    /// Query a waveform block and decode it with the session's byte order.
    pub async fn query_waveform(&self, text: &str, scheme: NumericScheme) -> crate::Result<Vec<f64>> {
        self.query_waveform_with(text, scheme, CallOptions::default()).await
    }

    pub async fn query_waveform_with(
        &self,
        text: &str,
        scheme: NumericScheme,
        options: CallOptions,
    ) -> crate::Result<Vec<f64>> {
        let block = self.send_query_block_with(text, None, options).await?;
        block.decode(scheme, self.config.endianness)
    }

    /// A single transport read, neither synchronised nor followed by an error poll.
    pub async fn read_raw(&self, max_bytes: Option<usize>) -> crate::Result<Vec<u8>> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        let max_bytes = max_bytes.unwrap_or(self.config.max_response_len);
        let ret = link.read(Some(max_bytes)).await.map(|x| x.data);
        self.record(ret)
    }

    /// Write `data` as is, followed by the terminator if `terminator` is set.
    pub async fn write_raw(&self, data: &[u8], terminator: bool) -> crate::Result<()> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        let ret = if terminator {
            let mut msg = data.to_vec();
            msg.extend_from_slice(self.config.terminator.as_bytes());
            link.write_all(&msg).await
        } else {
            link.write_all(data).await
        };
        self.record(ret)
    }

    pub async fn request(&self, req: ScpiRequest) -> crate::Result<ScpiResponse> {
        match req {
            ScpiRequest::Write(text) => self.send_command(&text).await.map(|_| ScpiResponse::Done),
            ScpiRequest::WriteBlock { header, data } => self
                .send_command_block(&header, &data)
                .await
                .map(|_| ScpiResponse::Done),
            ScpiRequest::QueryString(text) => self.send_query(&text).await.map(ScpiResponse::String),
            ScpiRequest::QueryBinary { query, byte_count_hint } => {
                let block = self.send_query_block(&query, byte_count_hint).await?;
                Ok(ScpiResponse::Binary {
                    data: block.into_data(),
                })
            }
            ScpiRequest::ReadRaw { max_bytes } => {
                let data = self.read_raw(max_bytes).await?;
                Ok(ScpiResponse::Binary { data })
            }
        }
    }

    /// The instrument's identification, queried once and cached.
    pub async fn identify(&self) -> crate::Result<Identity> {
        let cached = self.status.lock().unwrap().identity.clone();
        if let Some(identity) = cached {
            return Ok(identity);
        }
        let answer = self.send_query(&self.config.commands.identify).await?;
        let identity = Identity::parse(&answer)?;
        self.status.lock().unwrap().identity = Some(identity.clone());
        Ok(identity)
    }

    /// Read the instrument setup as an opaque binary payload.
    pub async fn get_panel(&self) -> crate::Result<Vec<u8>> {
        self.get_panel_with(CallOptions::default()).await
    }

    pub async fn get_panel_with(&self, options: CallOptions) -> crate::Result<Vec<u8>> {
        let block = self
            .send_query_block_with(&self.config.commands.panel_query, None, options)
            .await?;
        Ok(block.into_data())
    }

    /// Restore a setup previously read with `get_panel()`.
    pub async fn set_panel(&self, panel: &[u8]) -> crate::Result<()> {
        self.set_panel_with(panel, CallOptions::default()).await
    }

    pub async fn set_panel_with(&self, panel: &[u8], options: CallOptions) -> crate::Result<()> {
        let header = format!("{} ", self.config.commands.panel_command);
        self.send_command_block_with(&header, panel, options).await
    }

    /// Run `command` in the instrument's automation interpreter.
    pub async fn send_vbs_command(&self, command: &str) -> crate::Result<()> {
        self.send_command(&format!("vbs '{}'", command)).await
    }

    /// Evaluate `expression` in the instrument's automation interpreter.
    pub async fn send_vbs_query(&self, expression: &str) -> crate::Result<String> {
        self.send_vbs_query_with(expression, CallOptions::default()).await
    }

    pub async fn send_vbs_query_with(&self, expression: &str, options: CallOptions) -> crate::Result<String> {
        self.send_query_with(&format!("vbs? 'Return = {}'", expression), options)
            .await
    }

    /// Copy the local file `local` to `remote` on the instrument's `device` (e.g. `HDD`).
    pub async fn transfer_file_to_dso<P: AsRef<Path>>(&self, device: &str, remote: &str, local: P) -> crate::Result<()> {
        let local = local.as_ref();
        let mut data = tokio::fs::read(local)
            .await
            .map_err(|err| Error::argument(anyhow!("Cannot read `{}`: {}", local.display(), err)))?;
        data.extend_from_slice(FILE_MARKER);
        let header = format!("TRFL DISK,{},FILE,\"{}\",", device, remote);
        self.send_command_block(&header, &data).await
    }

    /// Copy `remote` on the instrument's `device` to the local file `local`. Returns the
    /// number of bytes written.
    pub async fn transfer_file_to_pc<P: AsRef<Path>>(&self, device: &str, remote: &str, local: P) -> crate::Result<usize> {
        let header = format!("TRFL? DISK,{},FILE,\"{}\"", device, remote);
        let mut data = self.send_query_block(&header, None).await?.into_data();
        if data.ends_with(FILE_MARKER) {
            data.truncate(data.len() - FILE_MARKER.len());
        }
        let local = local.as_ref();
        tokio::fs::write(local, &data)
            .await
            .map_err(|err| Error::argument(anyhow!("Cannot write `{}`: {}", local.display(), err)))?;
        Ok(data.len())
    }

    /// Drain the instrument's error queue. Never fails because of reported errors.
    pub async fn poll_errors(&self) -> crate::Result<ErrorPoll> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        let poll = self.record(drain(&mut link, &self.config.errors).await)?;
        self.push_errors(&poll);
        Ok(poll)
    }

    /// Poll the operation-complete query until the instrument reports completion.
    pub async fn wait_for_operation_complete(&self, timeout: Duration) -> crate::Result<()> {
        let mut op = self.acquire().await?;
        let mut link = op.link()?;
        let ret = self.wait_opc(&mut link, timeout).await;
        self.record(ret)
    }

    async fn wait_opc(&self, link: &mut Link<'_>, timeout: Duration) -> crate::Result<()> {
        let deadline = Instant::now() + timeout;
        let poll_interval = self.config.poll_interval();
        self.status.lock().unwrap().operation_complete = false;
        let ret = loop {
            let now = Instant::now();
            if now >= deadline {
                break Err(Error::OperationTimeout(timeout));
            }
            link.shadow_timeout(deadline - now);
            match link.query_text(&self.config.commands.operation_complete).await {
                Ok(answer) if answer.split_whitespace().last() == Some("1") => break Ok(()),
                Ok(answer) => log::debug!("[{}] Operation pending: {}", self.id, answer),
                Err(Error::Timeout) => break Err(Error::OperationTimeout(timeout)),
                Err(err) => break Err(err),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::from_secs(0) {
                break Err(Error::OperationTimeout(timeout));
            }
            if let Err(err) = link.pause(poll_interval.min(remaining)).await {
                break Err(err);
            }
        };
        link.restore_timeout();
        match ret {
            Ok(()) => {
                self.status.lock().unwrap().operation_complete = true;
                Ok(())
            }
            Err(Error::OperationTimeout(timeout)) => {
                // a late reply must not be read as the answer to the next query
                log::warn!("[{}] Operation did not complete within {:?}", self.id, timeout);
                if let Err(err) = link.clear().await {
                    log::warn!("[{}] Device clear after operation timeout failed: {}", self.id, err);
                }
                Err(Error::OperationTimeout(timeout))
            }
            Err(err) => Err(err),
        }
    }

    /// Abort the running operation and clear the transport buffers.
    ///
    /// If the transport cannot be cleared, the connection is closed and the session
    /// transitions to `Closed`.
    pub async fn device_clear(&self) -> crate::Result<()> {
        let generation = self.interrupt.borrow().wrapping_add(1);
        let _ = self.interrupt_tx.send(generation);
        let inner = self.lock(BusyPolicy::Block).await?;
        let mut op = self.operation(inner);
        let ret = match op.link() {
            Ok(mut link) => link.clear().await,
            Err(err) => return Err(err),
        };
        match ret {
            Ok(()) => {
                log::debug!("[{}] Device cleared", self.id);
                self.status.lock().unwrap().operation_complete = false;
                Ok(())
            }
            Err(err) => {
                log::warn!("[{}] Device clear failed, closing connection: {}", self.id, err);
                let _ = self.closed_tx.send(true);
                if let Some(mut transport) = op.inner.transport.take() {
                    if let Err(err) = transport.close().await {
                        log::warn!("[{}] Failed to close `{}`: {}", self.id, transport.resource(), err);
                    }
                }
                let mut status = self.status.lock().unwrap();
                status.state = SessionState::Closed;
                status.last_fault = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Close the connection and open it again through the driver the session was opened
    /// with. Waits for a running operation to finish.
    ///
    /// If the connection cannot be opened the session is left unbound, a later call may
    /// try again.
    pub async fn reconnect(&self) -> crate::Result<()> {
        let inner = self.lock(BusyPolicy::Block).await?;
        let mut op = self.operation(inner);
        let (addr, driver) = match &op.inner.origin {
            Some(origin) => (origin.addr.clone(), origin.driver.clone()),
            None => {
                return Err(Error::connection(anyhow!(
                    "Session was not opened through a driver, cannot reconnect"
                )))
            }
        };
        if let Some(mut transport) = op.inner.transport.take() {
            log::debug!("[{}] Closing `{}` to reconnect", self.id, transport.resource());
            if let Err(err) = transport.close().await {
                log::warn!("[{}] Failed to close `{}`: {}", self.id, transport.resource(), err);
            }
        }
        self.status.lock().unwrap().identity = None;
        let timeout = self.timeout();
        let mut closed = self.closed.clone();
        let opened = tokio::select! {
            ret = driver.open(&addr, timeout) => ret,
            _ = wait_closed(&mut closed) => Err(Error::SessionClosed),
        };
        match opened {
            Ok(mut transport) => {
                transport.set_timeout(timeout);
                log::debug!("[{}] Reconnected to `{}`", self.id, addr);
                op.inner.transport = Some(transport);
                op.busy = false;
                self.set_state(SessionState::Bound);
                Ok(())
            }
            Err(err) => {
                log::warn!("[{}] Reconnecting to `{}` failed: {}", self.id, addr, err);
                op.busy = false;
                let mut status = self.status.lock().unwrap();
                if status.state != SessionState::Closed {
                    status.state = SessionState::Unbound;
                }
                if err.is_transport_fault() {
                    status.last_fault = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Close the session. Running operations fail with `Error::SessionClosed`, so do all
    /// operations started later. Closing a closed session does nothing.
    pub async fn close(&self) -> crate::Result<()> {
        let _ = self.closed_tx.send(true);
        let mut inner = self.inner.lock().await;
        let transport = inner.transport.take();
        self.set_state(SessionState::Closed);
        match transport {
            Some(mut transport) => {
                log::debug!("[{}] Closing `{}`", self.id, transport.resource());
                let timeout = transport.timeout();
                match tokio::time::timeout(timeout, transport.close()).await {
                    Ok(ret) => ret,
                    Err(_) => Err(Error::Timeout),
                }
            }
            None => Ok(()),
        }
    }
}
