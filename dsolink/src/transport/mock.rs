//! A scripted in-memory instrument. Replies are registered per command text, every
//! write is treated as one command message.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::address::Address;
use crate::transport::{Driver, ReadChunk, Transport};
use crate::{encode_block, Error, TransportKind};

const DEFAULT_CHUNK_SIZE: usize = 4096;

/// What the mock instrument sends back after receiving a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// A text response, terminated with `\n`.
    Text(String),
    /// Bytes sent as is.
    Raw(Vec<u8>),
    /// A definite length block followed by `\n`.
    Block(Vec<u8>),
    /// Never respond.
    Silent,
}

impl Reply {
    pub fn text<T: Into<String>>(text: T) -> Self {
        Reply::Text(text.into())
    }

    fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Reply::Text(x) => {
                let mut ret = x.as_bytes().to_vec();
                ret.push(b'\n');
                Some(ret)
            }
            Reply::Raw(x) => Some(x.clone()),
            Reply::Block(x) => {
                let mut ret = encode_block(x);
                ret.push(b'\n');
                Some(ret)
            }
            Reply::Silent => None,
        }
    }
}

struct MockState {
    replies: HashMap<String, VecDeque<Reply>>,
    messages: Vec<Vec<u8>>,
    output: VecDeque<Vec<u8>>,
    chunk_size: usize,
    timeout: Duration,
    clear_count: usize,
    close_count: usize,
    closed: bool,
    fail_clear: bool,
    fail_close: bool,
    refuse: bool,
    open_count: usize,
}

/// Handle to the scripted instrument, shared between the test and its transports.
#[derive(Clone)]
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInstrument {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                replies: HashMap::new(),
                messages: Vec::new(),
                output: VecDeque::new(),
                chunk_size: DEFAULT_CHUNK_SIZE,
                timeout: Duration::from_secs(10),
                clear_count: 0,
                close_count: 0,
                closed: false,
                fail_clear: false,
                fail_close: false,
                refuse: false,
                open_count: 0,
            })),
        }
    }

    /// Answer every occurrence of `command` with `reply`.
    pub fn reply<T: Into<String>>(&self, command: T, reply: Reply) -> &Self {
        self.reply_sequence(command, vec![reply])
    }

    /// Answer successive occurrences of `command` with the given replies, the last one repeats.
    pub fn reply_sequence<T: Into<String>>(&self, command: T, replies: Vec<Reply>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.replies.insert(command.into(), replies.into_iter().collect());
        self
    }

    /// Limit how many bytes a single read returns.
    pub fn set_chunk_size(&self, chunk_size: usize) {
        self.state.lock().unwrap().chunk_size = chunk_size.max(1);
    }

    /// Make the next device clears fail.
    pub fn fail_clear(&self, fail: bool) {
        self.state.lock().unwrap().fail_clear = fail;
    }

    /// Make closing a transport report an error. The transport is closed regardless.
    pub fn fail_close(&self, fail: bool) {
        self.state.lock().unwrap().fail_close = fail;
    }

    /// Make drivers refuse new connections to this instrument.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// How many connections drivers have opened to this instrument.
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open_count
    }

    /// All messages received so far, as sent on the wire.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().messages.clone()
    }

    /// All messages received so far as text, terminator stripped.
    pub fn commands(&self) -> Vec<String> {
        self.messages().iter().map(|x| command_text(x)).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|x| *x == command).count()
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().unwrap().clear_count
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().close_count
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// The timeout most recently configured on a transport.
    pub fn timeout(&self) -> Duration {
        self.state.lock().unwrap().timeout
    }

    pub fn transport<T: Into<String>>(&self, kind: TransportKind, resource: T) -> MockTransport {
        MockTransport {
            instrument: self.clone(),
            kind,
            resource: resource.into(),
        }
    }
}

fn command_text(msg: &[u8]) -> String {
    String::from_utf8_lossy(msg).trim().to_string()
}

fn not_connected() -> Error {
    Error::io(io::Error::new(io::ErrorKind::NotConnected, "Mock transport is closed"))
}

pub struct MockTransport {
    instrument: MockInstrument,
    kind: TransportKind,
    resource: String,
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn is_open(&self) -> bool {
        !self.instrument.is_closed()
    }

    async fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        let mut state = self.instrument.state.lock().unwrap();
        if state.closed {
            return Err(not_connected());
        }
        state.messages.push(data.to_vec());
        let command = command_text(data);
        let reply = match state.replies.get_mut(&command) {
            Some(replies) if replies.len() > 1 => replies.pop_front(),
            Some(replies) => replies.front().cloned(),
            None => None,
        };
        if let Some(bytes) = reply.and_then(|x| x.to_bytes()) {
            state.output.push_back(bytes);
        }
        Ok(data.len())
    }

    async fn read(&mut self, max_bytes: Option<usize>) -> crate::Result<ReadChunk> {
        {
            let mut state = self.instrument.state.lock().unwrap();
            if state.closed {
                return Err(not_connected());
            }
            let limit = max_bytes.unwrap_or(usize::MAX).min(state.chunk_size);
            if let Some(front) = state.output.front_mut() {
                let n = limit.min(front.len());
                let data: Vec<u8> = front.drain(..n).collect();
                if front.is_empty() {
                    state.output.pop_front();
                }
                let end = state.output.is_empty();
                return Ok(ReadChunk::new(data, end));
            }
        }
        // nothing to send, the caller's timeout decides
        std::future::pending().await
    }

    async fn clear(&mut self) -> crate::Result<()> {
        let mut state = self.instrument.state.lock().unwrap();
        if state.closed {
            return Err(not_connected());
        }
        state.clear_count += 1;
        if state.fail_clear {
            return Err(Error::io(io::Error::new(io::ErrorKind::BrokenPipe, "Device clear failed")));
        }
        state.output.clear();
        Ok(())
    }

    async fn close(&mut self) -> crate::Result<()> {
        let mut state = self.instrument.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            state.close_count += 1;
            state.output.clear();
            if state.fail_close {
                return Err(Error::io(io::Error::new(io::ErrorKind::BrokenPipe, "Close failed")));
            }
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.instrument.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.instrument.state.lock().unwrap().timeout = timeout;
    }

    fn max_transfer_size(&self) -> usize {
        self.instrument.state.lock().unwrap().chunk_size
    }
}

/// Opens `MockTransport`s to a shared `MockInstrument`.
pub struct MockDriver {
    instrument: MockInstrument,
    kind: TransportKind,
}

impl MockDriver {
    pub fn new(instrument: MockInstrument, kind: TransportKind) -> Self {
        Self { instrument, kind }
    }

    /// A driver whose instrument never answers the connection attempt.
    pub fn refusing(kind: TransportKind) -> Self {
        let instrument = MockInstrument::new();
        instrument.refuse_connections(true);
        Self::new(instrument, kind)
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, addr: &Address, timeout: Duration) -> crate::Result<Box<dyn Transport>> {
        {
            let mut state = self.instrument.state.lock().unwrap();
            if state.refuse {
                return Err(Error::connection(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("Connection to `{}` refused", addr),
                )));
            }
            // a new connection starts with empty buffers
            state.closed = false;
            state.output.clear();
            state.open_count += 1;
        }
        let mut ret = self.instrument.transport(self.kind, addr.to_string());
        ret.set_timeout(timeout);
        Ok(Box::new(ret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies() {
        let instrument = MockInstrument::new();
        instrument
            .reply("*IDN?", Reply::text("LECROY,WR,1,2"))
            .reply_sequence("*OPC?", vec![Reply::text("0"), Reply::text("1")]);
        let mut transport = instrument.transport(TransportKind::Vicp, "VICP::mock");

        transport.write(b"*IDN?\n").await.unwrap();
        let chunk = transport.read(None).await.unwrap();
        assert_eq!(chunk, ReadChunk::new(b"LECROY,WR,1,2\n".to_vec(), true));

        for expected in &["0\n", "1\n", "1\n"] {
            transport.write(b"*OPC?\n").await.unwrap();
            let chunk = transport.read(Some(100)).await.unwrap();
            assert_eq!(chunk.data, expected.as_bytes());
        }
        assert_eq!(instrument.count("*OPC?"), 3);
    }

    #[tokio::test]
    async fn chunked_reads() {
        let instrument = MockInstrument::new();
        instrument.reply("C1:WF? DAT1", Reply::Block(b"abcdef".to_vec()));
        instrument.set_chunk_size(4);
        let mut transport = instrument.transport(TransportKind::Vicp, "VICP::mock");
        transport.write(b"C1:WF? DAT1\n").await.unwrap();
        let chunk = transport.read(Some(100)).await.unwrap();
        assert_eq!(chunk, ReadChunk::new(b"#16a".to_vec(), false));
        let chunk = transport.read(Some(2)).await.unwrap();
        assert_eq!(chunk, ReadChunk::new(b"bc".to_vec(), false));
        let chunk = transport.read(None).await.unwrap();
        assert_eq!(chunk, ReadChunk::new(b"def\n".to_vec(), true));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let instrument = MockInstrument::new();
        let mut transport = instrument.transport(TransportKind::Vicp, "VICP::mock");
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(instrument.close_count(), 1);
        assert!(!transport.is_open());
        match transport.write(b"*CLS\n").await {
            Err(Error::Io(_)) => {}
            _ => panic!(),
        }
    }

    #[tokio::test]
    async fn refusing_driver() {
        let driver = MockDriver::refusing(TransportKind::Vicp);
        let addr = Address::parse("VICP::127.0.0.1").unwrap();
        match driver.open(&addr, Duration::from_secs(1)).await {
            Err(Error::Connection(_)) => {}
            _ => panic!(),
        }
    }

    #[tokio::test]
    async fn driver_reopens_closed_instrument() {
        let instrument = MockInstrument::new();
        instrument.reply("*IDN?", Reply::text("LECROY,WR,1,2"));
        let driver = MockDriver::new(instrument.clone(), TransportKind::Vxi11);
        let addr = Address::parse("VXI11:127.0.0.1").unwrap();

        let mut transport = driver.open(&addr, Duration::from_secs(1)).await.unwrap();
        transport.close().await.unwrap();
        assert!(instrument.is_closed());

        let mut transport = driver.open(&addr, Duration::from_secs(1)).await.unwrap();
        transport.write(b"*IDN?\n").await.unwrap();
        assert_eq!(transport.read(None).await.unwrap().data, b"LECROY,WR,1,2\n");
        assert_eq!(instrument.open_count(), 2);

        instrument.refuse_connections(true);
        assert!(matches!(driver.open(&addr, Duration::from_secs(1)).await, Err(Error::Connection(_))));
    }
}
