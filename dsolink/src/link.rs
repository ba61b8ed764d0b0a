use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::block::{read_block, ChunkReader};
use crate::policy::Querier;
use crate::transport::{ReadChunk, Transport};
use crate::{encode_block, BinaryBlock, Error};

/// Exclusive access to a session's transport for the duration of one operation.
///
/// Every transport call is bounded by the transport timeout and aborted when the session
/// is closed or a device clear is requested. A timeout set with `shadow_timeout` is
/// reverted when the link is dropped.
pub(crate) struct Link<'a> {
    transport: &'a mut Box<dyn Transport>,
    saved_timeout: Option<Duration>,
    closed: watch::Receiver<bool>,
    interrupt: watch::Receiver<u64>,
    generation: u64,
    terminator: Vec<u8>,
    max_response_len: usize,
}

impl<'a> Link<'a> {
    pub(crate) fn new(
        transport: &'a mut Box<dyn Transport>,
        closed: watch::Receiver<bool>,
        interrupt: watch::Receiver<u64>,
        generation: u64,
        terminator: &str,
        max_response_len: usize,
    ) -> Self {
        Self {
            transport,
            saved_timeout: None,
            closed,
            interrupt,
            generation,
            terminator: terminator.as_bytes().to_vec(),
            max_response_len: max_response_len.max(1),
        }
    }

    /// Use `timeout` for the remaining calls on this link.
    pub(crate) fn shadow_timeout(&mut self, timeout: Duration) {
        if self.saved_timeout.is_none() {
            self.saved_timeout = Some(self.transport.timeout());
        }
        self.transport.set_timeout(timeout);
    }

    pub(crate) fn restore_timeout(&mut self) {
        if let Some(timeout) = self.saved_timeout.take() {
            self.transport.set_timeout(timeout);
        }
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        let timeout = self.transport.timeout();
        let fut = self.transport.write(data);
        guarded(&mut self.closed, &mut self.interrupt, self.generation, timeout, fut).await
    }

    pub(crate) async fn read(&mut self, max_bytes: Option<usize>) -> crate::Result<ReadChunk> {
        let timeout = self.transport.timeout();
        let fut = self.transport.read(max_bytes);
        guarded(&mut self.closed, &mut self.interrupt, self.generation, timeout, fut).await
    }

    pub(crate) async fn clear(&mut self) -> crate::Result<()> {
        let timeout = self.transport.timeout();
        let fut = self.transport.clear();
        guarded(&mut self.closed, &mut self.interrupt, self.generation, timeout, fut).await
    }

    /// Write all of `data`, split into pieces the transport accepts.
    pub(crate) async fn write_all(&mut self, data: &[u8]) -> crate::Result<()> {
        let max_transfer = self.transport.max_transfer_size().max(1);
        for mut chunk in data.chunks(max_transfer) {
            while !chunk.is_empty() {
                let n = self.write(chunk).await?;
                if n == 0 {
                    return Err(Error::io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Transport accepted no data",
                    )));
                }
                chunk = &chunk[n.min(chunk.len())..];
            }
        }
        Ok(())
    }

    /// Write `data` followed by the terminator unless it already ends with it.
    pub(crate) async fn write_message(&mut self, data: &[u8]) -> crate::Result<()> {
        if data.ends_with(&self.terminator) {
            return self.write_all(data).await;
        }
        let mut msg = Vec::with_capacity(data.len() + self.terminator.len());
        msg.extend_from_slice(data);
        msg.extend_from_slice(&self.terminator);
        self.write_all(&msg).await
    }

    /// Read a text response up to the terminator.
    pub(crate) async fn read_line(&mut self) -> crate::Result<String> {
        let mut rx = Vec::new();
        loop {
            let chunk = self.read(Some(self.max_response_len)).await?;
            rx.extend(chunk.data);
            if rx.ends_with(&self.terminator) {
                break;
            }
            if chunk.end {
                log::debug!("Unterminated response: `{}`", String::from_utf8_lossy(&rx));
                return Err(Error::QueryUnterminated);
            }
        }
        rx.truncate(rx.len() - self.terminator.len());
        let ret = String::from_utf8(rx).map_err(|_| Error::format("Response is not valid UTF-8"))?;
        Ok(ret.trim_matches(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n').to_string())
    }

    pub(crate) async fn query_text(&mut self, text: &str) -> crate::Result<String> {
        self.query_text_after(text, Duration::from_secs(0)).await
    }

    /// Query `text`, reading the response `delay` after the query was sent.
    pub(crate) async fn query_text_after(&mut self, text: &str, delay: Duration) -> crate::Result<String> {
        self.write_message(text.as_bytes()).await?;
        self.pause(delay).await?;
        self.read_line().await
    }

    pub(crate) async fn read_block(&mut self, first_read: Option<usize>) -> crate::Result<BinaryBlock> {
        let max_transfer = self.transport.max_transfer_size();
        let first_read = first_read.unwrap_or(self.max_response_len).min(max_transfer);
        read_block(self, first_read, max_transfer).await
    }

    pub(crate) async fn query_block(
        &mut self,
        text: &str,
        hint: Option<usize>,
        delay: Duration,
    ) -> crate::Result<BinaryBlock> {
        self.write_message(text.as_bytes()).await?;
        self.pause(delay).await?;
        self.read_block(hint).await
    }

    /// Write `header` followed by `data` framed as a block and the terminator.
    pub(crate) async fn write_block(&mut self, header: &str, data: &[u8]) -> crate::Result<()> {
        let mut msg = header.as_bytes().to_vec();
        msg.extend(encode_block(data));
        msg.extend_from_slice(&self.terminator);
        self.write_all(&msg).await
    }

    /// Sleep for `duration`, aborted like a transport call.
    pub(crate) async fn pause(&mut self, duration: Duration) -> crate::Result<()> {
        if duration == Duration::from_secs(0) {
            return Ok(());
        }
        let fut = async {
            sleep(duration).await;
            Ok(())
        };
        guarded(&mut self.closed, &mut self.interrupt, self.generation, duration * 2, fut).await
    }
}

impl<'a> Drop for Link<'a> {
    fn drop(&mut self) {
        self.restore_timeout();
    }
}

#[async_trait]
impl<'a> ChunkReader for Link<'a> {
    async fn read_chunk(&mut self, max_bytes: usize) -> crate::Result<ReadChunk> {
        self.read(Some(max_bytes)).await
    }
}

#[async_trait]
impl<'a> Querier for Link<'a> {
    async fn query(&mut self, text: &str) -> crate::Result<String> {
        self.query_text(text).await
    }
}

pub(crate) async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        if *closed.borrow() {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

async fn wait_interrupted(interrupt: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *interrupt.borrow() != generation {
            return;
        }
        if interrupt.changed().await.is_err() {
            // the session is gone, nobody can interrupt anymore
            std::future::pending::<()>().await;
        }
    }
}

async fn guarded<T, F>(
    closed: &mut watch::Receiver<bool>,
    interrupt: &mut watch::Receiver<u64>,
    generation: u64,
    timeout: Duration,
    fut: F,
) -> crate::Result<T>
where
    F: Future<Output = crate::Result<T>>,
{
    if *closed.borrow() {
        return Err(Error::SessionClosed);
    }
    if *interrupt.borrow() != generation {
        return Err(Error::Cleared);
    }
    tokio::select! {
        ret = tokio::time::timeout(timeout, fut) => ret.map_err(|_| Error::Timeout)?,
        _ = wait_closed(closed) => Err(Error::SessionClosed),
        _ = wait_interrupted(interrupt, generation) => Err(Error::Cleared),
    }
}
