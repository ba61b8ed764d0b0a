//! Reading a definite length block from a transport that delivers it in pieces.

use async_trait::async_trait;

use crate::transport::ReadChunk;
use crate::{parse_block_header, BinaryBlock, Error};

#[async_trait]
pub trait ChunkReader: Send {
    async fn read_chunk(&mut self, max_bytes: usize) -> crate::Result<ReadChunk>;
}

/// Read one block. `first_read` sizes the read used to fetch the header, subsequent
/// reads are limited to `max_transfer` bytes.
///
/// The final payload read asks for one more byte than missing, so a trailing terminator
/// is usually consumed along with the payload. If the message has not ended once the
/// payload is complete, the rest of it is read and discarded.
pub async fn read_block<R: ChunkReader + ?Sized>(
    reader: &mut R,
    first_read: usize,
    max_transfer: usize,
) -> crate::Result<BinaryBlock> {
    let max_transfer = max_transfer.max(1);
    let mut rx: Vec<u8> = Vec::new();
    let mut end = false;

    let header = loop {
        if let Some(header) = parse_block_header(&rx)? {
            break header;
        }
        if end {
            return Err(Error::framing(format!(
                "Message ended before block header: `{}`",
                String::from_utf8_lossy(&rx)
            )));
        }
        let request = if rx.is_empty() { first_read.max(1) } else { max_transfer };
        let chunk = reader.read_chunk(request).await?;
        end = chunk.end;
        rx.extend(chunk.data);
    };

    let total = header.offset + header.length;
    rx.reserve(total.saturating_sub(rx.len()));
    while rx.len() < total {
        if end {
            return Err(Error::framing(format!(
                "Block truncated: expected {} bytes, got {}",
                header.length,
                rx.len() - header.offset
            )));
        }
        let remaining = total - rx.len();
        let chunk = reader.read_chunk((remaining + 1).min(max_transfer)).await?;
        end = chunk.end;
        rx.extend(chunk.data);
    }
    while !end {
        let chunk = reader.read_chunk(max_transfer).await?;
        end = chunk.end;
        if !chunk.data.is_empty() {
            log::debug!("Discarding {} bytes after block", chunk.data.len());
        }
    }
    rx.truncate(total);
    rx.drain(..header.offset);
    Ok(BinaryBlock {
        header_len: header.offset,
        declared_len: header.length,
        data: rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_block;
    use std::collections::VecDeque;

    struct VecReader {
        chunks: VecDeque<ReadChunk>,
        requests: Vec<usize>,
    }

    impl VecReader {
        fn new(chunks: Vec<(&[u8], bool)>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|(x, end)| ReadChunk::new(x.to_vec(), end)).collect(),
                requests: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChunkReader for VecReader {
        async fn read_chunk(&mut self, max_bytes: usize) -> crate::Result<ReadChunk> {
            self.requests.push(max_bytes);
            self.chunks.pop_front().ok_or(Error::Timeout)
        }
    }

    /// Serves a byte stream honoring the requested sizes, ending the message with the last byte.
    struct StreamReader {
        data: Vec<u8>,
        requests: Vec<usize>,
    }

    impl StreamReader {
        fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                requests: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChunkReader for StreamReader {
        async fn read_chunk(&mut self, max_bytes: usize) -> crate::Result<ReadChunk> {
            self.requests.push(max_bytes);
            if self.data.is_empty() {
                return Err(Error::Timeout);
            }
            let n = max_bytes.min(self.data.len());
            let data: Vec<u8> = self.data.drain(..n).collect();
            Ok(ReadChunk::new(data, self.data.is_empty()))
        }
    }

    #[tokio::test]
    async fn header_split_over_chunks() {
        let mut reader = VecReader::new(vec![
            (&b"C1:WF DAT1,#"[..], false),
            (&b"2"[..], false),
            (&b"11hello"[..], false),
            (&b" world\n"[..], true),
        ]);
        let block = read_block(&mut reader, 16, 4096).await.unwrap();
        assert_eq!(block.data, b"hello world");
        assert_eq!(block.header_len, 15);
        assert_eq!(block.declared_len, 11);
        assert!(reader.chunks.is_empty());
        assert_eq!(reader.requests, vec![16, 4096, 4096, 7]);
    }

    #[tokio::test]
    async fn chunked_by_max_transfer() {
        let payload: Vec<u8> = (0..100).collect();
        let mut wire = encode_block(&payload);
        wire.push(b'\n');
        let mut reader = StreamReader::new(&wire);
        let block = read_block(&mut reader, 10, 32).await.unwrap();
        assert_eq!(block.data, payload);
        // the terminator went with the last read
        assert!(reader.data.is_empty());
        assert_eq!(reader.requests, vec![10, 32, 32, 32]);
    }

    #[tokio::test]
    async fn terminator_after_complete_payload() {
        // the first read ends exactly at the payload
        let mut reader = VecReader::new(vec![(&b"#12ab"[..], false), (&b"\n"[..], true)]);
        let block = read_block(&mut reader, 5, 100).await.unwrap();
        assert_eq!(block.data, b"ab");
        assert!(reader.chunks.is_empty());
        assert_eq!(reader.requests, vec![5, 100]);

        // a chunk boundary lands on the payload end
        let mut wire = encode_block(b"abcdefg");
        wire.push(b'\n');
        let mut reader = StreamReader::new(&wire);
        let block = read_block(&mut reader, 5, 5).await.unwrap();
        assert_eq!(block.data, b"abcdefg");
        assert!(reader.data.is_empty());
        assert_eq!(reader.requests, vec![5, 5, 5]);
    }

    #[tokio::test]
    async fn end_before_complete() {
        let mut reader = VecReader::new(vec![(&b"#15hel"[..], false), (&b"l"[..], true)]);
        match read_block(&mut reader, 100, 100).await {
            Err(Error::Framing(_)) => {}
            _ => panic!(),
        }

        let mut reader = VecReader::new(vec![(&b"#3"[..], true)]);
        match read_block(&mut reader, 100, 100).await {
            Err(Error::Framing(_)) => {}
            _ => panic!(),
        }
    }

    #[tokio::test]
    async fn not_a_block() {
        let mut reader = VecReader::new(vec![(&b"WARNING : CURRENT REMOTE CONTROL INTERFACE\n"[..], true)]);
        match read_block(&mut reader, 100, 100).await {
            Err(Error::Framing(_)) => {}
            _ => panic!(),
        }
    }

    #[tokio::test]
    async fn timeout_propagates() {
        let mut reader = VecReader::new(vec![(&b"#15he"[..], false)]);
        match read_block(&mut reader, 100, 100).await {
            Err(Error::Timeout) => {}
            _ => panic!(),
        }
    }

    #[tokio::test]
    async fn empty_block() {
        let mut reader = VecReader::new(vec![(&b"#10\n"[..], true)]);
        let block = read_block(&mut reader, 100, 100).await.unwrap();
        assert!(block.data.is_empty());
    }
}
