//! Pooled LZ4 block stream codec.
//!
//! A stream is a sequence of independently compressed blocks:
//!
//! ```text
//! [RAW_LEN u32 LE][PACKED_LEN u32 LE][PACKED BYTES] ...
//! ```
//!
//! Each block holds at most [`BLOCK_SIZE`] bytes of input. The buffers backing
//! a [`Compressor`] or [`Decompressor`] come from a [`CodecPool`] and go back to
//! it, reset, when the handle is dropped. A handle is owned by exactly one
//! transfer, so a state is never shared between two streams.

use crate::error::{StorageError, StorageErrorExt};
use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const BLOCK_SIZE: usize = 64 * 1024;
const HEADER_LEN: usize = 8;
const DEFAULT_IDLE_LIMIT: usize = 32;

#[derive(Debug, Default)]
struct CompressState {
    raw: Vec<u8>,
    packed: Vec<u8>,
}

impl CompressState {
    fn allocate() -> Self {
        Self {
            raw: Vec::with_capacity(BLOCK_SIZE),
            packed: vec![0; get_maximum_output_size(BLOCK_SIZE)],
        }
    }

    fn reset(&mut self) {
        self.raw.clear();
    }
}

#[derive(Debug, Default)]
struct DecompressState {
    packed: Vec<u8>,
    raw: Vec<u8>,
    pos: usize,
    len: usize,
}

impl DecompressState {
    fn allocate() -> Self {
        Self {
            packed: vec![0; get_maximum_output_size(BLOCK_SIZE)],
            raw: vec![0; BLOCK_SIZE],
            pos: 0,
            len: 0,
        }
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.len = 0;
    }
}

/// Free list of codec states shared by all transfers.
#[derive(Debug)]
pub struct CodecPool {
    compressors: Mutex<Vec<CompressState>>,
    decompressors: Mutex<Vec<DecompressState>>,
    idle_limit: usize,
}

impl Default for CodecPool {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_LIMIT)
    }
}

impl CodecPool {
    /// `idle_limit` caps how many released states are kept per direction.
    #[must_use]
    pub fn new(idle_limit: usize) -> Self {
        Self {
            compressors: Mutex::new(Vec::new()),
            decompressors: Mutex::new(Vec::new()),
            idle_limit,
        }
    }

    /// Takes a compressor from the pool and binds it to `sink`.
    pub fn compressor<W>(self: &Arc<Self>, sink: W) -> Compressor<W>
    where
        W: AsyncWrite + Unpin,
    {
        let state = self.compressors.lock().pop().unwrap_or_else(CompressState::allocate);
        Compressor { pool: Arc::clone(self), state, sink: Some(sink), consumed: 0 }
    }

    /// Takes a decompressor from the pool and binds it to `source`.
    pub fn decompressor<R>(self: &Arc<Self>, source: R) -> Decompressor<R>
    where
        R: AsyncRead + Unpin,
    {
        let state = self.decompressors.lock().pop().unwrap_or_else(DecompressState::allocate);
        Decompressor { pool: Arc::clone(self), state, source, produced: 0 }
    }

    /// Number of idle `(compressor, decompressor)` states.
    #[must_use]
    pub fn idle(&self) -> (usize, usize) {
        (self.compressors.lock().len(), self.decompressors.lock().len())
    }

    fn release_compressor(&self, mut state: CompressState) {
        state.reset();
        let mut idle = self.compressors.lock();
        if idle.len() < self.idle_limit {
            idle.push(state);
        }
    }

    fn release_decompressor(&self, mut state: DecompressState) {
        state.reset();
        let mut idle = self.decompressors.lock();
        if idle.len() < self.idle_limit {
            idle.push(state);
        }
    }
}

/// Streaming writer that compresses into `W` block by block.
///
/// Call [`finish`](Self::finish) to write the trailing partial block and get the
/// sink back. Dropping without `finish` discards buffered input.
#[derive(Debug)]
pub struct Compressor<W> {
    pool: Arc<CodecPool>,
    state: CompressState,
    sink: Option<W>,
    consumed: u64,
}

impl<W: AsyncWrite + Unpin> Compressor<W> {
    /// Buffers `data`, emitting a block every [`BLOCK_SIZE`] bytes.
    ///
    /// # Errors
    /// Returns [`StorageError::Compress`] or [`StorageError::Io`] when a block
    /// cannot be encoded or written.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<(), StorageError> {
        while !data.is_empty() {
            let room = BLOCK_SIZE - self.state.raw.len();
            let (head, tail) = data.split_at(room.min(data.len()));
            self.state.raw.extend_from_slice(head);
            self.consumed += head.len() as u64;
            data = tail;

            if self.state.raw.len() == BLOCK_SIZE {
                self.emit_block().await?;
            }
        }
        Ok(())
    }

    /// Uncompressed bytes accepted so far.
    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Flushes the last block and the sink, then hands the sink back.
    ///
    /// # Errors
    /// Returns [`StorageError::Compress`] or [`StorageError::Io`].
    pub async fn finish(mut self) -> Result<W, StorageError> {
        self.emit_block().await?;
        let mut sink = self.sink.take().ok_or("compressor sink already taken")?;
        sink.flush().await.context("Flushing compressed stream")?;
        Ok(sink)
    }

    async fn emit_block(&mut self) -> Result<(), StorageError> {
        if self.state.raw.is_empty() {
            return Ok(());
        }
        let state = &mut self.state;
        let sink = self.sink.as_mut().ok_or("compressor sink already taken")?;

        let packed = compress_into(&state.raw, &mut state.packed).context("Compressing block")?;
        let header = encode_header(state.raw.len(), packed)?;
        sink.write_all(&header).await.context("Writing block header")?;
        sink.write_all(&state.packed[..packed]).await.context("Writing block body")?;

        state.raw.clear();
        Ok(())
    }
}

impl<W> Drop for Compressor<W> {
    fn drop(&mut self) {
        self.pool.release_compressor(std::mem::take(&mut self.state));
    }
}

/// Streaming reader that yields decompressed bytes from `R`.
#[derive(Debug)]
pub struct Decompressor<R> {
    pool: Arc<CodecPool>,
    state: DecompressState,
    source: R,
    produced: u64,
}

impl<R: AsyncRead + Unpin> Decompressor<R> {
    /// Returns up to `max` decompressed bytes, or `None` at a clean end of stream.
    ///
    /// # Errors
    /// * [`StorageError::Corrupted`] for a truncated stream or impossible block lengths.
    /// * [`StorageError::Decompress`] when a block fails to decode.
    /// * [`StorageError::Io`] when the source cannot be read.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Vec<u8>>, StorageError> {
        let max = max.max(1);
        loop {
            let state = &mut self.state;
            if state.pos < state.len {
                let end = (state.pos + max).min(state.len);
                let chunk = state.raw[state.pos..end].to_vec();
                state.pos = end;
                self.produced += chunk.len() as u64;
                return Ok(Some(chunk));
            }
            if !self.load_block().await? {
                return Ok(None);
            }
        }
    }

    /// Decompressed bytes handed out so far.
    #[must_use]
    pub const fn produced(&self) -> u64 {
        self.produced
    }

    async fn load_block(&mut self) -> Result<bool, StorageError> {
        let mut header = [0u8; HEADER_LEN];
        let filled = read_up_to(&mut self.source, &mut header).await?;
        if filled == 0 {
            return Ok(false);
        }
        if filled < HEADER_LEN {
            return Err(corrupted(format!("truncated block header ({filled} bytes)")));
        }

        let (raw_len, packed_len) = decode_header(&header);
        let state = &mut self.state;
        if raw_len == 0 || raw_len > BLOCK_SIZE || packed_len > state.packed.len() {
            return Err(corrupted(format!(
                "impossible block lengths: raw {raw_len}, packed {packed_len}"
            )));
        }

        let packed = &mut state.packed[..packed_len];
        if read_up_to(&mut self.source, packed).await? < packed_len {
            return Err(corrupted("truncated block body"));
        }

        let decoded = decompress_into(packed, &mut state.raw[..raw_len])
            .context("Decompressing block")?;
        if decoded != raw_len {
            return Err(corrupted(format!("block decoded to {decoded} bytes, header says {raw_len}")));
        }

        state.pos = 0;
        state.len = raw_len;
        Ok(true)
    }
}

impl<R> Drop for Decompressor<R> {
    fn drop(&mut self) {
        self.pool.release_decompressor(std::mem::take(&mut self.state));
    }
}

fn encode_header(raw: usize, packed: usize) -> Result<[u8; HEADER_LEN], StorageError> {
    let raw = u32::try_from(raw).map_err(|_| "block length exceeds u32")?;
    let packed = u32::try_from(packed).map_err(|_| "packed length exceeds u32")?;
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&raw.to_le_bytes());
    header[4..].copy_from_slice(&packed.to_le_bytes());
    Ok(header)
}

fn decode_header(header: &[u8; HEADER_LEN]) -> (usize, usize) {
    let raw = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let packed = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    (raw as usize, packed as usize)
}

/// Fills `buf` as far as the source allows; returns the byte count read.
async fn read_up_to<R: AsyncRead + Unpin>(
    source: &mut R,
    buf: &mut [u8],
) -> Result<usize, StorageError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await.context("Reading compressed stream")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn corrupted(message: impl Into<std::borrow::Cow<'static, str>>) -> StorageError {
    StorageError::Corrupted { message: message.into(), context: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn compress(pool: &Arc<CodecPool>, data: &[u8], step: usize) -> Vec<u8> {
        let mut compressor = pool.compressor(Vec::new());
        for chunk in data.chunks(step.max(1)) {
            compressor.write(chunk).await.unwrap();
        }
        compressor.finish().await.unwrap()
    }

    async fn decompress(pool: &Arc<CodecPool>, stream: &[u8], chunk: usize) -> Vec<u8> {
        let mut decompressor = pool.decompressor(stream);
        let mut out = Vec::new();
        while let Some(piece) = decompressor.read_chunk(chunk).await.unwrap() {
            assert!(piece.len() <= chunk);
            out.extend_from_slice(&piece);
        }
        out
    }

    #[tokio::test]
    async fn empty_stream_has_no_blocks() {
        let pool = Arc::new(CodecPool::default());
        let stream = compress(&pool, b"", 16).await;
        assert!(stream.is_empty());
        assert!(decompress(&pool, &stream, 16).await.is_empty());
    }

    #[tokio::test]
    async fn multi_block_round_trip() {
        let pool = Arc::new(CodecPool::default());
        let data: Vec<u8> = (0..BLOCK_SIZE * 2 + 123).map(|i| (i % 251) as u8).collect();
        let stream = compress(&pool, &data, 1000).await;
        assert!(stream.len() < data.len());
        assert_eq!(decompress(&pool, &stream, 1024).await, data);
    }

    #[tokio::test]
    async fn states_return_to_the_pool_once() {
        let pool = Arc::new(CodecPool::default());
        assert_eq!(pool.idle(), (0, 0));

        let stream = compress(&pool, b"hello", 2).await;
        assert_eq!(pool.idle(), (1, 0));

        let first = pool.compressor(Vec::new());
        let second = pool.compressor(Vec::new());
        assert_eq!(pool.idle(), (0, 0));
        drop(first);
        drop(second);
        assert_eq!(pool.idle(), (2, 0));

        decompress(&pool, &stream, 1).await;
        assert_eq!(pool.idle(), (2, 1));
    }

    #[tokio::test]
    async fn idle_limit_is_respected() {
        let pool = Arc::new(CodecPool::new(1));
        let a = pool.compressor(Vec::new());
        let b = pool.compressor(Vec::new());
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), (1, 0));
    }

    #[tokio::test]
    async fn reused_state_starts_clean() {
        let pool = Arc::new(CodecPool::default());
        let mut abandoned = pool.compressor(Vec::new());
        abandoned.write(b"left behind").await.unwrap();
        drop(abandoned);

        let stream = compress(&pool, b"fresh", 5).await;
        assert_eq!(decompress(&pool, &stream, 64).await, b"fresh");
    }

    #[tokio::test]
    async fn truncated_stream_is_corrupted() {
        let pool = Arc::new(CodecPool::default());
        let stream = compress(&pool, &[7u8; 4096], 512).await;

        let mut short = pool.decompressor(&stream[..stream.len() - 3]);
        let err = short.read_chunk(1024).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));

        let mut header_only = pool.decompressor(&stream[..5]);
        assert!(matches!(header_only.read_chunk(1024).await, Err(StorageError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn oversized_block_header_is_rejected() {
        let pool = Arc::new(CodecPool::default());
        let header = encode_header(BLOCK_SIZE + 1, 10).unwrap();
        let mut decompressor = pool.decompressor(&header[..]);
        assert!(matches!(decompressor.read_chunk(8).await, Err(StorageError::Corrupted { .. })));
    }
}
