use std::path::Path;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::progress::{ProgressCallback, ProgressEvent, ProgressGate, SpeedCalculator};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Lazy sequence of body chunks.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Reads a byte source in fixed-size chunks.
///
/// At most one chunk is held in memory at a time, so memory use is bounded
/// by `chunk_size` regardless of the source length. Every chunk except the
/// last is exactly `chunk_size` bytes long.
pub struct ChunkEncoder<R> {
    reader: R,
    chunk_size: usize,
    total_size: u64,
    emitted: u64,
    gate: ProgressGate,
    speed: SpeedCalculator,
    file_name: String,
    position: (usize, usize),
    on_progress: Option<ProgressCallback>,
}

impl ChunkEncoder<tokio::fs::File> {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let total_size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file, total_size, chunk_size).with_file_name(name))
    }
}

impl<R> ChunkEncoder<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Wraps `reader`, which must yield exactly `total_size` bytes.
    pub fn new(reader: R, total_size: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            reader,
            chunk_size,
            total_size,
            emitted: 0,
            gate: ProgressGate::new(total_size),
            speed: SpeedCalculator::default(),
            file_name: String::new(),
            position: (1, 1),
            on_progress: None,
        }
    }

    /// Sets the file name reported in progress events.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Sets the 1-based `index` of this file among `count` files.
    pub fn with_position(mut self, index: usize, count: usize) -> Self {
        self.position = (index, count);
        self
    }

    /// Registers a progress callback.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Reads the next chunk. Returns `None` once `total_size` bytes were emitted.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        let remaining = self.total_size - self.emitted;
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(TransferError::SourceTruncated {
                    expected: self.total_size,
                    actual: self.emitted + filled as u64,
                });
            }
            filled += n;
        }

        self.emitted += want as u64;
        self.speed.add_sample(want as u64);
        self.report();
        Ok(Some(Bytes::from(buf)))
    }

    fn report(&mut self) {
        let Some(callback) = &self.on_progress else {
            return;
        };
        let Some(percent) = self.gate.observe(self.emitted) else {
            return;
        };
        let event = ProgressEvent {
            file_name: self.file_name.clone(),
            file_index: self.position.0,
            file_count: self.position.1,
            bytes_sent: self.emitted,
            total_bytes: self.total_size,
            percent,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(self.total_size - self.emitted),
        };
        callback(&event);
    }

    /// Cumulative bytes emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Declared source length.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Effective chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Converts the encoder into a lazy, non-restartable chunk stream.
    pub fn into_stream(self) -> ChunkStream {
        stream::try_unfold(self, |mut encoder| async move {
            Ok(encoder.next_chunk().await?.map(|chunk| (chunk, encoder)))
        })
        .boxed()
    }
}
