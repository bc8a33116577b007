use std::path::Path;
use tokio::io::AsyncRead;

use super::stream::{ArchiveStream, ChunkDecoder};
use crate::config::DecoderConfig;
use crate::error::Result;

/// Reassembles decoded text chunks into complete newline-delimited records.
///
/// Each yielded line carries the current byte offset into the compressed
/// archive file, for percentage-complete telemetry. The offset is
/// snapshotted once per decoder chunk, not per line, so it is coarse but
/// monotonic. A fragment left unterminated at the end of one chunk is
/// carried into the next; no line is dropped or duplicated at a chunk
/// boundary.
pub struct LineReader<R> {
    decoder: ChunkDecoder<R>,
    chunk: String,
    pos: usize,
    leftover: String,
    chunk_offset: u64,
    yield_trailing: bool,
    finished: bool,
}

impl LineReader<ArchiveStream> {
    /// Open a zstd archive file and iterate its lines.
    pub async fn open(path: &Path, config: &DecoderConfig) -> Result<Self> {
        let decoder = ChunkDecoder::open(path, config).await?;
        Ok(Self::new(decoder, config.yield_trailing_line))
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(decoder: ChunkDecoder<R>, yield_trailing: bool) -> Self {
        Self {
            decoder,
            chunk: String::new(),
            pos: 0,
            leftover: String::new(),
            chunk_offset: 0,
            yield_trailing,
            finished: false,
        }
    }

    /// Bytes consumed so far from the underlying archive file.
    pub fn position(&self) -> u64 {
        self.decoder.position()
    }

    /// Next complete line and the archive byte offset it was observed at,
    /// or `None` at end of stream.
    ///
    /// A trailing fragment with no terminator is dropped unless the reader
    /// was built with `yield_trailing` set.
    pub async fn next_line(&mut self) -> Result<Option<(String, u64)>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            if let Some(idx) = self.chunk[self.pos..].find('\n') {
                let end = self.pos + idx;
                let line = if self.leftover.is_empty() {
                    self.chunk[self.pos..end].to_string()
                } else {
                    let mut line = std::mem::take(&mut self.leftover);
                    line.push_str(&self.chunk[self.pos..end]);
                    line
                };
                self.pos = end + 1;
                return Ok(Some((line, self.chunk_offset)));
            }

            self.leftover.push_str(&self.chunk[self.pos..]);
            self.chunk.clear();
            self.pos = 0;

            match self.decoder.next_chunk().await? {
                Some(chunk) => {
                    self.chunk = chunk;
                    self.chunk_offset = self.decoder.position();
                }
                None => {
                    self.finished = true;
                    if self.yield_trailing && !self.leftover.is_empty() {
                        let line = std::mem::take(&mut self.leftover);
                        return Ok(Some((line, self.chunk_offset)));
                    }
                    self.leftover.clear();
                    return Ok(None);
                }
            }
        }
    }
}
