use async_compression::tokio::bufread::ZstdDecoder;
use async_compression::zstd::DParameter;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader, ReadBuf};

use crate::config::DecoderConfig;
use crate::error::{RedarcError, Result};

/// Archive dumps are written with long-distance matching; the reference
/// decompressor is configured with a 2 GiB window to match.
const WINDOW_LOG_MAX: u32 = 31;

/// AsyncRead wrapper that counts bytes consumed from the inner reader.
///
/// Placed on the compressed side of the zstd decoder so the shared counter
/// tracks the cursor position in the archive file, which is what progress
/// percentages are computed against.
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle to the byte counter, shared with the decode session.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.count)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            let read = (buf.filled().len() - before) as u64;
            this.count.fetch_add(read, Ordering::Relaxed);
        }
        result
    }
}

/// The reader stack used for real archive files.
pub type ArchiveStream = ZstdDecoder<BufReader<CountingReader<File>>>;

/// Streaming decoder that turns decompressed bytes into UTF-8 text chunks.
///
/// Forward-only and finite; a new decoder must be opened to reread a file.
/// Reads fixed-size chunks of decompressed data and converts each to a
/// `String`. A chunk boundary that splits a multi-byte character is not
/// fatal: the undecoded bytes are retained, another chunk is appended and
/// the conversion retried, up to `max_window` accumulated bytes per chunk.
pub struct ChunkDecoder<R> {
    reader: R,
    position: Arc<AtomicU64>,
    chunk_size: usize,
    max_window: u64,
    done: bool,
}

impl ChunkDecoder<ArchiveStream> {
    /// Open a zstd archive file for streaming decode.
    pub async fn open(path: &Path, config: &DecoderConfig) -> Result<Self> {
        let file = File::open(path).await?;
        let counting = CountingReader::new(file);
        let position = counting.counter();
        let buffered = BufReader::with_capacity(1 << 20, counting);
        let mut decoder =
            ZstdDecoder::with_params(buffered, &[DParameter::window_log_max(WINDOW_LOG_MAX)]);
        // Some dumps are concatenated frames rather than one long frame.
        decoder.multiple_members(true);
        Ok(Self::from_parts(decoder, position, config))
    }
}

impl<R: AsyncRead + Unpin> ChunkDecoder<R> {
    /// Build a decoder over an already-layered reader. `position` should
    /// track the underlying file cursor (see [`CountingReader`]).
    pub fn from_parts(reader: R, position: Arc<AtomicU64>, config: &DecoderConfig) -> Self {
        Self {
            reader,
            position,
            chunk_size: config.chunk_size,
            max_window: config.max_window,
            done: false,
        }
    }

    /// Bytes consumed so far from the underlying archive file.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Next decoded text chunk, or `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }

        let mut window: Vec<u8> = Vec::new();
        let mut bytes_read: u64 = 0;
        loop {
            let start = window.len();
            window.resize(start + self.chunk_size, 0);
            let n = self.reader.read(&mut window[start..]).await?;
            window.truncate(start + n);
            bytes_read += n as u64;

            if n == 0 {
                self.done = true;
                if window.is_empty() {
                    return Ok(None);
                }
                return match String::from_utf8(window) {
                    Ok(text) => Ok(Some(text)),
                    Err(err) if err.utf8_error().error_len().is_none() => {
                        // Stream ended mid-character; keep the valid prefix.
                        let valid = err.utf8_error().valid_up_to();
                        let mut bytes = err.into_bytes();
                        log::warn!(
                            "stream ended mid-character; dropping {} trailing byte(s)",
                            bytes.len() - valid
                        );
                        bytes.truncate(valid);
                        String::from_utf8(bytes)
                            .map(Some)
                            .map_err(|_| RedarcError::Format { bytes_read })
                    }
                    Err(_) => Err(RedarcError::Format { bytes_read }),
                };
            }

            match String::from_utf8(window) {
                Ok(text) => return Ok(Some(text)),
                Err(err) if err.utf8_error().error_len().is_none() => {
                    // Chunk boundary fell inside a multi-byte character.
                    if bytes_read > self.max_window {
                        return Err(RedarcError::Format { bytes_read });
                    }
                    log::debug!(
                        "decode boundary error with {} bytes, reading another chunk",
                        bytes_read
                    );
                    window = err.into_bytes();
                }
                Err(_) => return Err(RedarcError::Format { bytes_read }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::write::ZstdEncoder;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;

    fn test_config(chunk_size: usize, max_window: u64) -> DecoderConfig {
        DecoderConfig {
            chunk_size,
            max_window,
            yield_trailing_line: false,
        }
    }

    fn raw_decoder(bytes: Vec<u8>, chunk_size: usize, max_window: u64) -> ChunkDecoder<CountingReader<Cursor<Vec<u8>>>> {
        let counting = CountingReader::new(Cursor::new(bytes));
        let position = counting.counter();
        ChunkDecoder::from_parts(counting, position, &test_config(chunk_size, max_window))
    }

    async fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZstdEncoder::new(Vec::new());
        encoder.write_all(data).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    async fn collect(decoder: &mut ChunkDecoder<impl AsyncRead + Unpin>) -> String {
        let mut out = String::new();
        while let Some(chunk) = decoder.next_chunk().await.unwrap() {
            out.push_str(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn decodes_archive_file_across_chunks() {
        let text = "hello archive\nwith multiple lines\n".repeat(100);
        let compressed = compress(text.as_bytes()).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.zst");
        std::fs::write(&path, &compressed).unwrap();

        let mut decoder = ChunkDecoder::open(&path, &test_config(64, 1024)).await.unwrap();
        let out = collect(&mut decoder).await;
        assert_eq!(out, text);
        // Position reflects compressed bytes consumed.
        assert_eq!(decoder.position(), compressed.len() as u64);
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks_decodes() {
        // "é" is two bytes; chunk_size 1 splits every multi-byte character.
        let text = "aéé";
        let mut decoder = raw_decoder(text.as_bytes().to_vec(), 1, 64);
        let out = collect(&mut decoder).await;
        assert_eq!(out, text);
    }

    #[tokio::test]
    async fn unresolvable_boundary_fails_with_format_error() {
        // Every 2-byte window ends mid-character, so the retry loop keeps
        // expanding until it passes the 6-byte bound. Must not hang.
        let bytes = vec![0x61, 0xC3, 0xA9, 0xC3, 0xA9, 0xC3, 0xA9, 0xC3, 0xA9, 0xC3];
        let mut decoder = raw_decoder(bytes, 2, 6);
        let err = decoder.next_chunk().await.unwrap_err();
        assert!(matches!(err, RedarcError::Format { bytes_read } if bytes_read > 6));
    }

    #[tokio::test]
    async fn invalid_bytes_fail_immediately() {
        // 0xFF can never begin a UTF-8 sequence; no amount of reading fixes it.
        let mut decoder = raw_decoder(vec![0xFF, 0x61, 0x62], 16, 1024);
        let err = decoder.next_chunk().await.unwrap_err();
        assert!(matches!(err, RedarcError::Format { .. }));
    }

    #[tokio::test]
    async fn partial_char_at_eof_is_dropped() {
        // Valid "ab" followed by the first byte of a 2-byte character.
        let mut decoder = raw_decoder(vec![0x61, 0x62, 0xC3], 16, 1024);
        assert_eq!(decoder.next_chunk().await.unwrap(), Some("ab".to_string()));
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_stream_yields_no_chunks() {
        let mut decoder = raw_decoder(Vec::new(), 16, 1024);
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
        assert_eq!(decoder.next_chunk().await.unwrap(), None);
    }
}
