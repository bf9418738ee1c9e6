//! Polling-based collaboration file tailer.
//!
//! The speech-to-text tool appends one CSV caption line per utterance to a
//! shared file. The tailer checks the file every `poll_interval`, reads the
//! bytes appended since the last check, and forwards every complete
//! (newline-terminated) line to the ingress queue unchanged.
//!
//! A shrinking file is treated as a rewrite and re-read from the start.
//! A missing file is waited for.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::Ingress;

/// Tails a collaboration file and yields newly appended lines.
#[derive(Debug)]
pub struct CollabFileTailer {
    path: PathBuf,
    poll_interval: Duration,
    /// Bytes of the file already consumed
    offset: u64,
    /// Trailing bytes of an incomplete line
    partial: Vec<u8>,
}

impl CollabFileTailer {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            offset: 0,
            partial: Vec::new(),
        }
    }

    /// Path being tailed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read everything appended since the previous poll.
    ///
    /// Returns the complete lines found, in file order, with line terminators
    /// and a leading UTF-8 BOM removed. Blank lines are skipped.
    pub async fn poll_once(&mut self) -> std::io::Result<Vec<String>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.offset > 0 {
                    info!(path = %self.path.display(), "Collaboration file removed, waiting for it to reappear");
                }
                self.reset();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        if len < self.offset {
            info!(
                path = %self.path.display(),
                previous = self.offset,
                current = len,
                "Collaboration file truncated, re-reading from start"
            );
            self.reset();
        }

        if len == self.offset {
            return Ok(Vec::new());
        }

        let from_start = self.offset == 0;
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut buf = Vec::with_capacity(usize::try_from(len - self.offset).unwrap_or(0));
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;

        if from_start && buf.starts_with(UTF8_BOM) {
            buf.drain(..UTF8_BOM.len());
        }

        self.partial.extend_from_slice(&buf);
        Ok(self.take_complete_lines())
    }

    /// Poll until cancelled, forwarding every new line to `ingress`.
    ///
    /// Returns the number of lines forwarded.
    pub async fn run(mut self, ingress: Ingress, cancel_token: CancellationToken) -> u64 {
        info!(path = %self.path.display(), interval_ms = self.poll_interval.as_millis() as u64, "Collaboration file tailer started");

        let mut forwarded = 0u64;
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!(forwarded, "[Tailer] Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {}
            }

            let lines = match self.poll_once().await {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to read collaboration file, will retry");
                    continue;
                }
            };

            for line in lines {
                if ingress.enqueue(line).is_err() {
                    info!(forwarded, "[Tailer] Delivery queue closed, stopping");
                    return forwarded;
                }
                forwarded += 1;
            }
        }

        forwarded
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.partial.clear();
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let remainder = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, remainder);

        let lines: Vec<String> = complete
            .split(|b| *b == b'\n')
            .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\r').to_string())
            .filter(|line| !line.trim().is_empty())
            .collect();

        debug!(count = lines.len(), "Read caption lines from collaboration file");
        lines
    }
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Delete the collaboration file so a session starts from an empty feed.
///
/// Returns `true` if a file was removed.
pub fn clear_collaboration_file(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Cleared collaboration file");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
