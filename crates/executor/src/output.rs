//! Bounded buffer for combined stdout/stderr capture (§4.6 output semantics).

const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
const TRUNCATION_MARKER: &str = "[truncated]";

/// Accumulates bytes up to a cap, appending a marker once truncation
/// happens. Used to bound the tail kept in memory for an [`ExecutionResult`]
/// while the full stream is written to the log file unbounded.
#[derive(Debug)]
pub struct CappedBuffer {
    max_bytes: usize,
    data: Vec<u8>,
    truncated: bool,
}

impl CappedBuffer {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes, data: Vec::new(), truncated: false }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.truncated {
            return;
        }
        let remaining = self.max_bytes.saturating_sub(self.data.len());
        if chunk.len() <= remaining {
            self.data.extend_from_slice(chunk);
        } else {
            self.data.extend_from_slice(&chunk[..remaining]);
            self.truncated = true;
        }
    }

    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Render the buffer as lossy UTF-8, appending the truncation marker if
    /// the cap was hit.
    #[must_use]
    pub fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.data).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

impl Default for CappedBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}
