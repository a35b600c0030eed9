/// Splits an incrementally delivered byte stream into text lines.
///
/// Network chunks rarely line up with line boundaries, so bytes are held back
/// until a `\n` arrives. Splitting happens on raw bytes: a newline byte never
/// occurs inside a multi-byte UTF-8 sequence, so a character cut in half by a
/// chunk boundary is reassembled before it is decoded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed, without the
    /// trailing `\n` or `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(decode_line(&line[..end]));
        }
        lines
    }

    /// Returns the unterminated remainder, if any. Used once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }

    /// Drops whatever is still buffered.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&text).to_string()
}
