/// Longest run of bytes kept while waiting for a terminator.
pub(crate) const MAX_PENDING: usize = 4096;

/// Reassembles lines from arbitrarily fragmented reads.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        // noise without a newline: drop it rather than grow forever
        if self.pending.len() > MAX_PENDING && !self.pending.contains(&b'\n') {
            self.pending.clear();
        }
    }

    /// Next complete, non-empty line without its `\n` / `\r\n` terminator.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        loop {
            let pos = self.pending.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
