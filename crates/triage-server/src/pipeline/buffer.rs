//! Accumulates streamed model text until it holds a complete report.

use serde_json::Value;

/// Text accumulator for the streaming strategy.
///
/// Fragments are appended as they arrive. Whenever the buffer contains a
/// closing brace a parse is attempted; each parsed object is removed along
/// with the text before it, and whatever follows it stays buffered for the
/// next report. A buffer that grows past `limit` characters without parsing
/// is dropped.
#[derive(Debug)]
pub struct ReportBuffer {
    text: String,
    limit: usize,
}

impl ReportBuffer {
    /// Empty buffer holding at most `limit` characters.
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    /// Append a fragment and return every report it completes, in order.
    pub fn push(&mut self, fragment: &str) -> Vec<Value> {
        self.text.push_str(fragment);
        let mut reports = Vec::new();
        while let Some(report) = self.take_report() {
            reports.push(report);
        }
        if self.text.chars().count() > self.limit {
            tracing::debug!(len = self.text.len(), "discarding unparseable stream buffer");
            self.text.clear();
        }
        reports
    }

    /// Remove the first complete object from the buffer, along with the
    /// text before it. A brace that cannot start valid JSON is skipped.
    fn take_report(&mut self) -> Option<Value> {
        let mut from = 0;
        loop {
            let start = from + self.text[from..].find('{')?;
            let (parsed, consumed) = {
                let mut values =
                    serde_json::Deserializer::from_str(&self.text[start..]).into_iter::<Value>();
                let parsed = values.next()?;
                (parsed, values.byte_offset())
            };
            match parsed {
                Ok(report) => {
                    let _ = self.text.drain(..start + consumed);
                    return Some(report);
                }
                Err(e) if e.is_eof() => return None,
                Err(_) => from = start + 1,
            }
        }
    }

    /// Drop whatever is buffered.
    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Buffered text.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}
