//! What the presentation layer shows: the last good output and the current
//! error annotation.

use crate::executor::PipelineResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    /// Last successful output, trailing newline trimmed.
    pub output: String,
    /// The same output exactly as the pipeline produced it.
    pub raw: Vec<u8>,
    /// Message from the most recent failure, cleared by the next trigger or
    /// success.
    pub error: Option<String>,
    pub show_line_numbers: bool,
}

impl DisplayState {
    pub fn new(show_line_numbers: bool) -> Self {
        Self {
            show_line_numbers,
            ..Self::default()
        }
    }

    /// Fold a result in. A failure never replaces the output.
    pub fn apply(&mut self, result: &PipelineResult) {
        match result {
            PipelineResult::Output(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                self.output = text.strip_suffix('\n').unwrap_or(&text).to_string();
                self.raw = bytes.clone();
                self.error = None;
            }
            PipelineResult::Failure(failure) => {
                self.error = Some(failure.message.clone());
            }
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn line_count(&self) -> usize {
        count_lines(&self.output)
    }

    /// Output as it should be shown, numbered if enabled.
    pub fn rendered(&self) -> String {
        if self.show_line_numbers {
            add_line_numbers(&self.output)
        } else {
            self.output.clone()
        }
    }
}

pub fn count_lines(s: &str) -> usize {
    if s.is_empty() {
        return 0;
    }
    let count = s.matches('\n').count();
    if s.ends_with('\n') {
        count
    } else {
        count + 1
    }
}

/// Prefix each line with its 1-based number, right-aligned to the widest.
pub fn add_line_numbers(content: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let width = lines.len().to_string().len();

    let mut out = String::with_capacity(content.len() + lines.len() * (width + 2));
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{:>width$} {}\n", i + 1, line, width = width));
    }
    out
}
