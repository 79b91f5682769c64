use crate::error::TokenizeError;

use super::Segment;

/// Word-split one segment into program and arguments.
///
/// POSIX-style quoting and backslash escapes, no expansion of any kind.
pub fn tokenize(segment: &str) -> Result<Segment, TokenizeError> {
    let words = shlex::split(segment).ok_or_else(|| TokenizeError {
        segment: segment.to_string(),
        detail: "unbalanced quotes or trailing escape".into(),
    })?;

    let mut words = words.into_iter();
    let program = words.next().ok_or_else(|| TokenizeError {
        segment: segment.to_string(),
        detail: "empty command".into(),
    })?;

    Ok(Segment {
        text: segment.to_string(),
        program,
        args: words.collect(),
    })
}
