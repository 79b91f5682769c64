use crate::error::ParseError;

/// Characters that open and close a quoted span.
pub const QUOTE_CHARS: [char; 3] = ['\'', '"', '`'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    NoQuote,
    InQuote(char),
}

/// Split a command line on unquoted pipe characters.
///
/// Handles:
/// - Simple pipes: cmd1 | cmd2
/// - Quoted pipes: grep 'a|b' | wc -l (the | in quotes is NOT a delimiter)
/// - Three quote chars (' " `); a span only closes on the char that opened it
///
/// Quote characters stay in the segment text so the tokenizer sees them.
/// A blank line yields no segments, which callers treat as the identity
/// pipeline.
pub fn split_segments(line: &str) -> Result<Vec<String>, ParseError> {
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut state = QuoteState::NoQuote;

    for ch in line.chars() {
        match (state, ch) {
            (QuoteState::NoQuote, q) if QUOTE_CHARS.contains(&q) => {
                state = QuoteState::InQuote(q);
                current.push(q);
            }
            (QuoteState::InQuote(open), q) if QUOTE_CHARS.contains(&q) => {
                if q != open {
                    return Err(ParseError::MismatchedQuote {
                        opened: open,
                        attempted: q,
                    });
                }
                state = QuoteState::NoQuote;
                current.push(q);
            }
            (QuoteState::NoQuote, '|') => {
                segments.push(take_segment(&mut current)?);
            }
            (_, c) => current.push(c),
        }
    }

    if let QuoteState::InQuote(quote) = state {
        return Err(ParseError::UnterminatedQuote { quote });
    }

    segments.push(take_segment(&mut current)?);
    Ok(segments)
}

fn take_segment(current: &mut String) -> Result<String, ParseError> {
    let segment = current.trim().to_string();
    current.clear();
    if segment.is_empty() {
        return Err(ParseError::EmptySegment);
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_pipe() {
        assert_eq!(
            split_segments("cat | sort | uniq -c").unwrap(),
            vec!["cat", "sort", "uniq -c"]
        );
    }

    #[test]
    fn test_quoted_pipe_not_split() {
        assert_eq!(
            split_segments("grep 'a|b' | wc -l").unwrap(),
            vec!["grep 'a|b'", "wc -l"]
        );
        assert_eq!(
            split_segments("grep \"x|y\"").unwrap(),
            vec!["grep \"x|y\""]
        );
        assert_eq!(split_segments("echo `a|b`").unwrap(), vec!["echo `a|b`"]);
    }

    #[test]
    fn test_other_quote_inside_span_is_mismatch() {
        assert_eq!(
            split_segments("grep \"foo`").unwrap_err(),
            ParseError::MismatchedQuote {
                opened: '"',
                attempted: '`'
            }
        );
        assert!(matches!(
            split_segments("echo \"it's\""),
            Err(ParseError::MismatchedQuote { .. })
        ));
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            split_segments("grep 'foo").unwrap_err(),
            ParseError::UnterminatedQuote { quote: '\'' }
        );
    }

    #[test]
    fn test_empty_segments() {
        for line in ["| wc -l", "cat || wc", "cat |   | wc", "cat |", "|", " | | "] {
            assert_eq!(
                split_segments(line).unwrap_err(),
                ParseError::EmptySegment,
                "line: {:?}",
                line
            );
        }
    }

    #[test]
    fn test_blank_line_is_identity() {
        assert!(split_segments("").unwrap().is_empty());
        assert!(split_segments("   \t ").unwrap().is_empty());
    }

    #[test]
    fn test_segments_trimmed() {
        assert_eq!(
            split_segments("  sort -r   |   head -n 3  ").unwrap(),
            vec!["sort -r", "head -n 3"]
        );
    }

    fn arg() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]{1,3}",
            "'[a-z |]{0,3}'",
            "\"[a-z |]{0,3}\"",
        ]
    }

    /// A program word followed by up to two args, some quoted.
    fn stage() -> impl Strategy<Value = String> {
        ("[a-z]{1,3}", prop::collection::vec(arg(), 0..3)).prop_map(|(program, args)| {
            let mut stage = program;
            for arg in args {
                stage.push(' ');
                stage.push_str(&arg);
            }
            stage
        })
    }

    proptest! {
        #[test]
        fn prop_segment_count_is_unquoted_pipes_plus_one(
            stages in prop::collection::vec(stage(), 1..6)
        ) {
            // Pipes inside quoted args never split; only the joins count.
            let line = stages.join(" | ");
            let segments = split_segments(&line).unwrap();
            prop_assert_eq!(segments.len(), stages.len());
            prop_assert_eq!(segments, stages);
        }

        #[test]
        fn prop_scanner_never_panics(line in "[a|'\"` ]{0,12}") {
            if let Ok(segments) = split_segments(&line) {
                for s in segments {
                    prop_assert!(!s.is_empty());
                    prop_assert_eq!(s.trim(), s.as_str());
                }
            }
        }
    }
}
