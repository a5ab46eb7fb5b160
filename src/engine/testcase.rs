//! Fixture parsing.
//!
//! A fixture holds one or more cases separated by a line that is exactly
//! `------`. Whitespace around each case is not significant.

pub const DELIMITER: &str = "------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// 1-based position in the input fixture.
    pub index: usize,
    pub input: String,
    pub expected_output: String,
}

/// Splits fixture text into trimmed, non-empty segments in order.
pub fn split_fixture(raw: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.split('\n') {
        if line.trim_end_matches('\r') == DELIMITER {
            push_segment(&mut segments, &current);
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_segment(&mut segments, &current);
    segments
}

fn push_segment(segments: &mut Vec<String>, lines: &[&str]) {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

/// Pairs input and expected-output segments by position, following the input
/// order. A missing expected segment becomes the empty string.
pub fn pair_cases(raw_input: &str, raw_expected: &str) -> Vec<TestCase> {
    let mut expected = split_fixture(raw_expected).into_iter();
    split_fixture(raw_input)
        .into_iter()
        .enumerate()
        .map(|(i, input)| TestCase {
            index: i + 1,
            input,
            expected_output: expected.next().unwrap_or_default(),
        })
        .collect()
}
