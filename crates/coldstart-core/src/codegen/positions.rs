use serde::{Deserialize, Serialize};

/// Filename reported for lines the generator wrote itself
pub const EMBEDDED_FILENAME: &str = "<embedded>";

/// Lines `[start_line, end_line)` of the script (1-based) hold the body of
/// `file`, whose first line is `offset` (0-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSpan {
    pub start_line: usize,
    pub end_line: usize,
    pub file: String,
    pub offset: usize,
}

/// Original location of a script line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub filename: String,
    pub line_number: usize,
}

/// Ordered, non-overlapping spans over the generated script. Lines outside
/// every span belong to the loader scaffolding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionTable {
    spans: Vec<PositionSpan>,
}

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a span. Spans must be pushed in script order; empty spans are
    /// dropped.
    pub fn push(&mut self, span: PositionSpan) {
        if span.start_line >= span.end_line {
            return;
        }
        debug_assert!(self
            .spans
            .last()
            .map_or(true, |last| last.end_line <= span.start_line));
        self.spans.push(span);
    }

    pub fn spans(&self) -> &[PositionSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Map a 1-based script line to its original file and 0-based line.
    /// Same algorithm as the `translateLineNumber` embedded in the script.
    pub fn translate(&self, line: usize) -> Translation {
        let found = self.spans.binary_search_by(|span| {
            if line < span.start_line {
                std::cmp::Ordering::Greater
            } else if line >= span.end_line {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        });

        match found {
            Ok(idx) => {
                let span = &self.spans[idx];
                Translation {
                    filename: span.file.clone(),
                    line_number: line - span.start_line + span.offset,
                }
            }
            Err(_) => Translation {
                filename: EMBEDDED_FILENAME.to_string(),
                line_number: line,
            },
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing plain structs of strings and integers cannot fail
        serde_json::to_string(&self.spans).unwrap_or_else(|_| "[]".to_string())
    }
}
