/// String builder that knows which script line it is on
#[derive(Debug)]
pub struct ScriptWriter {
    output: String,
    /// 1-based number of the line the next write lands on
    line: usize,
}

impl ScriptWriter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            line: 1,
        }
    }

    pub fn current_line(&self) -> usize {
        self.line
    }

    /// Write `text` followed by a newline. `text` may itself span lines.
    pub fn writeln(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
        self.line += 1 + count_line_breaks(text);
    }

    /// Write `code` line by line and return the `[start, end)` line range it
    /// occupies
    pub fn write_block(&mut self, code: &str) -> (usize, usize) {
        let start = self.line;
        for line in code.lines() {
            self.writeln(line.strip_suffix('\r').unwrap_or(line));
        }
        (start, self.line)
    }

    pub fn finish(self) -> String {
        self.output
    }
}

/// Line terminators as JavaScript counts them: `\n`, `\r\n`, a lone `\r`,
/// U+2028 and U+2029. A trailing `\r` pairs with the newline `writeln` adds.
fn count_line_breaks(text: &str) -> usize {
    let mut chars = text.chars().peekable();
    let mut count = 0;
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\u{2028}' | '\u{2029}' => count += 1,
            '\r' if chars.peek().is_some_and(|&next| next != '\n') => count += 1,
            _ => {}
        }
    }
    count
}

impl Default for ScriptWriter {
    fn default() -> Self {
        Self::new()
    }
}
