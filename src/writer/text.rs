/// Line-oriented output with two-space indentation.
#[derive(Clone, Debug, Default)]
pub struct TextBuffer {
    lines: Vec<String>,
    indent: usize,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
            return;
        }
        self.lines.push(format!("{}{}", "  ".repeat(self.indent), text));
    }

    pub fn lines(&mut self, lines: impl IntoIterator<Item = String>) {
        for l in lines {
            self.line(l);
        }
    }

    /// Separate sections by one empty line; never at the start, never doubled.
    pub fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn finish(&self) -> String {
        let end = self
            .lines
            .iter()
            .rposition(|l| !l.is_empty())
            .map_or(0, |i| i + 1);
        let mut out = String::new();
        for l in &self.lines[..end] {
            out.push_str(l);
            out.push('\n');
        }
        out
    }
}
