//! An indenting text sink for generated GPU source.

/// Accumulates source text with block-scoped indentation.
///
/// Blocks use the closure form: the header line is written, an opening
/// brace follows on its own line, the body runs at one deeper indent, and
/// the closing brace restores the level.
#[derive(Debug)]
pub struct Writer {
    indent_factor: usize,
    indent: usize,
    buffer: String,
}

impl Default for Writer {
    fn default() -> Self {
        Writer::new()
    }
}

impl Writer {
    /// A writer with the default two-space indent.
    #[must_use]
    pub fn new() -> Self {
        Writer::with_indent_factor(2)
    }

    /// A writer with a custom indent width.
    #[must_use]
    pub fn with_indent_factor(indent_factor: usize) -> Self {
        Writer { indent_factor, indent: 0, buffer: String::new() }
    }

    /// Append one indented line.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent_factor * self.indent {
                self.buffer.push(' ');
            }
            self.buffer.push_str(text);
        }
        self.buffer.push('\n');
    }

    /// Append an empty line.
    pub fn new_line(&mut self) {
        self.buffer.push('\n');
    }

    /// Append an unroll pragma, with an explicit factor when given.
    pub fn pragma_unroll(&mut self, factor: Option<u32>) {
        match factor {
            Some(factor) => self.line(format!("#pragma unroll {factor}")),
            None => self.line("#pragma unroll"),
        }
    }

    /// Run `body` inside a braced block. An empty `header` yields an
    /// anonymous block.
    pub fn block<R>(&mut self, header: &str, body: impl FnOnce(&mut Writer) -> R) -> R {
        if !header.is_empty() {
            self.line(header);
        }
        self.line("{");
        self.indent += 1;
        let result = body(self);
        self.indent -= 1;
        self.line("}");
        result
    }

    /// The accumulated source.
    pub fn src(&self) -> &str {
        &self.buffer
    }

    /// Consume the writer, returning the source.
    #[must_use]
    pub fn into_src(self) -> String {
        self.buffer
    }
}
