//! Indented text rendering.
//!
//! Query results and the firmware database are reported as plain text where
//! nesting is expressed by indentation. `IndentingWriter` owns the buffer and
//! the current indentation level; anything that knows how to describe itself
//! implements [`Render`].

/// Spaces emitted per indentation level.
const INDENT_WIDTH: usize = 4;

/// A string buffer that prefixes output with the current indentation.
///
/// Indentation is only applied at the start of a line (column 0), so several
/// `print` calls can build one line without re-indenting in the middle.
#[derive(Debug, Default)]
pub struct IndentingWriter {
    buffer: String,
    indentation: usize,
    column: usize,
}

impl IndentingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `contents` to the current line, indenting first when the line
    /// is empty.
    pub fn print(&mut self, contents: impl AsRef<str>) {
        let contents = contents.as_ref();
        if contents.is_empty() {
            return;
        }
        if self.column == 0 {
            let pad = self.indentation * INDENT_WIDTH;
            self.buffer.extend(std::iter::repeat(' ').take(pad));
            self.column = pad;
        }
        self.buffer.push_str(contents);
        match contents.rfind('\n') {
            Some(last) => self.column = contents.len() - last - 1,
            None => self.column += contents.len(),
        }
    }

    /// Append `contents` and terminate the line.
    pub fn println(&mut self, contents: impl AsRef<str>) {
        self.print(contents);
        self.buffer.push('\n');
        self.column = 0;
    }

    /// Increase the indentation applied to subsequent lines.
    pub fn indent(&mut self) {
        self.indentation += 1;
    }

    /// Decrease the indentation; saturates at zero.
    pub fn outdent(&mut self) {
        self.indentation = self.indentation.saturating_sub(1);
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

/// Write a textual description of `self` into an [`IndentingWriter`].
pub trait Render {
    fn render(&self, writer: &mut IndentingWriter);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_at_line_start_only() {
        let mut w = IndentingWriter::new();
        w.println("top");
        w.indent();
        w.print("left");
        w.print(" right");
        w.println("");
        w.outdent();
        w.println("bottom");
        assert_eq!(w.as_str(), "top\n    left right\nbottom\n");
    }

    #[test]
    fn nested_levels_accumulate() {
        let mut w = IndentingWriter::new();
        w.println("a");
        w.indent();
        w.println("b");
        w.indent();
        w.println("c");
        w.outdent();
        w.println("d");
        assert_eq!(w.as_str(), "a\n    b\n        c\n    d\n");
    }

    #[test]
    fn outdent_saturates_at_zero() {
        let mut w = IndentingWriter::new();
        w.outdent();
        w.println("still left");
        assert_eq!(w.as_str(), "still left\n");
    }

    #[test]
    fn embedded_newline_resets_column() {
        let mut w = IndentingWriter::new();
        w.indent();
        w.print("one\ntwo");
        w.print("-three");
        let text = w.into_string();
        // Only the first line of a multi-line print is indented.
        assert_eq!(text, "    one\ntwo-three");
    }

    #[test]
    fn empty_print_does_not_indent() {
        let mut w = IndentingWriter::new();
        w.indent();
        w.print("");
        assert_eq!(w.as_str(), "");
    }
}
