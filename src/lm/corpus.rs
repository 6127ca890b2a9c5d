//! Document store
//!
//! Open text documents keyed by URI. Each session owns its corpus; text is
//! only ever replaced wholesale.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorpusError {
    #[error("Document is not open: {0}")]
    NotOpen(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    version: i64,
}

impl Document {
    pub fn new(text: impl Into<String>, version: i64) -> Self {
        Self {
            text: text.into(),
            version,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Line `n` (zero-based) without its terminator
    pub fn line(&self, n: usize) -> Option<&str> {
        self.text
            .split('\n')
            .nth(n)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Identifier characters immediately left of the cursor. `None` when the
    /// position is outside the document.
    pub fn word_prefix(&self, line: usize, column: usize) -> Option<&str> {
        let (before, _) = self.window(line, column)?;
        let start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word_char(*c))
            .last()
            .map_or(before.len(), |(i, _)| i);
        Some(&before[start..])
    }

    /// Split the whole text at the cursor into (before, after). `column`
    /// counts UTF-16 code units, the LSP default position encoding.
    pub fn window(&self, line: usize, column: usize) -> Option<(&str, &str)> {
        let mut offset = 0;
        for (i, l) in self.text.split('\n').enumerate() {
            if i == line {
                let body = l.strip_suffix('\r').unwrap_or(l);
                let at = offset + byte_offset(body, column)?;
                return Some(self.text.split_at(at));
            }
            offset += l.len() + 1;
        }
        None
    }

    fn replace(&mut self, text: String, version: Option<i64>) {
        self.text = text;
        if let Some(v) = version {
            self.version = v;
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Byte offset of UTF-16 `column` in `line`. `None` past the end of the line
/// or between the halves of a surrogate pair.
fn byte_offset(line: &str, column: usize) -> Option<usize> {
    let mut units = 0;
    for (i, c) in line.char_indices() {
        if units == column {
            return Some(i);
        }
        units += c.len_utf16();
        if units > column {
            return None;
        }
    }
    (units == column).then_some(line.len())
}

#[derive(Debug, Default)]
pub struct Corpus {
    docs: HashMap<String, Document>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reopen) a document.
    pub fn open(&mut self, uri: impl Into<String>, text: impl Into<String>, version: i64) {
        self.docs.insert(uri.into(), Document::new(text, version));
    }

    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.docs.get(uri)
    }

    pub fn set_text(
        &mut self,
        uri: &str,
        text: impl Into<String>,
        version: Option<i64>,
    ) -> Result<(), CorpusError> {
        let doc = self
            .docs
            .get_mut(uri)
            .ok_or_else(|| CorpusError::NotOpen(uri.to_string()))?;
        doc.replace(text.into(), version);
        Ok(())
    }

    pub fn close(&mut self, uri: &str) -> Option<Document> {
        self.docs.remove(uri)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_set_close() {
        let mut corpus = Corpus::new();
        corpus.open("file:///a.py", "hello world", 1);
        assert_eq!(corpus.len(), 1);

        corpus
            .set_text("file:///a.py", "goodbye", Some(2))
            .unwrap();
        let doc = corpus.get("file:///a.py").unwrap();
        assert_eq!(doc.text(), "goodbye");
        assert_eq!(doc.version(), 2);

        assert_eq!(
            corpus.set_text("file:///b.py", "x", None),
            Err(CorpusError::NotOpen("file:///b.py".to_string()))
        );

        assert!(corpus.close("file:///a.py").is_some());
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_lines() {
        let doc = Document::new("first\r\nsecond\nthird", 0);
        assert_eq!(doc.line(0), Some("first"));
        assert_eq!(doc.line(1), Some("second"));
        assert_eq!(doc.line(3), None);
    }

    #[test]
    fn test_word_prefix() {
        let doc = Document::new("hello world\n  foo_bar.baz", 0);
        assert_eq!(doc.word_prefix(0, 5), Some("hello"));
        assert_eq!(doc.word_prefix(0, 3), Some("hel"));
        assert_eq!(doc.word_prefix(0, 6), Some(""));
        assert_eq!(doc.word_prefix(0, 11), Some("world"));
        assert_eq!(doc.word_prefix(1, 9), Some("foo_bar"));
        assert_eq!(doc.word_prefix(1, 12), Some("ba"));
        assert_eq!(doc.word_prefix(0, 12), None);
        assert_eq!(doc.word_prefix(2, 0), None);
    }

    #[test]
    fn test_word_prefix_counts_utf16_units() {
        let doc = Document::new("привет мир", 0);
        assert_eq!(doc.word_prefix(0, 3), Some("при"));
        assert_eq!(doc.word_prefix(0, 10), Some("мир"));

        // U+1F600 is two UTF-16 code units
        let doc = Document::new("\u{1F600} hello\n\u{1F600}ab", 0);
        assert_eq!(doc.word_prefix(0, 8), Some("hello"));
        assert_eq!(doc.word_prefix(0, 5), Some("he"));
        assert_eq!(doc.word_prefix(0, 1), None);
        assert_eq!(doc.word_prefix(1, 4), Some("ab"));
        assert_eq!(doc.window(1, 2), Some(("\u{1F600} hello\n\u{1F600}", "ab")));
    }

    #[test]
    fn test_window() {
        let doc = Document::new("ab\ncd", 0);
        assert_eq!(doc.window(1, 1), Some(("ab\nc", "d")));
        assert_eq!(doc.window(0, 2), Some(("ab", "\ncd")));
        assert_eq!(doc.window(0, 3), None);
    }
}
