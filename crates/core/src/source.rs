//! Source buffer.
//!
//! Files load once into a flat, append-only sequence of
//! `(path, line number, text)` records; the driver walks index ranges
//! over it, recursing into an included file's range at the include
//! site. A `Bookmark` is just an index into the sequence, stable for
//! the life of the assembly, so re-entry after an include costs
//! nothing. Loading the same path twice hands back the range already
//! loaded — each pass re-walks the same records.

use std::fs;
use std::ops::Range;
use std::path::Path;

/// Opaque handle to one loaded line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookmark(pub usize);

#[derive(Debug)]
struct SourceLine {
    file: usize,
    number: u32,
    text: String,
}

#[derive(Debug, Default)]
pub struct SourceFile {
    files: Vec<String>,
    ranges: Vec<Range<usize>>,
    lines: Vec<SourceLine>,
}

impl SourceFile {
    pub fn new() -> SourceFile {
        SourceFile::default()
    }

    /// Load a file, returning the range of its lines. A path that was
    /// already loaded returns its existing range without re-reading.
    pub fn load(&mut self, path: &Path) -> Result<Range<usize>, String> {
        let name = path.to_string_lossy().into_owned();

        if let Some(i) = self.files.iter().position(|f| *f == name) {
            return Ok(self.ranges[i].clone());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read from {name}: {e}"))?;

        let file = self.files.len();
        self.files.push(name);

        let start = self.lines.len();
        for (i, text) in contents.lines().enumerate() {
            self.lines.push(SourceLine {
                file,
                number: (i + 1) as u32,
                text: text.trim_end().to_string(),
            });
        }

        let range = start..self.lines.len();
        self.ranges.push(range.clone());
        Ok(range)
    }

    /// Load already-in-memory text under a display name. Used by tests
    /// and the library loader.
    pub fn load_str(&mut self, name: &str, contents: &str) -> Range<usize> {
        if let Some(i) = self.files.iter().position(|f| f == name) {
            return self.ranges[i].clone();
        }

        let file = self.files.len();
        self.files.push(name.to_string());

        let start = self.lines.len();
        for (i, text) in contents.lines().enumerate() {
            self.lines.push(SourceLine {
                file,
                number: (i + 1) as u32,
                text: text.trim_end().to_string(),
            });
        }

        let range = start..self.lines.len();
        self.ranges.push(range.clone());
        range
    }

    pub fn text(&self, bookmark: Bookmark) -> &str {
        &self.lines[bookmark.0].text
    }

    pub fn path(&self, bookmark: Bookmark) -> &str {
        &self.files[self.lines[bookmark.0].file]
    }

    pub fn line_number(&self, bookmark: Bookmark) -> u32 {
        self.lines[bookmark.0].number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_str() {
        let mut src = SourceFile::new();
        let range = src.load_str("main.asm", "one\ntwo\nthree\n");
        assert_eq!(range, 0..3);
        assert_eq!(src.text(Bookmark(1)), "two");
        assert_eq!(src.line_number(Bookmark(2)), 3);
        assert_eq!(src.path(Bookmark(0)), "main.asm");
    }

    #[test]
    fn test_reload_returns_same_range() {
        let mut src = SourceFile::new();
        let a = src.load_str("a.asm", "x\n");
        let b = src.load_str("b.asm", "y\ny\n");
        assert_eq!(src.load_str("a.asm", ""), a);
        assert_eq!(src.load_str("b.asm", ""), b);
    }

    #[test]
    fn test_trailing_whitespace_stripped() {
        let mut src = SourceFile::new();
        src.load_str("w.asm", " NOP \r\n");
        assert_eq!(src.text(Bookmark(0)), " NOP");
    }
}
