//! Line-oriented flat-file backend.

use super::{RowReader, RowWriter};
use crate::error::DbError;
use std::io::{BufRead, Write};

/// Writes one row per line.
pub struct FlatFileWriter<W: Write> {
    out: W,
    row: String,
    /// Set once the trailing string was written.
    closed: bool,
}

impl<W: Write> FlatFileWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            row: String::new(),
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn push_field(&mut self, field: &str) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Unencodable(field.to_string()));
        }
        self.row.push(' ');
        self.row.push_str(field);
        Ok(())
    }
}

impl<W: Write> RowWriter for FlatFileWriter<W> {
    fn start_row(&mut self, kind: &str) -> Result<(), DbError> {
        self.row.clear();
        self.row.push_str(kind);
        self.closed = false;
        Ok(())
    }

    fn write_word(&mut self, word: &str) -> Result<(), DbError> {
        if word.is_empty() || word.contains(char::is_whitespace) {
            return Err(DbError::Unencodable(word.to_string()));
        }
        self.push_field(word)
    }

    fn write_str(&mut self, s: &str) -> Result<(), DbError> {
        self.push_field(&escape(s))?;
        self.closed = true;
        Ok(())
    }

    fn write_int(&mut self, n: i64) -> Result<(), DbError> {
        self.push_field(&n.to_string())
    }

    fn write_uint(&mut self, n: u64) -> Result<(), DbError> {
        self.push_field(&n.to_string())
    }

    fn write_time(&mut self, t: i64) -> Result<(), DbError> {
        self.write_int(t)
    }

    fn commit_row(&mut self) -> Result<(), DbError> {
        self.row.push('\n');
        self.out.write_all(self.row.as_bytes())?;
        self.row.clear();
        Ok(())
    }

    fn discard_row(&mut self) {
        self.row.clear();
        self.closed = false;
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse of [`escape`]. Unknown escapes keep the escaped character.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// One parsed line: its type word and the unread remainder.
#[derive(Debug)]
pub struct FlatRow {
    line: usize,
    text: String,
    /// Byte offset of the unread remainder.
    pos: usize,
}

impl FlatRow {
    fn new(line: usize, text: String) -> Self {
        Self { line, text, pos: 0 }
    }

    /// Row type; consumes the first word.
    pub fn kind(&mut self) -> Result<String, DbError> {
        self.read_word().map(str::to_string)
    }
}

impl RowReader for FlatRow {
    fn line(&self) -> usize {
        self.line
    }

    fn read_word(&mut self) -> Result<&str, DbError> {
        let rest = &self.text[self.pos..];
        let skipped = rest.len() - rest.trim_start_matches(' ').len();
        let start = self.pos + skipped;
        let tail = &self.text[start..];
        let len = tail.find(' ').unwrap_or(tail.len());
        if len == 0 {
            return Err(DbError::parse(self.line, "missing field"));
        }
        self.pos = start + len;
        Ok(&self.text[start..start + len])
    }

    fn read_str(&mut self) -> Result<String, DbError> {
        let rest = &self.text[self.pos..];
        let start = self.pos + usize::from(rest.starts_with(' '));
        self.pos = self.text.len();
        Ok(unescape(&self.text[start..]))
    }
}

/// Yields one [`FlatRow`] per non-empty line.
pub struct FlatFileReader<R: BufRead> {
    input: R,
    line: usize,
}

impl<R: BufRead> FlatFileReader<R> {
    pub fn new(input: R) -> Self {
        Self { input, line: 0 }
    }
}

impl<R: BufRead> Iterator for FlatFileReader<R> {
    type Item = Result<FlatRow, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buf = String::new();
            match self.input.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;
            let text = buf.trim_end_matches(['\n', '\r']);
            if text.is_empty() {
                continue;
            }
            return Some(Ok(FlatRow::new(self.line, text.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_string_keeps_spaces() {
        let mut w = FlatFileWriter::new(Vec::new());
        w.start_row("MDU").unwrap();
        w.write_word("alice").unwrap();
        w.write_word("private:mark:reason").unwrap();
        w.write_str(" spammed  #help").unwrap();
        w.commit_row().unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out, "MDU alice private:mark:reason  spammed  #help\n");

        let mut rows = FlatFileReader::new(out.as_bytes());
        let mut row = rows.next().unwrap().unwrap();
        assert_eq!(row.kind().unwrap(), "MDU");
        assert_eq!(row.read_word().unwrap(), "alice");
        assert_eq!(row.read_word().unwrap(), "private:mark:reason");
        assert_eq!(row.read_str().unwrap(), " spammed  #help");
        assert!(rows.next().is_none());
    }

    #[test]
    fn words_must_be_single_tokens() {
        let mut w = FlatFileWriter::new(Vec::new());
        w.start_row("AC").unwrap();
        assert!(matches!(w.write_word(""), Err(DbError::Unencodable(_))));
        assert!(matches!(w.write_word("a b"), Err(DbError::Unencodable(_))));
        w.write_str("tail").unwrap();
        assert!(matches!(w.write_word("late"), Err(DbError::Unencodable(_))));
    }

    #[test]
    fn line_breaks_in_strings_are_escaped() {
        let text = "first\nsecond\r\\n literal";
        let mut w = FlatFileWriter::new(Vec::new());
        w.start_row("ME").unwrap();
        w.write_word("bob").unwrap();
        w.write_str(text).unwrap();
        w.commit_row().unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 1);

        let mut rows = FlatFileReader::new(out.as_bytes());
        let mut row = rows.next().unwrap().unwrap();
        assert_eq!(row.kind().unwrap(), "ME");
        assert_eq!(row.read_word().unwrap(), "bob");
        assert_eq!(row.read_str().unwrap(), text);
    }

    #[test]
    fn discarded_row_is_not_written() {
        let mut w = FlatFileWriter::new(Vec::new());
        w.start_row("AC").unwrap();
        w.write_word("bob").unwrap();
        w.discard_row();
        w.start_row("NAM").unwrap();
        w.write_word("old").unwrap();
        w.commit_row().unwrap();
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "NAM old\n");
    }

    #[test]
    fn missing_and_malformed_fields_report_line() {
        let input = "\nDBV x\n";
        let mut rows = FlatFileReader::new(input.as_bytes());
        let mut row = rows.next().unwrap().unwrap();
        assert_eq!(row.kind().unwrap(), "DBV");
        assert!(matches!(row.read_int(), Err(DbError::Parse { line: 2, .. })));
        assert!(matches!(row.read_word(), Err(DbError::Parse { line: 2, .. })));
    }
}
