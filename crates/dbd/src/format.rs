//! Delimited output.
//!
//! The [`Formatter`] writes lines separated by the line separator and cells separated by
//! the column separator. The first line has no leading separator; every later line,
//! including a header that follows rows of an earlier query, is preceded by exactly one.
//! The trailing separator is written once, by [`Formatter::finish`].

use crate::driver::{Cell, RowSink};
use crate::encoding::Encoding;
use crate::error::DbdResult;
use std::io::Write;

pub const DEFAULT_COLUMN_SEPARATOR: &str = "\t";
pub const DEFAULT_LINE_SEPARATOR: &str = "\n";

/// Output shaping options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub column_separator: String,
    pub line_separator: String,
    /// Omit the line separator after the last line.
    pub no_end_of_line: bool,
    /// Emit column names before the rows of each selection.
    pub header: bool,
    pub encoding: Encoding,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            column_separator: DEFAULT_COLUMN_SEPARATOR.to_string(),
            line_separator: DEFAULT_LINE_SEPARATOR.to_string(),
            no_end_of_line: false,
            header: false,
            encoding: Encoding::default(),
        }
    }
}

/// Streams lines to `W` in emission order.
#[derive(Debug)]
pub struct Formatter<W: Write> {
    out: W,
    options: OutputOptions,
    started: bool,
}

impl<W: Write> Formatter<W> {
    pub fn new(out: W, options: OutputOptions) -> Self {
        Self {
            out,
            options,
            started: false,
        }
    }

    fn begin_line(&mut self) -> DbdResult<()> {
        if self.started {
            self.out.write_all(self.options.line_separator.as_bytes())?;
        }
        self.started = true;
        Ok(())
    }

    fn write_cells<'a, I>(&mut self, cells: I, encode: bool) -> DbdResult<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for (i, cell) in cells.into_iter().enumerate() {
            if i > 0 {
                self.out.write_all(self.options.column_separator.as_bytes())?;
            }
            if encode {
                self.out.write_all(&self.options.encoding.encode(cell))?;
            } else {
                self.out.write_all(cell)?;
            }
        }
        Ok(())
    }

    /// One line of already-escaped values, written verbatim.
    pub fn write_escaped<S: AsRef<str>>(&mut self, values: &[S]) -> DbdResult<()> {
        self.begin_line()?;
        self.write_cells(values.iter().map(|v| v.as_ref().as_bytes()), false)
    }

    /// An affected-row count as a decimal line.
    pub fn write_count(&mut self, count: u64) -> DbdResult<()> {
        self.begin_line()?;
        write!(self.out, "{count}")?;
        Ok(())
    }

    /// Write the trailing line separator (unless disabled) and flush.
    pub fn finish(&mut self) -> DbdResult<()> {
        if !self.options.no_end_of_line {
            self.out.write_all(self.options.line_separator.as_bytes())?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RowSink for Formatter<W> {
    fn columns(&mut self, names: &[String]) -> DbdResult<()> {
        if !self.options.header {
            return Ok(());
        }
        self.begin_line()?;
        self.write_cells(names.iter().map(|n| n.as_bytes()), true)
    }

    fn row(&mut self, cells: &[Cell]) -> DbdResult<()> {
        self.begin_line()?;
        self.write_cells(cells.iter().map(|c| c.as_deref().unwrap_or_default()), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter(options: OutputOptions) -> Formatter<Vec<u8>> {
        Formatter::new(Vec::new(), options)
    }

    fn output(f: Formatter<Vec<u8>>) -> String {
        String::from_utf8(f.into_inner()).unwrap()
    }

    fn cells(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Some(v.as_bytes().to_vec())).collect()
    }

    #[test]
    fn header_then_rows_without_leading_separator() {
        let mut f = formatter(OutputOptions {
            header: true,
            ..Default::default()
        });
        f.columns(&["id".into(), "name".into()]).unwrap();
        f.row(&cells(&["1", "alice"])).unwrap();
        f.row(&cells(&["2", "bob"])).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "id\tname\n1\talice\n2\tbob\n");
    }

    #[test]
    fn header_is_suppressed_by_default() {
        let mut f = formatter(OutputOptions::default());
        f.columns(&["id".into()]).unwrap();
        f.row(&cells(&["1"])).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "1\n");
    }

    #[test]
    fn consecutive_selections_share_one_stream() {
        let mut f = formatter(OutputOptions {
            column_separator: ",".into(),
            line_separator: ";".into(),
            ..Default::default()
        });
        f.columns(&["a".into()]).unwrap();
        f.row(&cells(&["1", "2"])).unwrap();
        f.columns(&["b".into()]).unwrap();
        f.row(&cells(&["3", "4"])).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "1,2;3,4;");
    }

    #[test]
    fn second_header_is_separated_from_earlier_rows() {
        let mut f = formatter(OutputOptions {
            header: true,
            ..Default::default()
        });
        f.columns(&["a".into()]).unwrap();
        f.row(&cells(&["1"])).unwrap();
        f.columns(&["b".into()]).unwrap();
        f.row(&cells(&["2"])).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "a\n1\nb\n2\n");
    }

    #[test]
    fn cells_are_encoded_and_null_is_empty() {
        let mut f = formatter(OutputOptions::default());
        f.row(&[Some(b"a\tb".to_vec()), None, Some(b"c".to_vec())]).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "a\\tb\t\tc\n");

        let mut f = formatter(OutputOptions {
            encoding: Encoding::Base64,
            header: true,
            ..Default::default()
        });
        f.columns(&["v".into()]).unwrap();
        f.row(&cells(&["ab"])).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "dg==\nYWI=\n");
    }

    #[test]
    fn no_end_of_line_and_empty_result() {
        let mut f = formatter(OutputOptions {
            no_end_of_line: true,
            ..Default::default()
        });
        f.row(&cells(&["x"])).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "x");

        // Nothing selected: only the trailing separator.
        let mut f = formatter(OutputOptions::default());
        f.finish().unwrap();
        assert_eq!(output(f), "\n");
    }

    #[test]
    fn escaped_values_are_not_encoded() {
        let mut f = formatter(OutputOptions::default());
        f.write_escaped(&["john'';drop table users", "a\"b"]).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "john'';drop table users\ta\"b\n");
    }

    #[test]
    fn count_line() {
        let mut f = formatter(OutputOptions::default());
        f.write_count(0).unwrap();
        f.finish().unwrap();
        assert_eq!(output(f), "0\n");
    }
}
