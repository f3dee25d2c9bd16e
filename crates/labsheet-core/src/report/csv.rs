//! Delimited-text writing and reading.

use std::borrow::Cow;
use std::io::{self, Write};

use super::{ReportError, ReportResult};

/// Escape a string for CSV output.
pub fn escape_csv(s: &str) -> Cow<'_, str> {
    if s.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        Cow::Owned(format!("\"{}\"", s.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(s)
    }
}

/// Write one comma-separated line terminated by `\n`.
pub fn write_csv_row<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        out.write_all(escape_csv(field.as_ref()).as_bytes())?;
    }
    out.write_all(b"\n")
}

/// Split CSV text into records of fields.
///
/// Accepts quoted fields with doubled quotes and embedded newlines, and both
/// `\n` and `\r\n` line endings. Blank lines are skipped.
pub fn parse_csv(text: &str) -> ReportResult<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Set between a closing quote and the next delimiter.
    let mut closed = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => {
                    in_quotes = false;
                    closed = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        let delimiter = c == ',' || c == '\n' || (c == '\r' && chars.peek() == Some(&'\n'));
        if closed && !delimiter {
            return Err(ReportError::MalformedInput(format!(
                "line {line}: text after closing quote"
            )));
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            '"' => {
                return Err(ReportError::MalformedInput(format!(
                    "line {line}: quote inside unquoted field"
                )))
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                closed = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
                closed = false;
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ReportError::MalformedInput(format!(
            "line {line}: unterminated quoted field"
        )));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }
    Ok(records)
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.len() == 1 && record[0].is_empty();
    if !blank {
        records.push(record);
    }
}
