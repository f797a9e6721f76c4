//! Newline-delimited JSON with ASCII-only output.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::Formatter;

use crate::error::{AuditError, Result};

/// Compact formatter that writes every non-ASCII character as a `\uXXXX` escape.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

pub fn to_ascii_line<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter);
    value.serialize(&mut ser)?;
    // Only ASCII bytes are ever emitted.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Reads one value per non-blank line. A missing file reads as empty.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AuditError::io(path, e)),
    };

    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|source| AuditError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.push(value);
    }
    Ok(out)
}

/// Replaces `path` with one line per value, creating parent directories.
///
/// The file is rewritten in place; a crash mid-write can leave it truncated.
pub fn write_jsonl<T: Serialize>(path: &Path, values: &[T]) -> Result<()> {
    let mut body = String::new();
    for value in values {
        body.push_str(&to_ascii_line(value)?);
        body.push('\n');
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
    }
    fs::write(path, body).map_err(|e| AuditError::io(path, e))
}
