//! Streaming mbox framing.
//!
//! Splits an mbox file into raw messages one at a time. Never loads the
//! whole file into memory. Tolerant of malformed input.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::warn;

use crate::error::{ConvertError, Result};

/// Default read buffer size (1 MB for fast sequential reads on modern SSDs).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

/// How many leading bytes are inspected when sniffing a file.
const SNIFF_LEN: usize = 4096;

/// One framed message.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Byte offset of the `From ` separator line within the mbox.
    pub offset: u64,
    /// The separator line, without its line ending.
    pub separator: String,
    /// Message bytes (headers + body) without the separator line.
    pub bytes: Vec<u8>,
    /// Set when the message exceeded the size limit. Its bytes are dropped.
    pub truncated: bool,
}

/// Iterator over the messages of an mbox stream.
///
/// Tolerates:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - Truncated messages at EOF
/// - NUL bytes and other binary content in the body
/// - UTF-8 BOM at the start of the file
pub struct MboxReader<R> {
    reader: R,
    max_message_size: usize,
    offset: u64,
    prev_line_was_empty: bool,
    /// Separator line that opened the message being accumulated.
    pending: Option<(u64, Vec<u8>)>,
    line_buf: Vec<u8>,
    done: bool,
}

impl MboxReader<BufReader<File>> {
    /// Open an mbox file on disk.
    pub fn open(path: &Path, read_buffer_size: usize, max_message_size: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
        Ok(Self::new(
            BufReader::with_capacity(read_buffer_size, file),
            max_message_size,
        ))
    }
}

impl<R: BufRead> MboxReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            max_message_size,
            offset: 0,
            prev_line_was_empty: true,
            pending: None,
            line_buf: Vec::with_capacity(4096),
            done: false,
        }
    }

    /// Read one line (including its terminator) into `line_buf`.
    /// Returns `false` at EOF.
    fn read_line(&mut self) -> std::io::Result<bool> {
        self.line_buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.line_buf)?;
        Ok(n > 0)
    }

    fn next_message(&mut self) -> std::io::Result<Option<RawMessage>> {
        let mut body: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut truncated = false;

        loop {
            if !self.read_line()? {
                self.done = true;
                return Ok(self.pending.take().map(|(offset, sep)| {
                    finish_message(offset, &sep, body, truncated)
                }));
            }

            let line_offset = self.offset;
            self.offset += self.line_buf.len() as u64;
            let is_separator = is_mbox_separator(&self.line_buf);

            if is_separator {
                if self.pending.is_some() && !self.prev_line_was_empty {
                    warn!(
                        offset = line_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                self.prev_line_was_empty = false;
                let previous = self.pending.replace((line_offset, self.line_buf.clone()));
                if let Some((offset, sep)) = previous {
                    return Ok(Some(finish_message(offset, &sep, body, truncated)));
                }
                continue;
            }

            self.prev_line_was_empty = is_blank_line(&self.line_buf);

            match &self.pending {
                None => {
                    if !self.prev_line_was_empty {
                        warn!(offset = line_offset, "Skipping data before first 'From ' separator");
                    }
                }
                Some((start, _)) => {
                    if truncated {
                        // Drain up to the next separator.
                    } else if body.len() + self.line_buf.len() <= self.max_message_size {
                        body.extend_from_slice(&self.line_buf);
                    } else {
                        warn!(
                            offset = *start,
                            max_size = self.max_message_size,
                            "Message exceeds maximum size, dropping its body"
                        );
                        body.clear();
                        truncated = true;
                    }
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = std::io::Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_message() {
            Ok(Some(msg)) => Some(Ok(msg)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn finish_message(offset: u64, separator: &[u8], bytes: Vec<u8>, truncated: bool) -> RawMessage {
    let separator = strip_bom(separator);
    let separator = String::from_utf8_lossy(separator)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    RawMessage {
        offset,
        separator,
        bytes,
        truncated,
    }
}

/// Outcome of inspecting a file's first bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    /// Starts with a `From ` separator.
    Mbox,
    /// Zero bytes, or only whitespace: an empty mailbox.
    Empty,
    /// Anything else.
    NotMbox,
}

/// Decide whether `path` looks like an mbox file.
pub fn sniff_file(path: &Path) -> Result<Sniff> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| ConvertError::io(path, e))?;
    Ok(sniff(&head))
}

/// Classify the leading bytes of a file. Leading blank lines are ignored.
pub fn sniff(head: &[u8]) -> Sniff {
    let head = strip_bom(head);
    let start = head
        .iter()
        .position(|&b| !matches!(b, b'\n' | b'\r' | b' ' | b'\t'));
    match start {
        None => Sniff::Empty,
        Some(pos) if head[pos..].starts_with(b"From ") => Sniff::Mbox,
        Some(_) => Sniff::NotMbox,
    }
}

fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(data)
}

/// Check whether a line is an mbox separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    strip_bom(line).starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &[u8], max: usize) -> Vec<RawMessage> {
        MboxReader::new(data, max)
            .collect::<std::io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n")); // lowercase
        assert!(!is_mbox_separator(b">From user@example.com\n")); // escaped
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_is_mbox_separator_with_bom() {
        let mut line = vec![0xEF, 0xBB, 0xBF];
        line.extend_from_slice(b"From user@example.com Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&line));
    }

    #[test]
    fn test_frames_two_messages() {
        let data = b"From a@b Thu Jan  1 00:00:00 2024\nSubject: one\n\nbody one\n\nFrom c@d Fri Jan  2 00:00:00 2024\r\nSubject: two\r\n\r\nbody two\r\n";
        let msgs = frame(data, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].offset, 0);
        assert_eq!(msgs[0].separator, "From a@b Thu Jan  1 00:00:00 2024");
        assert!(msgs[0].bytes.starts_with(b"Subject: one"));
        assert_eq!(msgs[1].separator, "From c@d Fri Jan  2 00:00:00 2024");
        assert!(msgs[1].bytes.ends_with(b"body two\r\n"));
    }

    #[test]
    fn test_escaped_from_is_not_a_separator() {
        let data = b"From a@b Thu Jan  1 00:00:00 2024\nSubject: x\n\n>From the top\n";
        let msgs = frame(data, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn test_oversized_message_is_flagged() {
        let data = b"From a@b Thu Jan  1 00:00:00 2024\nSubject: x\n\n0123456789\n0123456789\nok\n\nFrom c@d Thu Jan  1 00:00:00 2024\nS: y\n";
        let msgs = frame(data, 16);
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].truncated);
        assert!(msgs[0].bytes.is_empty());
        assert!(!msgs[1].truncated);
        assert_eq!(msgs[1].bytes, b"S: y\n");
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(frame(b"", DEFAULT_MAX_MESSAGE_SIZE).is_empty());
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b""), Sniff::Empty);
        assert_eq!(sniff(b"\n\n"), Sniff::Empty);
        assert_eq!(sniff(b"From a@b Thu Jan  1 00:00:00 2024\n"), Sniff::Mbox);
        assert_eq!(sniff(b"\r\nFrom a@b\n"), Sniff::Mbox);
        assert_eq!(sniff(b"\xEF\xBB\xBFFrom a@b\n"), Sniff::Mbox);
        assert_eq!(sniff(b"Subject: not an mbox\n"), Sniff::NotMbox);
        assert_eq!(sniff(b"\x00\x01binary"), Sniff::NotMbox);
    }
}
