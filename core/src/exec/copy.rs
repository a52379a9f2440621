//! Row counting for `COPY ... TO STDOUT` output.

use std::sync::LazyLock;

use regex::Regex;

static FORMAT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bFORMAT\s+'?|\bWITH\s+|\bCOPY\s+)(csv|binary)\b").ok()
});
static HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bHEADER\b").ok());

/// Layout of the bytes a COPY statement moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    Text,
    Csv,
    Binary,
}

impl CopyFormat {
    /// Reads the format out of a COPY statement; plain text unless CSV or BINARY is named.
    pub fn of(statement: &str) -> Self {
        let named = FORMAT
            .as_ref()
            .and_then(|re| re.captures(statement))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_ascii_lowercase());
        match named.as_deref() {
            Some("csv") => CopyFormat::Csv,
            Some("binary") => CopyFormat::Binary,
            _ => CopyFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryState {
    Header,
    Tuple,
    Field { left: u16 },
    Done,
}

/// Counts data rows in a COPY output stream as its chunks pass by.
///
/// Text rows end at a newline and CSV rows at a newline outside quotes, skipping a requested
/// header line. Binary output is walked tuple by tuple.
#[derive(Debug, Clone)]
pub struct CopyRowCounter {
    format: CopyFormat,
    header: bool,
    rows: u64,
    in_quotes: bool,
    state: BinaryState,
    pending: Vec<u8>,
    skip: usize,
}

impl CopyRowCounter {
    pub fn new(statement: &str) -> Self {
        let format = CopyFormat::of(statement);
        let header = format != CopyFormat::Binary
            && HEADER.as_ref().is_some_and(|re| re.is_match(statement));
        Self {
            format,
            header,
            rows: 0,
            in_quotes: false,
            state: BinaryState::Header,
            pending: Vec::with_capacity(19),
            skip: 0,
        }
    }

    pub fn format(&self) -> CopyFormat {
        self.format
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        match self.format {
            CopyFormat::Text => {
                self.rows += chunk.iter().filter(|b| **b == b'\n').count() as u64;
            }
            CopyFormat::Csv => {
                for byte in chunk {
                    match byte {
                        b'"' => self.in_quotes = !self.in_quotes,
                        b'\n' if !self.in_quotes => self.rows += 1,
                        _ => {}
                    }
                }
            }
            CopyFormat::Binary => self.feed_binary(chunk),
        }
    }

    /// Data rows seen so far.
    pub fn rows(&self) -> u64 {
        if self.header {
            self.rows.saturating_sub(1)
        } else {
            self.rows
        }
    }

    fn feed_binary(&mut self, mut chunk: &[u8]) {
        loop {
            if self.skip > 0 {
                let n = self.skip.min(chunk.len());
                chunk = &chunk[n..];
                self.skip -= n;
                if self.skip > 0 {
                    return;
                }
            }

            // signature (11) + flags (4) + extension length (4)
            let need = match self.state {
                BinaryState::Header => 19,
                BinaryState::Tuple => 2,
                BinaryState::Field { .. } => 4,
                BinaryState::Done => return,
            };
            let take = (need - self.pending.len()).min(chunk.len());
            self.pending.extend_from_slice(&chunk[..take]);
            chunk = &chunk[take..];
            if self.pending.len() < need {
                return;
            }

            let bytes = &self.pending;
            self.state = match self.state {
                BinaryState::Header => {
                    self.skip = u32::from_be_bytes([bytes[15], bytes[16], bytes[17], bytes[18]])
                        as usize;
                    BinaryState::Tuple
                }
                BinaryState::Tuple => match i16::from_be_bytes([bytes[0], bytes[1]]) {
                    -1 => BinaryState::Done,
                    fields => {
                        self.rows += 1;
                        match u16::try_from(fields) {
                            Ok(0) | Err(_) => BinaryState::Tuple,
                            Ok(left) => BinaryState::Field { left },
                        }
                    }
                },
                BinaryState::Field { left } => {
                    let len = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    // -1 marks NULL and carries no data
                    self.skip = usize::try_from(len).unwrap_or(0);
                    match left - 1 {
                        0 => BinaryState::Tuple,
                        left => BinaryState::Field { left },
                    }
                }
                BinaryState::Done => BinaryState::Done,
            };
            self.pending.clear();
        }
    }
}
