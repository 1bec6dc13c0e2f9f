//! The 18-byte file header shared by compiled and linked objects.
//!
//! ```text
//! 0..4   magic        "GDSC" compiled, "GDSL" linked
//! 4      major version
//! 5      minor version
//! 6..12  day, month (0-11), year (since 1900), hour, minute, second (UTC)
//! 12..14 record count (BE)
//! 14..16 reserved
//! 16..18 input name length (BE)
//! 18..   input name
//! ```

use crate::core::{DocError, DocResult};
use chrono::{Datelike, Timelike, Utc};

pub const COMPILED_MAGIC: [u8; 4] = *b"GDSC";
pub const LINKED_MAGIC: [u8; 4] = *b"GDSL";

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

pub const FILE_HEADER_SIZE: usize = 18;
const FILE_NUMBER_RECORDS: usize = 12;
const FILE_NAME_LENGTH: usize = 16;

/// Which object format a header introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Compiled,
    Linked,
}

impl Magic {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            Magic::Compiled => COMPILED_MAGIC,
            Magic::Linked => LINKED_MAGIC,
        }
    }
}

/// Build time as stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub day: u8,
    pub month: u8,
    pub year: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            day: now.day() as u8,
            month: now.month0() as u8,
            year: (now.year() - 1900) as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: Magic,
    pub major: u8,
    pub minor: u8,
    pub timestamp: Timestamp,
    pub record_count: u16,
    pub input_name: Vec<u8>,
}

impl FileHeader {
    /// Header for a new object stamped with the current time.
    pub fn new(magic: Magic, input_name: &[u8], record_count: u16) -> Self {
        Self {
            magic,
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            timestamp: Timestamp::now(),
            record_count,
            input_name: input_name.to_vec(),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> DocResult<()> {
        let name_length = u16::try_from(self.input_name.len())
            .map_err(|_| DocError::DataTooLarge { size: self.input_name.len() })?;

        let mut header = [0u8; FILE_HEADER_SIZE];
        header[0..4].copy_from_slice(&self.magic.bytes());
        header[4] = self.major;
        header[5] = self.minor;
        header[6] = self.timestamp.day;
        header[7] = self.timestamp.month;
        header[8] = self.timestamp.year;
        header[9] = self.timestamp.hour;
        header[10] = self.timestamp.minute;
        header[11] = self.timestamp.second;
        header[FILE_NUMBER_RECORDS..FILE_NUMBER_RECORDS + 2]
            .copy_from_slice(&self.record_count.to_be_bytes());
        header[FILE_NAME_LENGTH..FILE_NAME_LENGTH + 2].copy_from_slice(&name_length.to_be_bytes());

        out.extend_from_slice(&header);
        out.extend_from_slice(&self.input_name);
        Ok(())
    }

    /// Decode the header at the start of `data`, returning it and the offset of
    /// the first record.
    pub fn decode(data: &[u8], expected: Magic) -> DocResult<(FileHeader, usize)> {
        if data.len() < FILE_HEADER_SIZE {
            return Err(DocError::TruncatedRecord {
                offset: 0,
                needed: FILE_HEADER_SIZE,
                available: data.len(),
            });
        }

        if data[0..4] != expected.bytes() {
            return Err(DocError::CorruptFile);
        }

        let major = data[4];
        if major > VERSION_MAJOR {
            return Err(DocError::UnsupportedVersion {
                found: major,
                supported: VERSION_MAJOR,
            });
        }

        let record_count = u16::from_be_bytes([data[FILE_NUMBER_RECORDS], data[FILE_NUMBER_RECORDS + 1]]);
        let name_length = u16::from_be_bytes([data[FILE_NAME_LENGTH], data[FILE_NAME_LENGTH + 1]]) as usize;

        let end = FILE_HEADER_SIZE + name_length;
        if data.len() < end {
            return Err(DocError::TruncatedRecord {
                offset: FILE_HEADER_SIZE,
                needed: name_length,
                available: data.len() - FILE_HEADER_SIZE,
            });
        }

        let header = FileHeader {
            magic: expected,
            major,
            minor: data[5],
            timestamp: Timestamp {
                day: data[6],
                month: data[7],
                year: data[8],
                hour: data[9],
                minute: data[10],
                second: data[11],
            },
            record_count,
            input_name: data[FILE_HEADER_SIZE..end].to_vec(),
        };

        Ok((header, end))
    }
}
