//! Compiled object records.
//!
//! Every record starts with a 10-byte header:
//!
//! ```text
//! 0     record type
//! 1     atom
//! 2..4  group / function / API id (BE)
//! 4..6  block number (BE)
//! 6..8  line number (BE)
//! 8..10 payload size (BE)
//! ```
//!
//! followed by `payload size` bytes whose shape depends on the record type.

use crate::atom::Atom;
use crate::core::{DocError, DocResult};

pub const RECORD_HEADER_SIZE: usize = 10;

/// Group field value meaning "the file's default group".
pub const DEFAULT_GROUP: u16 = 0xFFFF;
pub const RECORD_FUNC_API_MASK: u16 = 0xC000;
pub const RECORD_FUNCTION_FLAG: u16 = 0xC000;
pub const RECORD_API_FLAG: u16 = 0x8000;
pub const MAX_GROUPS_PER_FILE: u16 = 0x7fff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Eof = 0,
    Group = 1,
    Api = 2,
    Function = 3,
    Name = 4,
    String = 5,
    Numeric = 6,
    Empty = 7,
    Multiline = 8,
    Type = 9,
    Pair = 10,
    Start = 11,
    End = 12,
    Sample = 13,
    Boolean = 14,
    Application = 15,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => RecordType::Eof,
            1 => RecordType::Group,
            2 => RecordType::Api,
            3 => RecordType::Function,
            4 => RecordType::Name,
            5 => RecordType::String,
            6 => RecordType::Numeric,
            7 => RecordType::Empty,
            8 => RecordType::Multiline,
            9 => RecordType::Type,
            10 => RecordType::Pair,
            11 => RecordType::Start,
            12 => RecordType::End,
            13 => RecordType::Sample,
            14 => RecordType::Boolean,
            15 => RecordType::Application,
            _ => return None,
        })
    }
}

/// Counted bytes with the "preserve formatting" flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Counted {
    pub bytes: Vec<u8>,
    pub fixed: bool,
}

impl Counted {
    pub fn new(bytes: &[u8]) -> Self {
        Self { bytes: bytes.to_vec(), fixed: false }
    }

    pub fn fixed(bytes: &[u8]) -> Self {
        Self { bytes: bytes.to_vec(), fixed: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Eof,
    /// Lookup dump entries carry the raw name.
    Group(Vec<u8>),
    Api(Vec<u8>),
    Function(Vec<u8>),
    Application(Vec<u8>),
    Sample { name: Vec<u8>, body: Vec<u8> },
    Name(Counted),
    String(Counted),
    Multiline(Counted),
    Numeric(u32),
    Empty,
    Type { type_name: Vec<u8>, name: Vec<u8>, brief: Vec<u8> },
    Pair { name: Vec<u8>, string: Vec<u8> },
    Start,
    End,
    Boolean(bool),
}

impl RecordBody {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordBody::Eof => RecordType::Eof,
            RecordBody::Group(_) => RecordType::Group,
            RecordBody::Api(_) => RecordType::Api,
            RecordBody::Function(_) => RecordType::Function,
            RecordBody::Application(_) => RecordType::Application,
            RecordBody::Sample { .. } => RecordType::Sample,
            RecordBody::Name(_) => RecordType::Name,
            RecordBody::String(_) => RecordType::String,
            RecordBody::Multiline(_) => RecordType::Multiline,
            RecordBody::Numeric(_) => RecordType::Numeric,
            RecordBody::Empty => RecordType::Empty,
            RecordBody::Type { .. } => RecordType::Type,
            RecordBody::Pair { .. } => RecordType::Pair,
            RecordBody::Start => RecordType::Start,
            RecordBody::End => RecordType::End,
            RecordBody::Boolean(_) => RecordType::Boolean,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub atom: u8,
    pub group: u16,
    pub block: u16,
    pub line: u16,
    pub body: RecordBody,
}

fn too_large(size: usize) -> DocError {
    DocError::DataTooLarge { size }
}

fn push_len16(out: &mut Vec<u8>, bytes: &[u8]) -> DocResult<()> {
    let length = u16::try_from(bytes.len()).map_err(|_| too_large(bytes.len()))?;
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

impl Record {
    pub fn new(atom: Atom, body: RecordBody) -> Self {
        Self {
            atom: atom.as_u8(),
            group: 0,
            block: 0,
            line: 0,
            body,
        }
    }

    pub fn atom(&self) -> Option<Atom> {
        Atom::from_u8(self.atom)
    }

    pub fn record_type(&self) -> RecordType {
        self.body.record_type()
    }

    fn encode_payload(&self, payload: &mut Vec<u8>) -> DocResult<()> {
        match &self.body {
            RecordBody::Eof | RecordBody::Empty | RecordBody::Start | RecordBody::End => {}
            RecordBody::Group(name)
            | RecordBody::Api(name)
            | RecordBody::Function(name)
            | RecordBody::Application(name) => payload.extend_from_slice(name),
            RecordBody::Sample { name, body } => {
                let name_length = u16::try_from(name.len()).map_err(|_| too_large(name.len()))?;
                let body_length = u16::try_from(body.len()).map_err(|_| too_large(body.len()))?;
                payload.extend_from_slice(&name_length.to_be_bytes());
                payload.extend_from_slice(&body_length.to_be_bytes());
                payload.extend_from_slice(name);
                payload.extend_from_slice(body);
            }
            RecordBody::Name(text) | RecordBody::String(text) | RecordBody::Multiline(text) => {
                payload.push(u8::from(text.fixed));
                payload.extend_from_slice(&text.bytes);
            }
            RecordBody::Numeric(value) => payload.extend_from_slice(&value.to_be_bytes()),
            RecordBody::Type { type_name, name, brief } => {
                push_len16(payload, type_name)?;
                push_len16(payload, name)?;
                push_len16(payload, brief)?;
            }
            RecordBody::Pair { name, string } => {
                push_len16(payload, name)?;
                push_len16(payload, string)?;
            }
            RecordBody::Boolean(value) => payload.push(u8::from(*value)),
        }
        Ok(())
    }

    /// Append the encoded record to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> DocResult<()> {
        let mut payload = Vec::new();
        self.encode_payload(&mut payload)?;
        let size = u16::try_from(payload.len()).map_err(|_| too_large(payload.len()))?;

        out.push(self.record_type() as u8);
        out.push(self.atom);
        out.extend_from_slice(&self.group.to_be_bytes());
        out.extend_from_slice(&self.block.to_be_bytes());
        out.extend_from_slice(&self.line.to_be_bytes());
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&payload);
        Ok(())
    }
}

/// Bounds-checked cursor over one record's payload.
struct Payload<'a> {
    data: &'a [u8],
    pos: usize,
    offset: usize,
}

impl<'a> Payload<'a> {
    fn take(&mut self, count: usize) -> DocResult<&'a [u8]> {
        if self.pos + count > self.data.len() {
            return Err(DocError::TruncatedRecord {
                offset: self.offset + self.pos,
                needed: count,
                available: self.data.len() - self.pos,
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn u16(&mut self) -> DocResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn counted16(&mut self) -> DocResult<Vec<u8>> {
        let length = self.u16()? as usize;
        Ok(self.take(length)?.to_vec())
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

/// Streams records out of a compiled object body.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    /// Read records from `data`, starting at `start` (the end of the file header).
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self { data, pos: start }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Next record, or `None` at the end of the data or at an EOF record.
    pub fn next_record(&mut self) -> DocResult<Option<Record>> {
        let available = self.data.len() - self.pos;
        if available == 0 {
            return Ok(None);
        }

        if available < RECORD_HEADER_SIZE {
            return Err(DocError::TruncatedRecord {
                offset: self.pos,
                needed: RECORD_HEADER_SIZE,
                available,
            });
        }

        let header = &self.data[self.pos..self.pos + RECORD_HEADER_SIZE];
        let type_byte = header[0];
        let size = u16::from_be_bytes([header[8], header[9]]) as usize;

        let record_type = RecordType::from_u8(type_byte).ok_or(DocError::UnknownRecordType {
            record_type: type_byte,
            offset: self.pos,
        })?;

        let start = self.pos + RECORD_HEADER_SIZE;
        if start + size > self.data.len() {
            return Err(DocError::TruncatedRecord {
                offset: self.pos,
                needed: size,
                available: self.data.len() - start,
            });
        }

        let mut payload = Payload {
            data: &self.data[start..start + size],
            pos: 0,
            offset: start,
        };

        let body = match record_type {
            RecordType::Eof => RecordBody::Eof,
            RecordType::Group => RecordBody::Group(payload.rest().to_vec()),
            RecordType::Api => RecordBody::Api(payload.rest().to_vec()),
            RecordType::Function => RecordBody::Function(payload.rest().to_vec()),
            RecordType::Application => RecordBody::Application(payload.rest().to_vec()),
            RecordType::Sample => {
                let name_length = payload.u16()? as usize;
                let body_length = payload.u16()? as usize;
                let name = payload.take(name_length)?.to_vec();
                let body = payload.take(body_length)?.to_vec();
                RecordBody::Sample { name, body }
            }
            RecordType::Name | RecordType::String | RecordType::Multiline => {
                let fixed = payload.take(1)?[0] != 0;
                let text = Counted {
                    bytes: payload.rest().to_vec(),
                    fixed,
                };
                match record_type {
                    RecordType::Name => RecordBody::Name(text),
                    RecordType::String => RecordBody::String(text),
                    _ => RecordBody::Multiline(text),
                }
            }
            RecordType::Numeric => {
                let bytes = payload.take(4)?;
                RecordBody::Numeric(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            RecordType::Empty => RecordBody::Empty,
            RecordType::Type => RecordBody::Type {
                type_name: payload.counted16()?,
                name: payload.counted16()?,
                brief: payload.counted16()?,
            },
            RecordType::Pair => RecordBody::Pair {
                name: payload.counted16()?,
                string: payload.counted16()?,
            },
            RecordType::Start => RecordBody::Start,
            RecordType::End => RecordBody::End,
            RecordType::Boolean => RecordBody::Boolean(payload.take(1)?[0] != 0),
        };

        let record = Record {
            atom: header[1],
            group: u16::from_be_bytes([header[2], header[3]]),
            block: u16::from_be_bytes([header[4], header[5]]),
            line: u16::from_be_bytes([header[6], header[7]]),
            body,
        };

        self.pos = start + size;

        if record_type == RecordType::Eof {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(record: &Record) -> Vec<u8> {
        let mut out = Vec::new();
        record.encode(&mut out).unwrap();
        out
    }

    fn decode_one(bytes: &[u8]) -> Record {
        let mut reader = RecordReader::new(bytes, 0);
        reader.next_record().unwrap().unwrap()
    }

    #[test]
    fn test_header_fields_big_endian() {
        let record = Record {
            atom: Atom::State.as_u8(),
            group: 0x0102,
            block: 0x0304,
            line: 0x0506,
            body: RecordBody::Name(Counted::new(b"A")),
        };

        let bytes = encode_one(&record);
        assert_eq!(
            bytes,
            vec![4, 41, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x00, 0x02, 0x00, b'A']
        );
    }

    #[test]
    fn test_numeric_uses_all_four_bytes() {
        let record = Record::new(Atom::Group, RecordBody::Numeric(0x00AB_CDEF));
        let bytes = encode_one(&record);
        assert_eq!(&bytes[RECORD_HEADER_SIZE..], &[0x00, 0xAB, 0xCD, 0xEF]);
        assert_eq!(decode_one(&bytes).body, RecordBody::Numeric(0x00AB_CDEF));
    }

    #[test]
    fn test_every_body_shape_survives() {
        let long = vec![b'x'; 65535 - 6];
        let bodies = vec![
            RecordBody::Group(b"net".to_vec()),
            RecordBody::Api(Vec::new()),
            RecordBody::Function(b"connect".to_vec()),
            RecordBody::Application(b"pdsc".to_vec()),
            RecordBody::Sample { name: b"s".to_vec(), body: b"\nint a;".to_vec() },
            RecordBody::Name(Counted::new(b"")),
            RecordBody::String(Counted::new(b"text")),
            RecordBody::Multiline(Counted::fixed(b"  keep  ")),
            RecordBody::Numeric(u32::MAX),
            RecordBody::Empty,
            RecordBody::Type { type_name: b"int".to_vec(), name: b"x".to_vec(), brief: Vec::new() },
            RecordBody::Pair { name: b"-o".to_vec(), string: long },
            RecordBody::Start,
            RecordBody::End,
            RecordBody::Boolean(true),
        ];

        let mut stream = Vec::new();
        let records: Vec<Record> = bodies
            .into_iter()
            .enumerate()
            .map(|(i, body)| Record {
                atom: (i % 52) as u8,
                group: i as u16,
                block: 1,
                line: 2,
                body,
            })
            .collect();
        for record in &records {
            record.encode(&mut stream).unwrap();
        }

        let mut reader = RecordReader::new(&stream, 0);
        for expected in &records {
            assert_eq!(&reader.next_record().unwrap().unwrap(), expected);
        }
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let record = Record::new(Atom::Description, RecordBody::String(Counted::new(&vec![0; 65535])));
        let mut out = Vec::new();
        assert!(matches!(record.encode(&mut out), Err(DocError::DataTooLarge { .. })));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = encode_one(&Record::new(Atom::Brief, RecordBody::String(Counted::new(b"hello"))));
        let mut reader = RecordReader::new(&bytes[..bytes.len() - 2], 0);
        assert!(matches!(reader.next_record(), Err(DocError::TruncatedRecord { .. })));

        let mut reader = RecordReader::new(&bytes[..4], 0);
        assert!(matches!(reader.next_record(), Err(DocError::TruncatedRecord { .. })));
    }

    #[test]
    fn test_inner_lengths_checked() {
        let mut bytes = encode_one(&Record::new(
            Atom::Returns,
            RecordBody::Pair { name: b"0".to_vec(), string: b"ok".to_vec() },
        ));
        // claim a longer first string than the payload holds
        bytes[RECORD_HEADER_SIZE + 1] = 40;
        let mut reader = RecordReader::new(&bytes, 0);
        assert!(matches!(reader.next_record(), Err(DocError::TruncatedRecord { .. })));
    }

    #[test]
    fn test_unknown_type_is_internal_error() {
        let bytes = [99u8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = RecordReader::new(&bytes, 0);
        assert!(matches!(
            reader.next_record(),
            Err(DocError::UnknownRecordType { record_type: 99, offset: 0 })
        ));
    }
}
