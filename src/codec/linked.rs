//! Linked object records and the blocked output stream.
//!
//! Linked records have no common header beyond the leading type byte; each
//! type has its own fixed fields followed by the variable-length strings the
//! fixed fields count. The stream after the file header is cut into
//! [`FILE_BLOCK_SIZE`] blocks. A record never straddles a block: when the next
//! record would overflow, a `BLOCK_END` byte is written (if there is room) and
//! the rest of the block is zero padded.

use crate::codec::compiled::Counted;
use crate::codec::header::{FileHeader, Magic};
use crate::core::{DocError, DocResult};
use std::io::Write;

pub const FILE_BLOCK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkedType {
    Trigger = 0,
    Triggers = 1,
    Condition = 2,
    SourceFile = 3,
    SourceReference = 4,
    End = 5,
    BlockEnd = 6,
    StateMachineStart = 8,
    State = 9,
    Transition = 10,
    StateMachineEnd = 11,
    SequenceStart = 12,
    Timeline = 13,
    Function = 14,
    Message = 15,
    Parameter = 16,
    NodeStart = 17,
    SentMessage = 18,
    NodeEnd = 19,
    SequenceEnd = 20,
    ApiStart = 21,
    ApiFunction = 22,
    ApiAction = 23,
    ApiDescription = 24,
    ApiParameter = 25,
    ApiReturns = 26,
    ApiFunctionEnd = 27,
    ApiTypeStart = 28,
    ApiTypeField = 29,
    ApiTypeEnd = 30,
    ApiConstantsStart = 31,
    ApiConstant = 32,
    ApiDataConstant = 33,
    ApiConstantsEnd = 34,
    ApiEnd = 35,
    Sample = 36,
    ApplicationStart = 37,
    ApplicationSection = 38,
    ApplicationSubSection = 39,
    ApplicationOption = 40,
    ApplicationCommand = 41,
    ApplicationSynopsis = 42,
    ApplicationEnd = 43,
}

/// Field layout used by a linked record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Empty,
    Numeric,
    Numerics,
    String,
    GroupId,
    Group,
    Message,
    Type,
    Constant,
    Pair,
    Option,
    Synopsis,
    Reserved,
}

impl LinkedType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use LinkedType::*;
        Some(match value {
            0 => Trigger,
            1 => Triggers,
            2 => Condition,
            3 => SourceFile,
            4 => SourceReference,
            5 => End,
            6 => BlockEnd,
            8 => StateMachineStart,
            9 => State,
            10 => Transition,
            11 => StateMachineEnd,
            12 => SequenceStart,
            13 => Timeline,
            14 => Function,
            15 => Message,
            16 => Parameter,
            17 => NodeStart,
            18 => SentMessage,
            19 => NodeEnd,
            20 => SequenceEnd,
            21 => ApiStart,
            22 => ApiFunction,
            23 => ApiAction,
            24 => ApiDescription,
            25 => ApiParameter,
            26 => ApiReturns,
            27 => ApiFunctionEnd,
            28 => ApiTypeStart,
            29 => ApiTypeField,
            30 => ApiTypeEnd,
            31 => ApiConstantsStart,
            32 => ApiConstant,
            33 => ApiDataConstant,
            34 => ApiConstantsEnd,
            35 => ApiEnd,
            36 => Sample,
            37 => ApplicationStart,
            38 => ApplicationSection,
            39 => ApplicationSubSection,
            40 => ApplicationOption,
            41 => ApplicationCommand,
            42 => ApplicationSynopsis,
            43 => ApplicationEnd,
            _ => return None,
        })
    }

    fn layout(self) -> Layout {
        use LinkedType::*;
        match self {
            End | BlockEnd | StateMachineEnd | NodeEnd | SequenceEnd | ApiFunctionEnd
            | ApiTypeEnd | ApiConstantsEnd | ApiEnd | ApplicationEnd => Layout::Empty,
            Transition => Layout::Numeric,
            NodeStart => Layout::Numerics,
            Condition | StateMachineStart | SequenceStart | ApiStart | ApiAction
            | ApiDescription | ApplicationStart => Layout::String,
            State => Layout::GroupId,
            Trigger | Triggers | Timeline => Layout::Group,
            SentMessage => Layout::Message,
            ApiFunction | ApiParameter | ApiTypeField | ApplicationCommand => Layout::Type,
            ApiConstant => Layout::Constant,
            ApiReturns | ApiTypeStart | ApiConstantsStart | Sample | ApplicationSection
            | ApplicationSubSection => Layout::Pair,
            ApplicationOption => Layout::Option,
            ApplicationSynopsis => Layout::Synopsis,
            SourceFile | SourceReference | Function | Message | Parameter | ApiDataConstant => {
                Layout::Reserved
            }
        }
    }
}

/// One record of the linked object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkedRecord {
    Empty(LinkedType),
    Numeric(LinkedType, u16),
    Numerics(LinkedType, u16, u32),
    String(LinkedType, Counted),
    GroupId {
        kind: LinkedType,
        id: u16,
        group: Vec<u8>,
        name: Vec<u8>,
    },
    Group {
        kind: LinkedType,
        group: Vec<u8>,
        name: Vec<u8>,
    },
    Message {
        kind: LinkedType,
        from: u8,
        to: u8,
        timeline: Vec<u8>,
        message: Vec<u8>,
    },
    Type {
        kind: LinkedType,
        type_name: Vec<u8>,
        name: Vec<u8>,
        brief: Counted,
    },
    Constant {
        kind: LinkedType,
        type_name: Vec<u8>,
        name: Vec<u8>,
        value: Vec<u8>,
        brief: Counted,
    },
    Pair {
        kind: LinkedType,
        name: Vec<u8>,
        string: Counted,
    },
    Option {
        kind: LinkedType,
        flags: u16,
        name: Counted,
        value: Counted,
        description: Counted,
    },
    Synopsis {
        kind: LinkedType,
        name: Vec<u8>,
        index: Vec<u8>,
    },
}

fn len8(bytes: &[u8]) -> DocResult<u8> {
    u8::try_from(bytes.len()).map_err(|_| DocError::DataTooLarge { size: bytes.len() })
}

fn len16(bytes: &[u8]) -> DocResult<[u8; 2]> {
    u16::try_from(bytes.len())
        .map(u16::to_be_bytes)
        .map_err(|_| DocError::DataTooLarge { size: bytes.len() })
}

impl LinkedRecord {
    pub fn kind(&self) -> LinkedType {
        match self {
            LinkedRecord::Empty(kind)
            | LinkedRecord::Numeric(kind, _)
            | LinkedRecord::Numerics(kind, _, _)
            | LinkedRecord::String(kind, _) => *kind,
            LinkedRecord::GroupId { kind, .. }
            | LinkedRecord::Group { kind, .. }
            | LinkedRecord::Message { kind, .. }
            | LinkedRecord::Type { kind, .. }
            | LinkedRecord::Constant { kind, .. }
            | LinkedRecord::Pair { kind, .. }
            | LinkedRecord::Option { kind, .. }
            | LinkedRecord::Synopsis { kind, .. } => *kind,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> DocResult<()> {
        out.push(self.kind() as u8);

        match self {
            LinkedRecord::Empty(_) => {}
            LinkedRecord::Numeric(_, value) => out.extend_from_slice(&value.to_be_bytes()),
            LinkedRecord::Numerics(_, first, second) => {
                out.extend_from_slice(&first.to_be_bytes());
                out.extend_from_slice(&second.to_be_bytes());
            }
            LinkedRecord::String(_, text) => {
                out.push(u8::from(text.fixed));
                out.extend_from_slice(&len16(&text.bytes)?);
                out.extend_from_slice(&text.bytes);
            }
            LinkedRecord::GroupId { id, group, name, .. } => {
                out.extend_from_slice(&id.to_be_bytes());
                out.push(len8(group)?);
                out.extend_from_slice(group);
                out.push(len8(name)?);
                out.extend_from_slice(name);
            }
            LinkedRecord::Group { group, name, .. } => {
                out.push(len8(group)?);
                out.extend_from_slice(group);
                out.push(len8(name)?);
                out.extend_from_slice(name);
            }
            LinkedRecord::Message { from, to, timeline, message, .. } => {
                out.push(*from);
                out.push(*to);
                out.push(len8(timeline)?);
                out.extend_from_slice(timeline);
                out.push(len8(message)?);
                out.extend_from_slice(message);
            }
            LinkedRecord::Type { type_name, name, brief, .. } => {
                out.push(u8::from(brief.fixed));
                out.push(len8(type_name)?);
                out.push(len8(name)?);
                out.extend_from_slice(&len16(&brief.bytes)?);
                out.extend_from_slice(type_name);
                out.extend_from_slice(name);
                out.extend_from_slice(&brief.bytes);
            }
            LinkedRecord::Constant { type_name, name, value, brief, .. } => {
                out.push(u8::from(brief.fixed));
                out.push(len8(type_name)?);
                out.push(len8(name)?);
                out.extend_from_slice(&len16(value)?);
                out.extend_from_slice(&len16(&brief.bytes)?);
                out.extend_from_slice(type_name);
                out.extend_from_slice(name);
                out.extend_from_slice(value);
                out.extend_from_slice(&brief.bytes);
            }
            LinkedRecord::Pair { name, string, .. } => {
                out.push(u8::from(string.fixed));
                out.push(len8(name)?);
                out.extend_from_slice(&len16(&string.bytes)?);
                out.extend_from_slice(name);
                out.extend_from_slice(&string.bytes);
            }
            LinkedRecord::Option { flags, name, value, description, .. } => {
                let mut fixed = 0u8;
                if name.fixed {
                    fixed |= 0x01;
                }
                if value.fixed {
                    fixed |= 0x02;
                }
                if description.fixed {
                    fixed |= 0x04;
                }
                out.extend_from_slice(&flags.to_be_bytes());
                out.push(fixed);
                out.extend_from_slice(&len16(&name.bytes)?);
                out.extend_from_slice(&len16(&value.bytes)?);
                out.extend_from_slice(&len16(&description.bytes)?);
                out.extend_from_slice(&name.bytes);
                out.extend_from_slice(&value.bytes);
                out.extend_from_slice(&description.bytes);
            }
            LinkedRecord::Synopsis { name, index, .. } => {
                out.extend_from_slice(&len16(name)?);
                out.extend_from_slice(&len16(index)?);
                out.extend_from_slice(name);
                out.extend_from_slice(index);
            }
        }

        Ok(())
    }

    /// Decode the record at `*pos`, advancing past it.
    pub fn decode(data: &[u8], pos: &mut usize) -> DocResult<LinkedRecord> {
        let mut cursor = Cursor { data, pos: *pos };
        let type_byte = cursor.u8()?;
        let kind = LinkedType::from_u8(type_byte).ok_or(DocError::UnknownRecordType {
            record_type: type_byte,
            offset: *pos,
        })?;

        let record = match kind.layout() {
            Layout::Empty => LinkedRecord::Empty(kind),
            Layout::Numeric => LinkedRecord::Numeric(kind, cursor.u16()?),
            Layout::Numerics => {
                let first = cursor.u16()?;
                LinkedRecord::Numerics(kind, first, cursor.u32()?)
            }
            Layout::String => {
                let fixed = cursor.u8()? != 0;
                let length = cursor.u16()? as usize;
                LinkedRecord::String(kind, Counted { bytes: cursor.take(length)?, fixed })
            }
            Layout::GroupId => {
                let id = cursor.u16()?;
                let group_length = cursor.u8()? as usize;
                let group = cursor.take(group_length)?;
                let name_length = cursor.u8()? as usize;
                let name = cursor.take(name_length)?;
                LinkedRecord::GroupId { kind, id, group, name }
            }
            Layout::Group => {
                let group_length = cursor.u8()? as usize;
                let group = cursor.take(group_length)?;
                let name_length = cursor.u8()? as usize;
                let name = cursor.take(name_length)?;
                LinkedRecord::Group { kind, group, name }
            }
            Layout::Message => {
                let from = cursor.u8()?;
                let to = cursor.u8()?;
                let timeline_length = cursor.u8()? as usize;
                let timeline = cursor.take(timeline_length)?;
                let message_length = cursor.u8()? as usize;
                let message = cursor.take(message_length)?;
                LinkedRecord::Message { kind, from, to, timeline, message }
            }
            Layout::Type => {
                let fixed = cursor.u8()? != 0;
                let type_length = cursor.u8()? as usize;
                let name_length = cursor.u8()? as usize;
                let brief_length = cursor.u16()? as usize;
                LinkedRecord::Type {
                    kind,
                    type_name: cursor.take(type_length)?,
                    name: cursor.take(name_length)?,
                    brief: Counted { bytes: cursor.take(brief_length)?, fixed },
                }
            }
            Layout::Constant => {
                let fixed = cursor.u8()? != 0;
                let type_length = cursor.u8()? as usize;
                let name_length = cursor.u8()? as usize;
                let value_length = cursor.u16()? as usize;
                let brief_length = cursor.u16()? as usize;
                LinkedRecord::Constant {
                    kind,
                    type_name: cursor.take(type_length)?,
                    name: cursor.take(name_length)?,
                    value: cursor.take(value_length)?,
                    brief: Counted { bytes: cursor.take(brief_length)?, fixed },
                }
            }
            Layout::Pair => {
                let fixed = cursor.u8()? != 0;
                let name_length = cursor.u8()? as usize;
                let string_length = cursor.u16()? as usize;
                LinkedRecord::Pair {
                    kind,
                    name: cursor.take(name_length)?,
                    string: Counted { bytes: cursor.take(string_length)?, fixed },
                }
            }
            Layout::Option => {
                let flags = cursor.u16()?;
                let fixed = cursor.u8()?;
                let name_length = cursor.u16()? as usize;
                let value_length = cursor.u16()? as usize;
                let description_length = cursor.u16()? as usize;
                LinkedRecord::Option {
                    kind,
                    flags,
                    name: Counted { bytes: cursor.take(name_length)?, fixed: fixed & 0x01 != 0 },
                    value: Counted { bytes: cursor.take(value_length)?, fixed: fixed & 0x02 != 0 },
                    description: Counted {
                        bytes: cursor.take(description_length)?,
                        fixed: fixed & 0x04 != 0,
                    },
                }
            }
            Layout::Synopsis => {
                let name_length = cursor.u16()? as usize;
                let index_length = cursor.u16()? as usize;
                LinkedRecord::Synopsis {
                    kind,
                    name: cursor.take(name_length)?,
                    index: cursor.take(index_length)?,
                }
            }
            Layout::Reserved => {
                return Err(DocError::UnknownRecordType { record_type: type_byte, offset: *pos });
            }
        };

        *pos = cursor.pos;
        Ok(record)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take(&mut self, count: usize) -> DocResult<Vec<u8>> {
        if self.pos + count > self.data.len() {
            return Err(DocError::TruncatedRecord {
                offset: self.pos,
                needed: count,
                available: self.data.len().saturating_sub(self.pos),
            });
        }
        let bytes = self.data[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(bytes)
    }

    fn u8(&mut self) -> DocResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> DocResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> DocResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Writes a linked object: header first, then records packed into blocks.
pub struct BlockWriter<W: Write> {
    out: W,
    block: Vec<u8>,
    scratch: Vec<u8>,
    bytes_written: usize,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            block: Vec::with_capacity(FILE_BLOCK_SIZE),
            scratch: Vec::new(),
            bytes_written: 0,
        }
    }

    fn io(source: std::io::Error) -> DocError {
        DocError::Io {
            path: "linked output".to_string(),
            source,
        }
    }

    pub fn write_header(&mut self, header: &FileHeader) -> DocResult<()> {
        let mut bytes = Vec::new();
        header.encode(&mut bytes)?;
        self.out.write_all(&bytes).map_err(Self::io)?;
        self.bytes_written += bytes.len();
        Ok(())
    }

    fn flush_block(&mut self) -> DocResult<()> {
        if self.block.len() < FILE_BLOCK_SIZE {
            self.block.push(LinkedType::BlockEnd as u8);
        }
        self.block.resize(FILE_BLOCK_SIZE, 0);
        self.out.write_all(&self.block).map_err(Self::io)?;
        self.bytes_written += FILE_BLOCK_SIZE;
        self.block.clear();
        Ok(())
    }

    pub fn write_record(&mut self, record: &LinkedRecord) -> DocResult<()> {
        self.scratch.clear();
        record.encode(&mut self.scratch)?;

        let size = self.scratch.len();
        if size > FILE_BLOCK_SIZE {
            return Err(DocError::DataTooLarge { size });
        }

        if self.block.len() + size > FILE_BLOCK_SIZE {
            self.flush_block()?;
        }

        self.block.extend_from_slice(&self.scratch);
        Ok(())
    }

    /// Flush the last block and return the total size written.
    pub fn close(&mut self) -> DocResult<usize> {
        if !self.block.is_empty() {
            self.flush_block()?;
        }
        self.out.flush().map_err(Self::io)?;
        Ok(self.bytes_written)
    }

    /// Flush the last block and hand back the sink.
    pub fn finish(mut self) -> DocResult<W> {
        self.close()?;
        Ok(self.out)
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

/// Read back a whole linked object.
pub fn read_linked(data: &[u8]) -> DocResult<(FileHeader, Vec<LinkedRecord>)> {
    let (header, start) = FileHeader::decode(data, Magic::Linked)?;
    let mut records = Vec::new();

    let mut block_start = start;
    while block_start < data.len() {
        let block_end = (block_start + FILE_BLOCK_SIZE).min(data.len());
        let block = &data[..block_end];
        let mut pos = block_start;

        while pos < block_end {
            if data[pos] == LinkedType::BlockEnd as u8 {
                break;
            }
            records.push(LinkedRecord::decode(block, &mut pos)?);
        }

        block_start += FILE_BLOCK_SIZE;
    }

    Ok((header, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(record: &LinkedRecord) -> Vec<u8> {
        let mut out = Vec::new();
        record.encode(&mut out).unwrap();
        out
    }

    #[test]
    fn test_state_layout() {
        let record = LinkedRecord::GroupId {
            kind: LinkedType::State,
            id: 3,
            group: b"net".to_vec(),
            name: b"idle".to_vec(),
        };
        assert_eq!(
            encoded(&record),
            vec![9, 0, 3, 3, b'n', b'e', b't', 4, b'i', b'd', b'l', b'e']
        );
    }

    #[test]
    fn test_transition_and_node_start_layout() {
        assert_eq!(encoded(&LinkedRecord::Numeric(LinkedType::Transition, 0x0102)), vec![10, 1, 2]);
        assert_eq!(
            encoded(&LinkedRecord::Numerics(LinkedType::NodeStart, 7, 0x4000)),
            vec![17, 0, 7, 0, 0, 0x40, 0]
        );
    }

    #[test]
    fn test_sent_message_layout() {
        let record = LinkedRecord::Message {
            kind: LinkedType::SentMessage,
            from: 1,
            to: 2,
            timeline: b"Server".to_vec(),
            message: b"ping".to_vec(),
        };
        let bytes = encoded(&record);
        assert_eq!(&bytes[..4], &[18, 1, 2, 6]);
        assert_eq!(&bytes[4..10], b"Server");
        assert_eq!(bytes[10], 4);

        let mut pos = 0;
        assert_eq!(LinkedRecord::decode(&bytes, &mut pos).unwrap(), record);
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn test_type_and_option_layouts_decode() {
        let records = vec![
            LinkedRecord::Type {
                kind: LinkedType::ApiFunction,
                type_name: b"int".to_vec(),
                name: b"open".to_vec(),
                brief: Counted::default(),
            },
            LinkedRecord::Constant {
                kind: LinkedType::ApiConstant,
                type_name: b"#define".to_vec(),
                name: b"MAX".to_vec(),
                value: b"10".to_vec(),
                brief: Counted::new(b"limit"),
            },
            LinkedRecord::Option {
                kind: LinkedType::ApplicationOption,
                flags: 2,
                name: Counted::new(b"-o"),
                value: Counted::new(b"<file>"),
                description: Counted::fixed(b"output"),
            },
            LinkedRecord::Synopsis {
                kind: LinkedType::ApplicationSynopsis,
                name: b"pdsc".to_vec(),
                index: vec![1, 2],
            },
        ];

        for record in records {
            let bytes = encoded(&record);
            let mut pos = 0;
            assert_eq!(LinkedRecord::decode(&bytes, &mut pos).unwrap(), record);
        }
    }

    #[test]
    fn test_long_group_name_rejected() {
        let record = LinkedRecord::Group {
            kind: LinkedType::Timeline,
            group: vec![b'g'; 256],
            name: b"t".to_vec(),
        };
        let mut out = Vec::new();
        assert!(matches!(record.encode(&mut out), Err(DocError::DataTooLarge { size: 256 })));
    }

    #[test]
    fn test_records_never_straddle_blocks() {
        let mut writer = BlockWriter::new(Vec::new());
        writer.write_header(&FileHeader::new(Magic::Linked, b"", 0)).unwrap();

        let big = LinkedRecord::String(LinkedType::ApiDescription, Counted::new(&vec![b'd'; 10_000]));
        writer.write_record(&big).unwrap();
        writer.write_record(&big).unwrap();
        writer.write_record(&LinkedRecord::Empty(LinkedType::ApiEnd)).unwrap();

        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), 18 + 2 * FILE_BLOCK_SIZE);

        // first block: one record, then the sentinel and padding
        let first_end = 18 + 10_004;
        assert_eq!(bytes[first_end], LinkedType::BlockEnd as u8);
        assert!(bytes[first_end + 1..18 + FILE_BLOCK_SIZE].iter().all(|b| *b == 0));

        let (_, records) = read_linked(&bytes).unwrap();
        assert_eq!(records, vec![big.clone(), big, LinkedRecord::Empty(LinkedType::ApiEnd)]);
    }

    #[test]
    fn test_record_larger_than_block() {
        let mut writer = BlockWriter::new(Vec::new());
        let huge = LinkedRecord::String(LinkedType::ApiDescription, Counted::new(&vec![0; FILE_BLOCK_SIZE]));
        assert!(matches!(writer.write_record(&huge), Err(DocError::DataTooLarge { .. })));
    }

    #[test]
    fn test_reserved_type_not_decoded() {
        let mut pos = 0;
        assert!(matches!(
            LinkedRecord::decode(&[14], &mut pos),
            Err(DocError::UnknownRecordType { record_type: 14, .. })
        ));
    }
}
