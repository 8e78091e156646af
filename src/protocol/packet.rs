//! Typed binary frames exchanged between the controller and its remote client.
//!
//! Wire format (all integers little-endian):
//! ```text
//! ┌─────┬──────────────────────────────────────────────┐
//! │ tag │ payload                                      │
//! ├─────┼──────────────────────────────────────────────┤
//! │ 'S' │ u32 length + UTF-8 bytes                     │
//! │ 'I' │ i32                                          │
//! │ 'F' │ f32                                          │
//! │ 'C' │ 1 byte (command code)                        │
//! │ 'A' │ 1 byte (acknowledged code)                   │
//! │ 'M' │ u32 rows + u32 cols + rows*cols f64          │
//! └─────┴──────────────────────────────────────────────┘
//! ```
//!
//! `unpack_stream` blocks until a whole frame is read. A stream that ends between
//! frames yields `ConnectionClosed`; one that ends inside a frame yields `Truncated`.

use std::io::{self, Cursor, Read, Write};

use crate::error::PacketError;

/// Maximum string payload (bytes).
pub const MAX_STRING_LEN: usize = 1 << 20;
/// Maximum number of matrix elements.
pub const MAX_MATRIX_ELEMENTS: usize = 1 << 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    String,
    Integer,
    Float,
    Command,
    Acknowledge,
    Matrix,
}

impl FrameTag {
    pub fn byte(self) -> u8 {
        match self {
            FrameTag::String => b'S',
            FrameTag::Integer => b'I',
            FrameTag::Float => b'F',
            FrameTag::Command => b'C',
            FrameTag::Acknowledge => b'A',
            FrameTag::Matrix => b'M',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'S' => Some(FrameTag::String),
            b'I' => Some(FrameTag::Integer),
            b'F' => Some(FrameTag::Float),
            b'C' => Some(FrameTag::Command),
            b'A' => Some(FrameTag::Acknowledge),
            b'M' => Some(FrameTag::Matrix),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        self.byte() as char
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    String(String),
    Integer(i32),
    Float(f32),
    Command(char),
    Acknowledge(char),
    Matrix { rows: usize, cols: usize, data: Vec<f64> },
}

impl Frame {
    pub fn tag(&self) -> FrameTag {
        match self {
            Frame::String(_) => FrameTag::String,
            Frame::Integer(_) => FrameTag::Integer,
            Frame::Float(_) => FrameTag::Float,
            Frame::Command(_) => FrameTag::Command,
            Frame::Acknowledge(_) => FrameTag::Acknowledge,
            Frame::Matrix { .. } => FrameTag::Matrix,
        }
    }

    /// Build a matrix frame from fixed-width rows.
    pub fn matrix<const N: usize>(rows: &[[f64; N]]) -> Self {
        Frame::Matrix {
            rows: rows.len(),
            cols: N,
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        }
    }
}

// Codes travel as one byte; any char up to U+00FF maps back to the byte it came from.
fn code_byte(code: char) -> Result<u8, PacketError> {
    u8::try_from(code).map_err(|_| PacketError::InvalidCode(code))
}

/// Serialize one frame.
pub fn pack(frame: &Frame) -> Result<Vec<u8>, PacketError> {
    let mut out = vec![frame.tag().byte()];
    match frame {
        Frame::String(s) => {
            if s.len() > MAX_STRING_LEN {
                return Err(PacketError::Oversized { len: s.len(), max: MAX_STRING_LEN });
            }
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Frame::Integer(v) => out.extend_from_slice(&v.to_le_bytes()),
        Frame::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
        Frame::Command(c) | Frame::Acknowledge(c) => out.push(code_byte(*c)?),
        Frame::Matrix { rows, cols, data } => {
            let len = rows * cols;
            if len > MAX_MATRIX_ELEMENTS {
                return Err(PacketError::Oversized { len, max: MAX_MATRIX_ELEMENTS });
            }
            if data.len() != len {
                return Err(PacketError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("matrix data has {} elements, shape needs {len}", data.len()),
                )));
            }
            out.extend_from_slice(&(*rows as u32).to_le_bytes());
            out.extend_from_slice(&(*cols as u32).to_le_bytes());
            for v in data {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    Ok(out)
}

/// Serialize and write one frame, then flush.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<(), PacketError> {
    writer.write_all(&pack(frame)?)?;
    writer.flush()?;
    Ok(())
}

fn read_array<R: Read, const N: usize>(reader: &mut R, what: &'static str) -> Result<[u8; N], PacketError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, what))?;
    Ok(buf)
}

fn truncated(e: io::Error, what: &'static str) -> PacketError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PacketError::Truncated(what)
    } else {
        PacketError::Io(e)
    }
}

/// Block until one full frame has been read from `reader`.
pub fn unpack_stream<R: Read>(reader: &mut R) -> Result<Frame, PacketError> {
    let mut tag = [0u8; 1];
    if let Err(e) = reader.read_exact(&mut tag) {
        return Err(match e.kind() {
            io::ErrorKind::UnexpectedEof => PacketError::ConnectionClosed,
            _ => PacketError::Io(e),
        });
    }
    let tag = FrameTag::from_byte(tag[0]).ok_or(PacketError::UnknownTag(tag[0]))?;

    let frame = match tag {
        FrameTag::String => {
            let len = u32::from_le_bytes(read_array(reader, "string length")?) as usize;
            if len > MAX_STRING_LEN {
                return Err(PacketError::Oversized { len, max: MAX_STRING_LEN });
            }
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes).map_err(|e| truncated(e, "string payload"))?;
            Frame::String(String::from_utf8(bytes).map_err(|_| PacketError::InvalidUtf8)?)
        }
        FrameTag::Integer => Frame::Integer(i32::from_le_bytes(read_array(reader, "integer")?)),
        FrameTag::Float => Frame::Float(f32::from_le_bytes(read_array(reader, "float")?)),
        FrameTag::Command => Frame::Command(read_array::<_, 1>(reader, "command code")?[0] as char),
        FrameTag::Acknowledge => Frame::Acknowledge(read_array::<_, 1>(reader, "acknowledge code")?[0] as char),
        FrameTag::Matrix => {
            let rows = u32::from_le_bytes(read_array(reader, "matrix rows")?) as usize;
            let cols = u32::from_le_bytes(read_array(reader, "matrix cols")?) as usize;
            let len = rows.saturating_mul(cols);
            if len > MAX_MATRIX_ELEMENTS {
                return Err(PacketError::Oversized { len, max: MAX_MATRIX_ELEMENTS });
            }
            let mut data = Vec::with_capacity(len);
            for _ in 0..len {
                data.push(f64::from_le_bytes(read_array(reader, "matrix element")?));
            }
            Frame::Matrix { rows, cols, data }
        }
    };
    Ok(frame)
}

/// Decode a single frame from a byte slice.
pub fn unpack(bytes: &[u8]) -> Result<Frame, PacketError> {
    unpack_stream(&mut Cursor::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_layout_is_little_endian() {
        assert_eq!(pack(&Frame::Integer(-2)).unwrap(), vec![b'I', 0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn string_layout_is_length_prefixed() {
        assert_eq!(
            pack(&Frame::String("ok".into())).unwrap(),
            vec![b'S', 2, 0, 0, 0, b'o', b'k']
        );
    }

    #[test]
    fn command_and_ack_round_trip() {
        for frame in [Frame::Command('P'), Frame::Acknowledge('X')] {
            assert_eq!(unpack(&pack(&frame).unwrap()).unwrap(), frame);
        }
    }

    #[test]
    fn matrix_round_trip() {
        let frame = Frame::matrix(&[[1.0, -2.5], [0.125, 4.0]]);
        let decoded = unpack(&pack(&frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_stream_is_closed() {
        let err = unpack(&[]).unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn partial_frame_is_truncated() {
        let err = unpack(&[b'I', 1, 2]).unwrap_err();
        assert!(matches!(err, PacketError::Truncated("integer")));
        let err = unpack(&[b'S', 5, 0, 0, 0, b'a']).unwrap_err();
        assert!(matches!(err, PacketError::Truncated("string payload")));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(unpack(&[b'Z', 0]), Err(PacketError::UnknownTag(b'Z'))));
    }

    #[test]
    fn multibyte_code_is_rejected() {
        assert!(matches!(pack(&Frame::Command('€')), Err(PacketError::InvalidCode('€'))));
    }

    #[test]
    fn consecutive_frames_from_one_stream() {
        let mut bytes = pack(&Frame::Command('K')).unwrap();
        bytes.extend(pack(&Frame::Float(0.5)).unwrap());
        let mut cursor = Cursor::new(bytes);
        assert_eq!(unpack_stream(&mut cursor).unwrap(), Frame::Command('K'));
        assert_eq!(unpack_stream(&mut cursor).unwrap(), Frame::Float(0.5));
        assert!(unpack_stream(&mut cursor).unwrap_err().is_closed());
    }
}
