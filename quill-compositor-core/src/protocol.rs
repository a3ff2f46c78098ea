//! Wire format of the window event pipes.
//!
//! Every message is a little-endian `u16` type code followed by a payload whose
//! layout is fixed per type. `Touch` is the only variable-length message: it
//! carries a point count ahead of the points.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::input::{
    KeyEvent, KeyType, PointState, TabletEvent, TabletTool, TabletType, TouchEvent, TouchPoint,
    TouchTool, TouchType,
};

/// Serialized size of one touch point.
const TOUCH_POINT_SIZE: usize = 4 + 2 + 8 * 4 + 2 + 8 + 8;

/// Most points a touch frame may carry. The panel reports far fewer slots.
pub const MAX_TOUCH_POINTS: u32 = 64;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown message type {0}")]
    UnknownType(u16),

    #[error("Message truncated")]
    Truncated,

    #[error("Invalid value {value} for {field}")]
    InvalidEnum { field: &'static str, value: u16 },

    #[error("{field} of {value} exceeds the limit of {max}")]
    TooLarge { field: &'static str, value: u32, max: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Type codes of [`WindowEvent`].
pub mod codes {
    pub const INVALID: u16 = 0;
    pub const REPAINT: u16 = 1;
    pub const WAIT_FOR_PAINT: u16 = 2;
    pub const GEOMETRY: u16 = 3;
    pub const IMAGE_INFO: u16 = 4;
    pub const RAISE: u16 = 5;
    pub const LOWER: u16 = 6;
    pub const CLOSE: u16 = 7;
    pub const FRAME_BUFFER: u16 = 8;
    pub const PING: u16 = 9;
    pub const KEY: u16 = 10;
    pub const TOUCH: u16 = 11;
    pub const TABLET: u16 = 12;
}

/// A message on a window's event pipe.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Invalid,
    /// Repaint the given window-local rectangle. Waveform 0 lets the
    /// compositor choose.
    Repaint {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        waveform: u64,
        marker: u32,
    },
    WaitForPaint {
        marker: u32,
    },
    Geometry {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        z: i32,
    },
    ImageInfo {
        size_in_bytes: u64,
        bytes_per_line: u64,
        format: i32,
    },
    Raise,
    Lower,
    Close,
    FrameBuffer,
    Ping,
    Key(KeyEvent),
    Touch(TouchEvent),
    Tablet(TabletEvent),
}

fn eof_as_truncated(err: io::Error) -> ProtocolError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::Truncated
    } else {
        ProtocolError::Io(err)
    }
}

fn read_enum<T>(
    reader: &mut impl Read,
    field: &'static str,
    parse: fn(u16) -> Option<T>,
) -> Result<T, ProtocolError> {
    let value = reader.read_u16::<LittleEndian>().map_err(eof_as_truncated)?;
    parse(value).ok_or(ProtocolError::InvalidEnum { field, value })
}

impl WindowEvent {
    pub fn type_code(&self) -> u16 {
        match self {
            WindowEvent::Invalid => codes::INVALID,
            WindowEvent::Repaint { .. } => codes::REPAINT,
            WindowEvent::WaitForPaint { .. } => codes::WAIT_FOR_PAINT,
            WindowEvent::Geometry { .. } => codes::GEOMETRY,
            WindowEvent::ImageInfo { .. } => codes::IMAGE_INFO,
            WindowEvent::Raise => codes::RAISE,
            WindowEvent::Lower => codes::LOWER,
            WindowEvent::Close => codes::CLOSE,
            WindowEvent::FrameBuffer => codes::FRAME_BUFFER,
            WindowEvent::Ping => codes::PING,
            WindowEvent::Key(_) => codes::KEY,
            WindowEvent::Touch(_) => codes::TOUCH,
            WindowEvent::Tablet(_) => codes::TABLET,
        }
    }

    /// Serializes the message, type code included.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.type_code())?;
        match self {
            WindowEvent::Invalid
            | WindowEvent::Raise
            | WindowEvent::Lower
            | WindowEvent::Close
            | WindowEvent::FrameBuffer
            | WindowEvent::Ping => {}
            WindowEvent::Repaint {
                x,
                y,
                width,
                height,
                waveform,
                marker,
            } => {
                writer.write_i32::<LittleEndian>(*x)?;
                writer.write_i32::<LittleEndian>(*y)?;
                writer.write_i32::<LittleEndian>(*width)?;
                writer.write_i32::<LittleEndian>(*height)?;
                writer.write_u64::<LittleEndian>(*waveform)?;
                writer.write_u32::<LittleEndian>(*marker)?;
            }
            WindowEvent::WaitForPaint { marker } => {
                writer.write_u32::<LittleEndian>(*marker)?;
            }
            WindowEvent::Geometry {
                x,
                y,
                width,
                height,
                z,
            } => {
                writer.write_i32::<LittleEndian>(*x)?;
                writer.write_i32::<LittleEndian>(*y)?;
                writer.write_i32::<LittleEndian>(*width)?;
                writer.write_i32::<LittleEndian>(*height)?;
                writer.write_i32::<LittleEndian>(*z)?;
            }
            WindowEvent::ImageInfo {
                size_in_bytes,
                bytes_per_line,
                format,
            } => {
                writer.write_u64::<LittleEndian>(*size_in_bytes)?;
                writer.write_u64::<LittleEndian>(*bytes_per_line)?;
                writer.write_i32::<LittleEndian>(*format)?;
            }
            WindowEvent::Key(key) => {
                writer.write_u16::<LittleEndian>(key.event_type.to_wire())?;
                writer.write_u32::<LittleEndian>(key.code)?;
                writer.write_u32::<LittleEndian>(key.unicode)?;
                writer.write_u32::<LittleEndian>(key.scan_code)?;
            }
            WindowEvent::Touch(touch) => {
                writer.write_u32::<LittleEndian>(touch.points.len() as u32)?;
                writer.write_u16::<LittleEndian>(touch.event_type.to_wire())?;
                for point in &touch.points {
                    writer.write_i32::<LittleEndian>(point.id)?;
                    writer.write_u16::<LittleEndian>(point.state.to_wire())?;
                    writer.write_f64::<LittleEndian>(point.x)?;
                    writer.write_f64::<LittleEndian>(point.y)?;
                    writer.write_f64::<LittleEndian>(point.width)?;
                    writer.write_f64::<LittleEndian>(point.height)?;
                    writer.write_u16::<LittleEndian>(point.tool.to_wire())?;
                    writer.write_f64::<LittleEndian>(point.pressure)?;
                    writer.write_f64::<LittleEndian>(point.rotation)?;
                }
            }
            WindowEvent::Tablet(tablet) => {
                writer.write_u16::<LittleEndian>(tablet.event_type.to_wire())?;
                writer.write_u16::<LittleEndian>(tablet.tool.to_wire())?;
                writer.write_i32::<LittleEndian>(tablet.x)?;
                writer.write_i32::<LittleEndian>(tablet.y)?;
                writer.write_f64::<LittleEndian>(tablet.pressure)?;
                writer.write_i32::<LittleEndian>(tablet.tilt_x)?;
                writer.write_i32::<LittleEndian>(tablet.tilt_y)?;
            }
        }
        Ok(())
    }

    /// Decodes one message from the front of `bytes`, returning it with the
    /// number of bytes consumed. [`ProtocolError::Truncated`] means more bytes
    /// are needed.
    pub fn decode(bytes: &[u8]) -> Result<(WindowEvent, usize), ProtocolError> {
        let mut cursor = Cursor::new(bytes);
        let event = Self::read_from(&mut cursor)?;
        Ok((event, cursor.position() as usize))
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<WindowEvent, ProtocolError> {
        let code = reader.read_u16::<LittleEndian>().map_err(eof_as_truncated)?;
        Self::read_payload(code, reader).map_err(|e| match e {
            ProtocolError::Io(io) => eof_as_truncated(io),
            other => other,
        })
    }

    fn read_payload<R: Read>(code: u16, r: &mut R) -> Result<WindowEvent, ProtocolError> {
        let event = match code {
            codes::INVALID => WindowEvent::Invalid,
            codes::REPAINT => WindowEvent::Repaint {
                x: r.read_i32::<LittleEndian>()?,
                y: r.read_i32::<LittleEndian>()?,
                width: r.read_i32::<LittleEndian>()?,
                height: r.read_i32::<LittleEndian>()?,
                waveform: r.read_u64::<LittleEndian>()?,
                marker: r.read_u32::<LittleEndian>()?,
            },
            codes::WAIT_FOR_PAINT => WindowEvent::WaitForPaint {
                marker: r.read_u32::<LittleEndian>()?,
            },
            codes::GEOMETRY => WindowEvent::Geometry {
                x: r.read_i32::<LittleEndian>()?,
                y: r.read_i32::<LittleEndian>()?,
                width: r.read_i32::<LittleEndian>()?,
                height: r.read_i32::<LittleEndian>()?,
                z: r.read_i32::<LittleEndian>()?,
            },
            codes::IMAGE_INFO => WindowEvent::ImageInfo {
                size_in_bytes: r.read_u64::<LittleEndian>()?,
                bytes_per_line: r.read_u64::<LittleEndian>()?,
                format: r.read_i32::<LittleEndian>()?,
            },
            codes::RAISE => WindowEvent::Raise,
            codes::LOWER => WindowEvent::Lower,
            codes::CLOSE => WindowEvent::Close,
            codes::FRAME_BUFFER => WindowEvent::FrameBuffer,
            codes::PING => WindowEvent::Ping,
            codes::KEY => WindowEvent::Key(KeyEvent {
                event_type: read_enum(r, "key type", KeyType::from_wire)?,
                code: r.read_u32::<LittleEndian>()?,
                unicode: r.read_u32::<LittleEndian>()?,
                scan_code: r.read_u32::<LittleEndian>()?,
            }),
            codes::TOUCH => {
                let count = r.read_u32::<LittleEndian>()?;
                if count > MAX_TOUCH_POINTS {
                    return Err(ProtocolError::TooLarge {
                        field: "touch point count",
                        value: count,
                        max: MAX_TOUCH_POINTS,
                    });
                }
                let event_type = read_enum(r, "touch type", TouchType::from_wire)?;
                let mut points = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    points.push(TouchPoint {
                        id: r.read_i32::<LittleEndian>()?,
                        state: read_enum(r, "touch point state", PointState::from_wire)?,
                        x: r.read_f64::<LittleEndian>()?,
                        y: r.read_f64::<LittleEndian>()?,
                        width: r.read_f64::<LittleEndian>()?,
                        height: r.read_f64::<LittleEndian>()?,
                        tool: read_enum(r, "touch tool", TouchTool::from_wire)?,
                        pressure: r.read_f64::<LittleEndian>()?,
                        rotation: r.read_f64::<LittleEndian>()?,
                    });
                }
                WindowEvent::Touch(TouchEvent { event_type, points })
            }
            codes::TABLET => WindowEvent::Tablet(TabletEvent {
                event_type: read_enum(r, "tablet type", TabletType::from_wire)?,
                tool: read_enum(r, "tablet tool", TabletTool::from_wire)?,
                x: r.read_i32::<LittleEndian>()?,
                y: r.read_i32::<LittleEndian>()?,
                pressure: r.read_f64::<LittleEndian>()?,
                tilt_x: r.read_i32::<LittleEndian>()?,
                tilt_y: r.read_i32::<LittleEndian>()?,
            }),
            unknown => return Err(ProtocolError::UnknownType(unknown)),
        };
        Ok(event)
    }
}

/// Reassembles messages from a byte stream that may deliver partial frames.
#[derive(Debug, Default)]
pub struct FrameReader {
    pending: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet decoded.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Returns the next complete message, `Ok(None)` if more bytes are needed.
    ///
    /// A malformed frame cannot be resynchronized, so on any error other than
    /// truncation the buffer is discarded.
    pub fn next_event(&mut self) -> Result<Option<WindowEvent>, ProtocolError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        match WindowEvent::decode(&self.pending) {
            Ok((event, used)) => {
                self.pending.drain(..used);
                Ok(Some(event))
            }
            Err(ProtocolError::Truncated) => Ok(None),
            Err(e) => {
                self.pending.clear();
                Err(e)
            }
        }
    }
}
