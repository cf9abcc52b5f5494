//! In-memory field streams between solve and adapt phases.
//!
//! A [`FieldStream`] replaces the restart and geometry files a solver would
//! normally exchange with the mesh layer. Each stream is single use:
//!
//! ```text
//!   Empty --write--> Written --open_for_read--> Consumed --clear--> Empty
//! ```
//!
//! Any other transition is a protocol error. The state is tracked by the
//! stream itself so misuse surfaces as a checked [`LoopError`] instead of a
//! silently stale or missing payload.
//!
//! # Example
//! ```rust
//! use remesh_loop::data::field::{Association, Field};
//! use remesh_loop::data::stream::{FieldStream, StreamKind, StreamPayload};
//!
//! let mut rs = FieldStream::new(StreamKind::Restart);
//! let payload = StreamPayload::new(4, vec![Field::scalar("p", Association::Vertex, vec![1.0])]);
//! rs.write(&payload)?;
//! let back = rs.open_for_read(StreamKind::Restart)?.decode()?;
//! assert_eq!(back.step, 4);
//! rs.clear();
//! assert!(rs.open_for_read(StreamKind::Restart).is_err());
//! # Ok::<(), remesh_loop::loop_error::LoopError>(())
//! ```

use crate::data::field::Field;
use crate::loop_error::LoopError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};

/// Category of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Solver solution state.
    Restart,
    /// Mesh geometry prepared for the solver.
    GeomRestart,
}

impl StreamKind {
    /// Map a file-like stream name onto its category.
    ///
    /// Solvers open their inputs by file name; names containing `geombc`
    /// resolve to the geometric restart stream and names containing
    /// `restart` to the restart stream.
    ///
    /// # Errors
    /// `UnknownStreamKind` for any other name.
    pub fn from_name(name: &str) -> Result<Self, LoopError> {
        if name.contains("geombc") {
            Ok(StreamKind::GeomRestart)
        } else if name.contains("restart") {
            Ok(StreamKind::Restart)
        } else {
            Err(LoopError::UnknownStreamKind(name.to_string()))
        }
    }
}

/// Lifecycle state of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// No payload; writable.
    Empty,
    /// Holds one unread payload.
    Written,
    /// Payload handed to a reader; must be cleared before reuse.
    Consumed,
}

/// Fields plus the step they belong to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamPayload {
    /// Solver step the fields describe.
    pub step: u32,
    /// Fields in the order the writer produced them.
    pub fields: Vec<Field>,
}

impl StreamPayload {
    /// Bundle `fields` for `step`.
    pub fn new(step: u32, fields: Vec<Field>) -> Self {
        Self { step, fields }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Serialize with bincode.
    ///
    /// # Errors
    /// `StreamCodec` if a field cannot be encoded.
    pub fn encode(&self) -> Result<Bytes, LoopError> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| LoopError::StreamCodec(e.to_string()))
    }

    /// Inverse of [`StreamPayload::encode`].
    ///
    /// # Errors
    /// `StreamCodec` on truncated or corrupt bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, LoopError> {
        bincode::deserialize(bytes).map_err(|e| LoopError::StreamCodec(e.to_string()))
    }
}

/// Readable handle over a stream's payload, positioned at its start.
#[derive(Debug)]
pub struct StreamReader {
    kind: StreamKind,
    cursor: Cursor<Bytes>,
}

impl StreamReader {
    /// Kind of the stream this reader was opened on.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }

    /// Decode the remaining bytes as a [`StreamPayload`].
    pub fn decode(mut self) -> Result<StreamPayload, LoopError> {
        let mut buf = Vec::with_capacity(self.remaining());
        self.cursor.read_to_end(&mut buf)?;
        StreamPayload::decode(&buf)
    }
}

impl Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

/// Single-use in-memory channel for one stream kind.
#[derive(Debug)]
pub struct FieldStream {
    kind: StreamKind,
    state: StreamState,
    payload: Option<Bytes>,
}

impl FieldStream {
    /// A new, empty stream.
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            state: StreamState::Empty,
            payload: None,
        }
    }

    /// Kind fixed at construction.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// True if a payload is waiting to be read.
    pub fn has_payload(&self) -> bool {
        self.state == StreamState::Written
    }

    /// Store raw bytes as this stream's payload.
    ///
    /// # Errors
    /// `StreamNotCleared` unless the stream is `Empty`.
    pub fn write_bytes(&mut self, bytes: Bytes) -> Result<(), LoopError> {
        if self.state != StreamState::Empty {
            return Err(LoopError::StreamNotCleared {
                kind: self.kind,
                state: self.state,
            });
        }
        log::debug!("{:?} stream: wrote {} bytes", self.kind, bytes.len());
        self.payload = Some(bytes);
        self.state = StreamState::Written;
        Ok(())
    }

    /// Encode and store `payload`.
    pub fn write(&mut self, payload: &StreamPayload) -> Result<(), LoopError> {
        let bytes = payload.encode()?;
        self.write_bytes(bytes)
    }

    /// Hand the payload to a reader and mark the stream consumed.
    ///
    /// # Errors
    /// - `StreamKindMismatch` if `kind` is not this stream's kind.
    /// - `EmptyStream` if nothing was written since the last clear, or the
    ///   payload was already read.
    pub fn open_for_read(&mut self, kind: StreamKind) -> Result<StreamReader, LoopError> {
        if kind != self.kind {
            return Err(LoopError::StreamKindMismatch {
                requested: kind,
                actual: self.kind,
            });
        }
        if self.state != StreamState::Written {
            return Err(LoopError::EmptyStream {
                kind: self.kind,
                state: self.state,
            });
        }
        let bytes = self.payload.clone().ok_or(LoopError::EmptyStream {
            kind: self.kind,
            state: self.state,
        })?;
        self.state = StreamState::Consumed;
        Ok(StreamReader {
            kind,
            cursor: Cursor::new(bytes),
        })
    }

    /// Resolve `name` to a stream kind and open it for reading.
    pub fn open_named(&mut self, name: &str) -> Result<StreamReader, LoopError> {
        let kind = StreamKind::from_name(name)?;
        self.open_for_read(kind)
    }

    /// Discard any payload and return to `Empty`.
    pub fn clear(&mut self) {
        if self.state == StreamState::Written {
            log::warn!("{:?} stream cleared with an unread payload", self.kind);
        }
        self.payload = None;
        self.state = StreamState::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::field::Association;

    fn payload(step: u32) -> StreamPayload {
        StreamPayload::new(
            step,
            vec![Field::scalar("pressure", Association::Vertex, vec![1.0, 2.0])],
        )
    }

    #[test]
    fn write_read_clear_read_fails() {
        let mut rs = FieldStream::new(StreamKind::Restart);
        rs.write(&payload(3)).unwrap();
        let got = rs.open_for_read(StreamKind::Restart).unwrap().decode().unwrap();
        assert_eq!(got, payload(3));
        rs.clear();
        let err = rs.open_for_read(StreamKind::Restart).unwrap_err();
        assert_eq!(
            err,
            LoopError::EmptyStream {
                kind: StreamKind::Restart,
                state: StreamState::Empty
            }
        );
    }

    #[test]
    fn second_read_without_write_is_rejected() {
        let mut rs = FieldStream::new(StreamKind::Restart);
        rs.write(&payload(1)).unwrap();
        rs.open_for_read(StreamKind::Restart).unwrap();
        assert!(matches!(
            rs.open_for_read(StreamKind::Restart),
            Err(LoopError::EmptyStream {
                state: StreamState::Consumed,
                ..
            })
        ));
    }

    #[test]
    fn write_requires_clear() {
        let mut grs = FieldStream::new(StreamKind::GeomRestart);
        grs.write(&payload(0)).unwrap();
        assert!(matches!(
            grs.write(&payload(0)),
            Err(LoopError::StreamNotCleared { .. })
        ));
        grs.open_for_read(StreamKind::GeomRestart).unwrap();
        assert!(grs.write(&payload(0)).is_err());
        grs.clear();
        grs.write(&payload(0)).unwrap();
        assert!(grs.has_payload());
    }

    #[test]
    fn streams_are_not_cross_consumed() {
        let mut grs = FieldStream::new(StreamKind::GeomRestart);
        grs.write(&payload(0)).unwrap();
        assert!(matches!(
            grs.open_for_read(StreamKind::Restart),
            Err(LoopError::StreamKindMismatch { .. })
        ));
        assert_eq!(grs.state(), StreamState::Written);
    }

    #[test]
    fn names_resolve_to_kinds() {
        assert_eq!(StreamKind::from_name("restart.1.1").unwrap(), StreamKind::Restart);
        assert_eq!(
            StreamKind::from_name("geombc.dat.1").unwrap(),
            StreamKind::GeomRestart
        );
        assert_eq!(
            StreamKind::from_name("solution.vtk"),
            Err(LoopError::UnknownStreamKind("solution.vtk".into()))
        );
    }

    #[test]
    fn reader_starts_at_payload_start() {
        let mut rs = FieldStream::new(StreamKind::Restart);
        rs.write_bytes(Bytes::from_static(b"abcdef")).unwrap();
        let mut reader = rs.open_named("restart.0.1").unwrap();
        let mut head = [0u8; 3];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"abc");
        assert_eq!(reader.remaining(), 3);
    }
}
