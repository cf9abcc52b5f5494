//! LoopError: Unified error type for the remeshing control loop
//!
//! Every fallible operation in the crate returns this type. The binary maps
//! each error onto a process outcome through [`LoopError::class`]; the library
//! itself never exits or aborts.

use crate::data::stream::{StreamKind, StreamState};
use thiserror::Error;

/// How a failure is surfaced at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed command line; reported before any engine starts.
    Usage,
    /// Misuse of the stream hand-off protocol.
    Protocol,
    /// Unrecoverable programming or data error (missing field, corrupt mesh).
    Invariant,
    /// I/O, configuration or collaborator failure.
    Environment,
}

/// Unified error type for control-loop operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoopError {
    /// Wrong number of positional arguments.
    #[error("Usage: {program} <maxTimeStep> <motion case id>")]
    Usage { program: String },
    /// A positional argument could not be parsed.
    #[error("invalid argument `{value}` for {name}")]
    InvalidArgument { name: &'static str, value: String },
    /// A stream was requested under a name that maps to no stream category.
    #[error("type of stream `{0}` is unknown")]
    UnknownStreamKind(String),
    /// A reader asked one stream for another stream's payload.
    #[error("stream kind mismatch: requested {requested:?} from a {actual:?} stream")]
    StreamKindMismatch {
        requested: StreamKind,
        actual: StreamKind,
    },
    /// Read from a stream holding no payload.
    #[error("{kind:?} stream has no payload (state: {state:?})")]
    EmptyStream { kind: StreamKind, state: StreamState },
    /// Write to a stream that still holds an unconsumed or unclear payload.
    #[error("{kind:?} stream must be cleared before it is written again (state: {state:?})")]
    StreamNotCleared { kind: StreamKind, state: StreamState },
    /// Stream payload failed to encode or decode.
    #[error("stream payload codec error: {0}")]
    StreamCodec(String),
    /// A field required by the caller is not attached to the mesh.
    #[error("field `{0}` not found on mesh")]
    MissingField(String),
    /// A field's value count does not match the entities it is attached to.
    #[error("field `{name}` has {found} values, expected {expected}")]
    FieldLengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Structural mesh verification failed.
    #[error("mesh verification failed: {0}")]
    MeshVerification(String),
    /// `adapt.inp` or a solver input file is malformed.
    #[error("configuration error at {location}: {message}")]
    ConfigParse { location: String, message: String },
    /// Checkpoint or mesh file could not be (de)serialized.
    #[error("checkpoint serialization error: {0}")]
    Checkpoint(String),
    /// The solver collaborator failed.
    #[error("solver failure: {0}")]
    Solver(String),
    /// The adaptation collaborator failed.
    #[error("mesh adaptation failure: {0}")]
    Adaptation(String),
    /// An engine failed to start.
    #[error("engine `{name}` failed to start: {message}")]
    EngineStart { name: String, message: String },
    /// Collective communication failed or returned a malformed buffer.
    #[error("communication error: {0}")]
    Communication(String),
    /// Underlying I/O error (stored as string to keep the enum `Clone`).
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LoopError {
    fn from(e: std::io::Error) -> Self {
        LoopError::Io(e.to_string())
    }
}

impl LoopError {
    /// Classify this error for process-level handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            LoopError::Usage { .. } | LoopError::InvalidArgument { .. } => ErrorClass::Usage,
            LoopError::UnknownStreamKind(_)
            | LoopError::StreamKindMismatch { .. }
            | LoopError::EmptyStream { .. }
            | LoopError::StreamNotCleared { .. }
            | LoopError::StreamCodec(_) => ErrorClass::Protocol,
            LoopError::MissingField(_)
            | LoopError::FieldLengthMismatch { .. }
            | LoopError::MeshVerification(_) => ErrorClass::Invariant,
            LoopError::ConfigParse { .. }
            | LoopError::Checkpoint(_)
            | LoopError::Solver(_)
            | LoopError::Adaptation(_)
            | LoopError::EngineStart { .. }
            | LoopError::Communication(_)
            | LoopError::Io(_) => ErrorClass::Environment,
        }
    }
}
