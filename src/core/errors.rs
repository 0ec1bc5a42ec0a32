//! Core error types.
//!
//! Two error families exist: `ProtocolError` for anything a misbehaving
//! client can cause (the dispatcher answers these by disconnecting that
//! client), and `ServerError` for failures of the compositor itself.

use thiserror::Error;

use crate::core::protocol::Interface;

/// A violation of the wire protocol by a client.
///
/// Every variant is client-fatal: the session that produced it moves to
/// `Closed` and its objects are destroyed. Other clients are unaffected.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    #[error("message size {0} smaller than header")]
    BadSize(u16),

    #[error("object {0} does not map to any known object")]
    UnknownObject(u32),

    #[error("object {id} is {actual}, expected {expected}")]
    InterfaceMismatch {
        id: u32,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("opcode {opcode} out of range for {interface}")]
    InvalidOpcode { interface: &'static str, opcode: u16 },

    #[error("new id {0} is already in use")]
    IdInUse(u32),

    #[error("new id {0} outside the client-allocated range")]
    BadIdRange(u32),

    #[error("unknown global name {0}")]
    UnknownGlobal(u32),

    #[error("global {name} is {advertised}, client bound it as {requested}")]
    GlobalMismatch {
        name: u32,
        advertised: &'static str,
        requested: String,
    },

    #[error("request carries no file descriptor where one is required")]
    MissingFd,

    #[error("buffer mapped storage exceeds pool limits")]
    InvalidStride,

    #[error("shm pool mmap failed: {0}")]
    PoolMap(std::io::Error),

    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("client hung up")]
    Hangup,

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// A dispatch handler was invoked on an object of the wrong kind.
    /// Only reachable if a dispatch table row disagrees with the object
    /// table, so it is reported like an interface mismatch.
    pub fn bad_target(id: u32, expected: Interface) -> Self {
        ProtocolError::InterfaceMismatch {
            id,
            expected: expected.name(),
            actual: "(unexpected object kind)",
        }
    }
}

/// Compositor-level failures.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("initialisation failed: {0}")]
    Init(String),

    #[error("required GPU feature missing: {0}")]
    GpuFeatureMissing(String),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("event loop failure: {0}")]
    EventLoop(std::io::Error),

    #[error("{context}: {source}")]
    Os {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    pub fn os(context: &'static str, source: std::io::Error) -> Self {
        ServerError::Os { context, source }
    }
}

/// GPU resource failures. These are never client-fatal: the buffer in
/// question is dropped and the surface may present empty.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("required feature missing: {0}")]
    MissingFeature(&'static str),

    #[error("image allocation failed: {0}")]
    Allocation(String),

    #[error("dmabuf import failed: {0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
