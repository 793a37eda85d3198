//! Engine error types

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LspErr>;

#[derive(Error, Debug)]
pub enum LspErr {
    /// Operation is absent from the server's advertised capabilities
    #[error("operation not supported by language server")]
    NotSupported,

    /// The is-installed probe answered false
    #[error("language server {server} is not installed")]
    NotInstalled { server: String },

    /// Child could not be created, or exited during spawn
    #[error("failed to spawn {server}: {reason}")]
    SpawnFailure { server: String, reason: String },

    /// Clean end-of-file on the server's stdout
    #[error("language server stream closed")]
    Eof,

    /// Non-EOF transport breakage (closed pipe, dead write handle)
    #[error("transport failure: {0}")]
    Transport(String),

    /// The 5-second request deadline fired
    #[error("request timed out")]
    Timeout,

    /// Error object published by the server
    #[error("{code}: {message}")]
    Lsp { code: LspErrorCode, message: String },

    #[error("expected state to be {expected}, but {server} is {actual}")]
    StateViolation {
        expected: String,
        server: String,
        actual: String,
    },

    /// Strict resolution of a catalog field failed
    #[error("error resolving '{field}' for language server {server}: {reason}")]
    ConfigurationFailure {
        server: String,
        field: String,
        reason: String,
    },

    /// No decoder recognized the response shape
    #[error("unrecognized response shape: {0}")]
    DecodeFailure(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// JSON-RPC error codes published by language servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerNotInitialized,
    RequestFailed,
    ServerCancelled,
    ContentModified,
    RequestCancelled,
    UnknownErrorCode,
}

impl LspErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerNotInitialized => -32002,
            Self::RequestFailed => -32803,
            Self::ServerCancelled => -32802,
            Self::ContentModified => -32801,
            Self::RequestCancelled => -32800,
            Self::UnknownErrorCode => -32001,
        }
    }
}

impl From<i64> for LspErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32002 => Self::ServerNotInitialized,
            -32803 => Self::RequestFailed,
            -32802 => Self::ServerCancelled,
            -32801 => Self::ContentModified,
            -32800 => Self::RequestCancelled,
            _ => Self::UnknownErrorCode,
        }
    }
}

impl fmt::Display for LspErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ParseError => "ParseError",
            Self::InvalidRequest => "InvalidRequest",
            Self::MethodNotFound => "MethodNotFound",
            Self::InvalidParams => "InvalidParams",
            Self::InternalError => "InternalError",
            Self::ServerNotInitialized => "ServerNotInitialized",
            Self::RequestFailed => "RequestFailed",
            Self::ServerCancelled => "ServerCancelled",
            Self::ContentModified => "ContentModified",
            Self::RequestCancelled => "RequestCancelled",
            Self::UnknownErrorCode => "UnknownErrorCode",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn code_table_roundtrips() {
        for code in [
            LspErrorCode::ParseError,
            LspErrorCode::InvalidRequest,
            LspErrorCode::MethodNotFound,
            LspErrorCode::InvalidParams,
            LspErrorCode::InternalError,
            LspErrorCode::ServerNotInitialized,
            LspErrorCode::RequestFailed,
            LspErrorCode::ServerCancelled,
            LspErrorCode::ContentModified,
            LspErrorCode::RequestCancelled,
        ] {
            assert_eq!(LspErrorCode::from(code.code()), code);
        }
    }

    #[test]
    fn unknown_code_falls_back() {
        assert_eq!(LspErrorCode::from(-1), LspErrorCode::UnknownErrorCode);
        assert_eq!(LspErrorCode::UnknownErrorCode.code(), -32001);
    }

    #[test]
    fn state_violation_message() {
        let err = LspErr::StateViolation {
            expected: "running".to_string(),
            server: "gopls".to_string(),
            actual: "created".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "expected state to be running, but gopls is created"
        );
    }
}
