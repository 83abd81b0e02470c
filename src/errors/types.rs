//! Error type definitions for the EPG import pipeline
//!
//! Two families: `SourceError` covers transport (FTP/HTTP/filesystem) and is
//! fatal to the current connector unit, `ParseError` covers payload decoding
//! and distinguishes structural failures (the whole file/date unit is
//! skipped) from per-entry failures (one program is dropped) and intentional
//! skips (duplicates, known non-program sentinels).

use thiserror::Error;

/// Transport-level errors raised by source connectors
#[derive(Error, Debug)]
pub enum SourceError {
    /// FTP connect/login/list/download/delete failures
    #[error("FTP {operation} failed on '{server}': {message}")]
    Ftp {
        server: String,
        operation: String,
        message: String,
    },

    /// HTTP request failures (connection, timeout, body read)
    #[error("HTTP request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status from a provider endpoint
    #[error("unexpected HTTP status {status} from '{url}'")]
    HttpStatus { status: u16, url: String },

    /// Local filesystem errors while staging downloaded payloads
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub fn ftp<S: Into<String>, O: Into<String>, M: Into<String>>(
        server: S,
        operation: O,
        message: M,
    ) -> Self {
        Self::Ftp {
            server: server.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn io<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Payload decoding errors raised by format parsers
#[derive(Error, Debug)]
pub enum ParseError {
    /// The document could not be decoded into the provider's schema at all
    #[error("could not decode document: {0}")]
    Document(#[from] quick_xml::DeError),

    /// Mandatory structure missing (coverage window, channel identity, ...);
    /// fatal to the current file/date unit
    #[error("{message}")]
    Structure { message: String },

    /// One program entry is malformed; siblings are unaffected
    #[error("{message}")]
    Entry { message: String },

    /// Consecutive duplicate of the next program item
    #[error("duplicate of the next program: {title}")]
    Duplicate { title: String },

    /// Known non-program sentinel entry
    #[error("non-program entry: {title}")]
    NonProgram { title: String },
}

impl ParseError {
    pub fn structure<M: Into<String>>(message: M) -> Self {
        Self::Structure {
            message: message.into(),
        }
    }

    pub fn entry<M: Into<String>>(message: M) -> Self {
        Self::Entry {
            message: message.into(),
        }
    }

    /// Intentional skips are logged at info level and are not errors
    pub fn is_intentional_skip(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::NonProgram { .. })
    }
}
