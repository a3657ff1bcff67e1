use crate::protocol::Reply;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: invalid integer '{0}'")]
    InvalidInteger(String),

    #[error("Protocol error: invalid bulk length '{0}'")]
    InvalidBulkLength(String),

    #[error("Protocol error: invalid multibulk length '{0}'")]
    InvalidArrayLength(String),

    #[error("Protocol error: bulk length {0} exceeds limit")]
    BulkTooLarge(i64),

    #[error("Protocol error: line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("Protocol error: missing CRLF after bulk payload")]
    MissingCrlf,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error means the peer or the local side closed the transport.
    ///
    /// Closed errors end a session without a reply.
    pub fn is_closed(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Convert error to an error reply
    pub fn to_reply(&self) -> Reply {
        match self {
            Error::WrongArity(cmd) => Reply::Error(format!(
                "ERR wrong number of arguments for '{}' command",
                cmd
            )),
            Error::InvalidCommand(cmd) => Reply::Error(format!("ERR unknown command '{}'", cmd)),
            _ => Reply::Error(format!("ERR {}", self)),
        }
    }
}
