use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, FsError>;

/// Everything that can go wrong while serving a request. Each variant
/// maps to the `FAIL` reply on the wire, except `Lock`, which maps to
/// `ABORT`: a poisoned node lock means a worker died mid-update and the
/// tree can no longer be trusted.
#[derive(Debug)]
pub enum FsError {
    BadCommand(String),
    BadPath(String),
    NotFound(String),
    AlreadyExists(String),
    NotADirectory(String),
    DirectoryNotEmpty(String),
    TableFull,
    DirectoryFull(String),
    MoveCycle { orig: String, dest: String },
    Io(io::Error),
    Lock,
    // client side
    Request(String),
    ServerAborted,
    Protocol(&'static str),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::BadCommand(line) => write!(f, "invalid command {line:?}"),
            FsError::BadPath(path) => write!(f, "invalid path {path:?}"),
            FsError::NotFound(path) => write!(f, "{path} not found"),
            FsError::AlreadyExists(path) => write!(f, "{path} already exists"),
            FsError::NotADirectory(path) => write!(f, "{path} is not a directory"),
            FsError::DirectoryNotEmpty(path) => {
                write!(f, "{path} is a directory and not empty")
            }
            FsError::TableFull => write!(f, "inode table is full"),
            FsError::DirectoryFull(name) => write!(f, "directory has no room for {name}"),
            FsError::MoveCycle { orig, dest } => {
                write!(f, "{dest} is inside {orig}")
            }
            FsError::Io(err) => write!(f, "i/o error: {err}"),
            FsError::Lock => write!(f, "node lock poisoned"),
            FsError::Request(cmd) => write!(f, "server rejected {cmd:?}"),
            FsError::ServerAborted => write!(f, "server shut down"),
            FsError::Protocol(what) => write!(f, "bad reply: {what}"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::Io(err)
    }
}
