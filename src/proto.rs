use crate::error::{FsError, Result};
use crate::inode::IType;
use crate::param::MAX_INPUT_SIZE;

// The wire protocol. A request is one ASCII command line, NUL padded to
// exactly MAX_INPUT_SIZE bytes; a reply is one 4-byte native-endian
// integer: an inumber for a lookup hit, SUCCESS for everything else
// that worked, FAIL for an operation-level failure, ABORT when the
// server is going down.

pub const SUCCESS: i32 = 0;
pub const FAIL: i32 = -1;
pub const ABORT: i32 = -2;

/// One parsed command line:
/// `c <path> <f|d>`, `l <path>`, `d <path>`, `m <orig> <dest>`,
/// `p <out-path>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Create { path: &'a str, itype: IType },
    Lookup { path: &'a str },
    Delete { path: &'a str },
    Move { orig: &'a str, dest: &'a str },
    Print { path: &'a str },
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Result<Self> {
        let mut tokens = line.split_ascii_whitespace();
        let bad = || FsError::BadCommand(line.to_string());
        let cmd = match tokens.next().ok_or_else(bad)? {
            "c" => {
                let path = tokens.next().ok_or_else(bad)?;
                let itype = match tokens.next().ok_or_else(bad)? {
                    "f" => IType::File,
                    "d" => IType::Dir,
                    _ => return Err(bad()),
                };
                Command::Create { path, itype }
            }
            "l" => Command::Lookup {
                path: tokens.next().ok_or_else(bad)?,
            },
            "d" => Command::Delete {
                path: tokens.next().ok_or_else(bad)?,
            },
            "m" => Command::Move {
                orig: tokens.next().ok_or_else(bad)?,
                dest: tokens.next().ok_or_else(bad)?,
            },
            "p" => Command::Print {
                path: tokens.next().ok_or_else(bad)?,
            },
            _ => return Err(bad()),
        };
        if tokens.next().is_some() {
            return Err(bad());
        }
        Ok(cmd)
    }

    pub fn encode(&self) -> String {
        match self {
            Command::Create { path, itype } => {
                let kind = match itype {
                    IType::File => 'f',
                    IType::Dir => 'd',
                    IType::Free => unreachable!("free is not a wire kind"),
                };
                format!("c {path} {kind}")
            }
            Command::Lookup { path } => format!("l {path}"),
            Command::Delete { path } => format!("d {path}"),
            Command::Move { orig, dest } => format!("m {orig} {dest}"),
            Command::Print { path } => format!("p {path}"),
        }
    }
}

/// NUL-pad a command line to the fixed request size. Lines that do not
/// fit (the NUL terminator included) are rejected.
pub fn pack_request(line: &str) -> Result<[u8; MAX_INPUT_SIZE]> {
    let bytes = line.as_bytes();
    if bytes.len() >= MAX_INPUT_SIZE {
        return Err(FsError::BadCommand(line.to_string()));
    }
    let mut buf = [0u8; MAX_INPUT_SIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// Recover the command line from a received datagram: cut at the first
/// NUL, then drop trailing whitespace from hand-written clients.
pub fn unpack_request(raw: &[u8]) -> Result<&str> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::trim_end)
        .map_err(|_| FsError::BadCommand(format!("{} undecodable bytes", raw.len())))
}

pub fn encode_reply(code: i32) -> [u8; 4] {
    code.to_ne_bytes()
}

pub fn decode_reply(raw: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = raw
        .try_into()
        .map_err(|_| FsError::Protocol("reply is not 4 bytes"))?;
    Ok(i32::from_ne_bytes(bytes))
}
