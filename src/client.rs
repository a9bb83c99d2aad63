use crate::error::{FsError, Result};
use crate::inode::IType;
use crate::proto::{self, Command, ABORT, SUCCESS};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

// The client half of the wire: one datagram socket bound to an
// ephemeral path, one command per request, one numeric reply per
// command. Each call blocks on its reply, so a single client observes
// its own operations in order.

pub struct TfsClient {
    sock: UnixDatagram,
    server: PathBuf,
    // owns the directory holding our socket; removed on drop
    dir: TempDir,
}

impl TfsClient {
    /// Bind an ephemeral client socket and remember the server address.
    pub fn mount<P: AsRef<Path>>(server: P) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("tecnicofs-client-")
            .tempdir()?;
        let sock = UnixDatagram::bind(dir.path().join("sock"))?;
        Ok(Self {
            sock,
            server: server.as_ref().to_path_buf(),
            dir,
        })
    }

    /// Bound the wait for a reply. `None` restores blocking forever.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.sock.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn create(&self, path: &str, itype: IType) -> Result<()> {
        if itype == IType::Free {
            return Err(FsError::BadCommand(format!("create {path} as free")));
        }
        self.expect_success(&Command::Create { path, itype })
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.expect_success(&Command::Delete { path })
    }

    pub fn lookup(&self, path: &str) -> Result<u32> {
        let cmd = Command::Lookup { path };
        match self.send(&cmd)? {
            code if code >= 0 => Ok(code as u32),
            _ => Err(FsError::Request(cmd.encode())),
        }
    }

    pub fn move_node(&self, orig: &str, dest: &str) -> Result<()> {
        self.expect_success(&Command::Move { orig, dest })
    }

    /// Ask the server to dump its tree to `out_path` on the server's
    /// own filesystem.
    pub fn print(&self, out_path: &str) -> Result<()> {
        self.expect_success(&Command::Print { path: out_path })
    }

    /// Tear the client down, removing its socket path.
    pub fn unmount(self) -> Result<()> {
        let Self { sock, dir, .. } = self;
        drop(sock);
        dir.close()?;
        Ok(())
    }

    // One request, one reply.
    fn send(&self, cmd: &Command) -> Result<i32> {
        let request = proto::pack_request(&cmd.encode())?;
        self.sock.send_to(&request, &self.server)?;
        let mut buf = [0u8; 8];
        let len = self.sock.recv(&mut buf)?;
        let code = proto::decode_reply(&buf[..len])?;
        if code == ABORT {
            return Err(FsError::ServerAborted);
        }
        Ok(code)
    }

    fn expect_success(&self, cmd: &Command) -> Result<()> {
        match self.send(cmd)? {
            code if code >= SUCCESS => Ok(()),
            _ => Err(FsError::Request(cmd.encode())),
        }
    }
}
