use crate::error::FsError;
use crate::fs::TecnicoFs;
use crate::param::MAX_INPUT_SIZE;
use crate::proto::{self, Command, ABORT, FAIL, SUCCESS};
use log::{debug, error, warn};
use std::fs;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

// The service endpoint: one datagram socket shared by a fixed pool of
// worker threads. Each worker loops on recv, runs the decoded command
// against the shared tree, and sends the numeric result back to the
// sender's address. The kernel's datagram queue is the only request
// queue; no user-level one is needed.

pub struct Server {
    fs: TecnicoFs,
    sock: UnixDatagram,
    path: PathBuf,
}

impl Server {
    /// Bind the service socket, replacing a stale socket file left by
    /// an earlier run, and build an empty tree.
    pub fn bind<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        let sock = UnixDatagram::bind(&path)?;
        Ok(Self {
            fs: TecnicoFs::new(),
            sock,
            path,
        })
    }

    pub fn fs(&self) -> &TecnicoFs {
        &self.fs
    }

    /// Run `nworkers` receive loops over the shared socket. Does not
    /// return under normal operation.
    pub fn run(self: &Arc<Self>, nworkers: usize) -> io::Result<()> {
        let mut workers = Vec::with_capacity(nworkers);
        for i in 0..nworkers {
            let server = Arc::clone(self);
            let worker = thread::Builder::new()
                .name(format!("tfs-worker-{i}"))
                .spawn(move || server.serve())?;
            workers.push(worker);
        }
        for worker in workers {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
        Ok(())
    }

    fn serve(&self) {
        let mut buf = [0u8; MAX_INPUT_SIZE];
        loop {
            let (len, peer) = match self.sock.recv_from(&mut buf) {
                Ok(received) => received,
                Err(err) => {
                    warn!("recv failed: {err}");
                    continue;
                }
            };
            let code = self.apply(&buf[..len]);
            match peer.as_pathname() {
                Some(addr) => {
                    if let Err(err) = self.sock.send_to(&proto::encode_reply(code), addr) {
                        warn!("reply to {} failed: {err}", addr.display());
                    }
                }
                None => warn!("dropping reply to an unbound client"),
            }
            if code == ABORT {
                error!("tree state is no longer trustworthy, aborting");
                process::exit(1);
            }
        }
    }

    // Decode one datagram and run it against the tree. Always yields a
    // wire code; the human-readable diagnostics go to the log.
    fn apply(&self, raw: &[u8]) -> i32 {
        let cmd = match proto::unpack_request(raw).and_then(Command::parse) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!("{err}");
                return FAIL;
            }
        };
        let outcome = match cmd {
            Command::Create { path, itype } => self.fs.create(path, itype).map(|()| SUCCESS),
            Command::Lookup { path } => self.fs.lookup(path).map(|inum| inum as i32),
            Command::Delete { path } => self.fs.delete(path).map(|()| SUCCESS),
            Command::Move { orig, dest } => self.fs.move_node(orig, dest).map(|()| SUCCESS),
            Command::Print { path } => self.fs.print_tree_to(path).map(|()| SUCCESS),
        };
        match outcome {
            Ok(code) => {
                debug!("{} -> {code}", cmd.encode());
                code
            }
            Err(FsError::Lock) => {
                error!("{}: {}", cmd.encode(), FsError::Lock);
                ABORT
            }
            Err(err) => {
                warn!("{}: {err}", cmd.encode());
                FAIL
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::IType;

    fn bound_server() -> (Server, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(dir.path().join("tfs.sock")).unwrap();
        (server, dir)
    }

    #[test]
    fn apply_maps_outcomes_to_wire_codes() {
        let (server, _dir) = bound_server();
        assert_eq!(server.apply(b"c /x d"), SUCCESS);
        assert!(server.apply(b"l /x") >= 1);
        assert_eq!(server.apply(b"d /x"), SUCCESS);
        assert_eq!(server.apply(b"l /x"), FAIL);
    }

    #[test]
    fn apply_rejects_garbage_without_mutating() {
        let (server, _dir) = bound_server();
        assert_eq!(server.apply(b"z /x"), FAIL);
        assert_eq!(server.apply(b"c /x q"), FAIL);
        assert_eq!(server.apply(&[0xff, 0xfe, 0x00]), FAIL);
        assert_eq!(server.apply(b""), FAIL);
        // nothing was created along the way
        assert!(server.fs().lookup("/x").is_err());
    }

    #[test]
    fn apply_handles_an_unterminated_buffer() {
        let (server, _dir) = bound_server();
        // exactly MAX_INPUT_SIZE bytes, no NUL anywhere
        let mut raw = vec![b'x'; MAX_INPUT_SIZE];
        raw[0] = b'l';
        raw[1] = b' ';
        assert_eq!(server.apply(&raw), FAIL);
    }

    #[test]
    fn binding_replaces_a_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tfs.sock");
        let first = Server::bind(&path).unwrap();
        first.fs().create("/gone", IType::File).unwrap();
        drop(first);
        let second = Server::bind(&path).unwrap();
        assert!(second.fs().lookup("/gone").is_err());
    }
}
