// TecnicoFS: an in-memory tree of named nodes, served to local clients
// over a unix datagram socket. The library holds the concurrent tree
// engine and both ends of the wire; the binary is a thin CLI around
// `server::Server`.

pub mod client;
pub mod error;
pub mod fs;
pub mod inode;
pub mod lockset;
pub mod param;
pub mod proto;
pub mod server;
