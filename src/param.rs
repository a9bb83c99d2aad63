// System-wide tunables.

pub const INODE_TABLE_SIZE: usize = 50; // inode table slots, slot 0 is the root
pub const MAX_DIR_ENTRIES: usize = 20; // entries per directory
pub const MAX_FILE_NAME: usize = 100; // bound on a full path, in bytes
pub const MAX_INPUT_SIZE: usize = 100; // datagram payload on the wire
pub const LOCK_STACK_SIZE: usize = 50; // initial lock-set capacity
