use crate::error::{FsError, Result};
use crate::param::{INODE_TABLE_SIZE, MAX_DIR_ENTRIES};
use array_macro::array;
use std::io::Write;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

// Nodes and the inode table.
//
// A node is a named record in the tree: a directory holding a fixed
// array of (name, inumber) entries, or a file, which exists by name
// only. Nodes live in a fixed array of slots, each behind its own
// reader/writer lock; an inumber is a slot index and the stable handle
// to a node.
//
// The table hands out slots write-locked. From that point on a node is
// only examined or modified through a guard on its slot, and the guards
// an operation accumulates while walking the tree live in its LockSet
// until the operation commits.

pub const FS_ROOT: u32 = 0; // the root directory's inumber

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IType {
    Free,
    File,
    Dir,
}

/// One directory entry: a name bound to an inumber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEnt {
    pub name: String,
    pub inum: u32,
}

/// The entry table of one directory. Slots are fixed; a vacant slot is
/// `None`.
#[derive(Debug)]
pub struct DirEntries {
    slots: [Option<DirEnt>; MAX_DIR_ENTRIES],
}

impl DirEntries {
    pub fn new() -> Self {
        Self {
            slots: array![None; MAX_DIR_ENTRIES],
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.slots
            .iter()
            .flatten()
            .find(|ent| ent.name == name)
            .map(|ent| ent.inum)
    }

    // Bind `name` to `inum` in the first vacant slot.
    pub fn add(&mut self, name: &str, inum: u32) -> Result<()> {
        if self.lookup(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                slot.replace(DirEnt {
                    name: name.to_string(),
                    inum,
                });
                Ok(())
            }
            None => Err(FsError::DirectoryFull(name.to_string())),
        }
    }

    // Clear the entry bound to `inum`.
    pub fn reset(&mut self, inum: u32) -> Result<()> {
        match self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(ent) if ent.inum == inum))
        {
            Some(slot) => {
                slot.take();
                Ok(())
            }
            None => Err(FsError::NotFound(format!("inumber {inum}"))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEnt> {
        self.slots.iter().flatten()
    }
}

impl Default for DirEntries {
    fn default() -> Self {
        Self::new()
    }
}

/// A node record. The payload depends on the kind.
#[derive(Debug)]
pub enum Node {
    Free,
    File,
    Dir(DirEntries),
}

impl Node {
    pub fn new(itype: IType) -> Self {
        match itype {
            IType::Free => Node::Free,
            IType::File => Node::File,
            IType::Dir => Node::Dir(DirEntries::new()),
        }
    }

    pub fn itype(&self) -> IType {
        match self {
            Node::Free => IType::Free,
            Node::File => IType::File,
            Node::Dir(_) => IType::Dir,
        }
    }

    pub fn dir_entries(&self) -> Option<&DirEntries> {
        match self {
            Node::Dir(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn dir_entries_mut(&mut self) -> Option<&mut DirEntries> {
        match self {
            Node::Dir(entries) => Some(entries),
            _ => None,
        }
    }

    // Mark the slot free. Fails when it already is, which means the
    // tree lost track of an entry. Caller holds the write guard.
    pub fn delete(&mut self) -> Result<()> {
        match self {
            Node::Free => Err(FsError::NotFound("freed inumber".to_string())),
            _ => {
                *self = Node::Free;
                Ok(())
            }
        }
    }
}

/// The fixed array of node slots. `scan` serializes the free-slot scan
/// of `alloc`; everything else goes through the per-slot locks.
pub struct InodeTable {
    slots: [RwLock<Node>; INODE_TABLE_SIZE],
    scan: Mutex<()>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            slots: array![_ => RwLock::new(Node::Free); INODE_TABLE_SIZE],
            scan: Mutex::new(()),
        }
    }

    // Claim the first free slot for a node of the given kind and return
    // it write-locked. A slot whose lock is held is in use by a running
    // operation, hence not free, so the scan skips it without blocking.
    // Fails with no side effects when every slot is taken.
    pub fn alloc(&self, itype: IType) -> Result<(u32, RwLockWriteGuard<'_, Node>)> {
        debug_assert!(itype != IType::Free);
        let _scan = self.scan.lock().map_err(|_| FsError::Lock)?;
        for (inum, slot) in self.slots.iter().enumerate() {
            match slot.try_write() {
                Ok(mut node) => {
                    if node.itype() == IType::Free {
                        *node = Node::new(itype);
                        return Ok((inum as u32, node));
                    }
                }
                Err(TryLockError::WouldBlock) => continue,
                Err(TryLockError::Poisoned(_)) => return Err(FsError::Lock),
            }
        }
        Err(FsError::TableFull)
    }

    pub fn rdlock(&self, inum: u32) -> Result<RwLockReadGuard<'_, Node>> {
        self.slot(inum).read().map_err(|_| FsError::Lock)
    }

    pub fn wrlock(&self, inum: u32) -> Result<RwLockWriteGuard<'_, Node>> {
        self.slot(inum).write().map_err(|_| FsError::Lock)
    }

    fn slot(&self, inum: u32) -> &RwLock<Node> {
        // directory entries only ever hold inumbers handed out by alloc
        self.slots
            .get(inum as usize)
            .expect("inumber within the table")
    }

    /// Dump the whole tree, one full path per line, pre-order. Read
    /// locks are taken top-down and held for the whole subtree, so the
    /// dump is one consistent snapshot.
    pub fn print_tree<W: Write>(&self, out: &mut W) -> Result<()> {
        self.print_subtree(out, FS_ROOT, "")
    }

    fn print_subtree<W: Write>(&self, out: &mut W, inum: u32, path: &str) -> Result<()> {
        let node = self.rdlock(inum)?;
        if path.is_empty() {
            writeln!(out, "/")?;
        } else {
            writeln!(out, "{path}")?;
        }
        if let Node::Dir(entries) = &*node {
            for ent in entries.iter() {
                let child = format!("{path}/{}", ent.name);
                self.print_subtree(out, ent.inum, &child)?;
            }
        }
        Ok(())
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
