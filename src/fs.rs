use crate::error::{FsError, Result};
use crate::inode::{IType, InodeTable, Node, FS_ROOT};
use crate::lockset::{LockSet, NodeLock};
use crate::param::MAX_FILE_NAME;
use std::fs::File;
use std::io::{BufWriter, Write};

// The tree engine. Five operations over the inode table:
//
//   create  - allocate a node and bind it in its parent directory
//   delete  - unbind a leaf (or empty directory) and free its slot
//   lookup  - resolve a path to an inumber
//   move    - atomically re-parent or rename one node
//   print   - dump the tree, pre-order
//
// All of them resolve paths the same way: walk from the root, pinning
// each node hand-over-hand into the operation's lock-set, read locks on
// the ancestors and a write lock on the node about to be edited. Locks
// are never given up mid-walk; the set is released wholesale when the
// operation returns, so the path it resolved still exists at commit
// time. Acquisition always runs ancestor to descendant, and a move
// orders its two walks lexicographically, which is what keeps crossing
// operations from deadlocking.

/// How a write-terminal walk pins the nodes it passes over.
#[derive(Debug, Clone, Copy)]
enum Walk {
    /// Read-lock ancestors, write-lock the terminal.
    CreateDelete,
    /// Same, but never re-lock a node this operation already holds, and
    /// write-lock the extra `shared_write` depth where the move's other
    /// ancestry ends.
    Move { shared_write: Option<usize> },
}

pub struct TecnicoFs {
    table: InodeTable,
}

impl TecnicoFs {
    /// An empty tree: just the root directory, in slot 0.
    pub fn new() -> Self {
        let table = InodeTable::new();
        {
            let (root, _guard) = table.alloc(IType::Dir).expect("fresh table has a free slot");
            assert_eq!(root, FS_ROOT, "root must land in slot 0");
        }
        Self { table }
    }

    /// Create a file or directory at `path`. The parent directory must
    /// exist and the name must be new.
    pub fn create(&self, path: &str, itype: IType) -> Result<()> {
        if itype == IType::Free {
            return Err(FsError::BadCommand(format!("create {path} as free")));
        }
        let (parent_parts, child_name) = split_parent_child(path)?;

        let mut locks = LockSet::new();
        let parent = self.lock_path(&parent_parts, &mut locks, Walk::CreateDelete)?;
        {
            let node = locks.node(parent).expect("parent is pinned");
            let entries = node
                .dir_entries()
                .ok_or_else(|| FsError::NotADirectory(path_repr(&parent_parts)))?;
            if entries.lookup(child_name).is_some() {
                return Err(FsError::AlreadyExists(path.to_string()));
            }
        }

        let (child, guard) = self.table.alloc(itype)?;
        locks.push(child, NodeLock::Write(guard));
        let added = locks
            .node_mut(parent)
            .expect("parent is pinned for writing")
            .dir_entries_mut()
            .expect("parent kind was checked above")
            .add(child_name, child);
        if let Err(err) = added {
            // parent full: give the fresh slot back
            locks
                .node_mut(child)
                .expect("child is pinned for writing")
                .delete()
                .expect("the slot was just allocated");
            return Err(err);
        }
        Ok(())
    }

    /// Delete the node at `path`. Directories must be empty.
    pub fn delete(&self, path: &str) -> Result<()> {
        let (parent_parts, child_name) = split_parent_child(path)?;

        let mut locks = LockSet::new();
        let parent = self.lock_path(&parent_parts, &mut locks, Walk::CreateDelete)?;
        let child = {
            let node = locks.node(parent).expect("parent is pinned");
            let entries = node
                .dir_entries()
                .ok_or_else(|| FsError::NotADirectory(path_repr(&parent_parts)))?;
            entries
                .lookup(child_name)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?
        };

        locks.push(child, NodeLock::Write(self.table.wrlock(child)?));
        if let Node::Dir(entries) = locks.node(child).expect("child is pinned") {
            if !entries.is_empty() {
                return Err(FsError::DirectoryNotEmpty(path.to_string()));
            }
        }

        // unbind first, then free the slot
        locks
            .node_mut(parent)
            .expect("parent is pinned for writing")
            .dir_entries_mut()
            .expect("parent kind was checked above")
            .reset(child)?;
        locks
            .node_mut(child)
            .expect("child is pinned for writing")
            .delete()?;
        Ok(())
    }

    /// Resolve `path` to its inumber. Read locks only.
    pub fn lookup(&self, path: &str) -> Result<u32> {
        let parts = split_components(path)?;
        let mut locks = LockSet::new();
        let last = parts.len();
        let mut cur = FS_ROOT;
        for depth in 0..=last {
            locks.push(cur, NodeLock::Read(self.table.rdlock(cur)?));
            if depth == last {
                return Ok(cur);
            }
            cur = match locks.node(cur).expect("current node is pinned") {
                Node::Dir(entries) => entries
                    .lookup(parts[depth])
                    .ok_or_else(|| FsError::NotFound(path.to_string()))?,
                _ => return Err(FsError::NotFound(path.to_string())),
            };
        }
        unreachable!("the walk returns at the terminal")
    }

    /// Move the node at `orig` to `dest`, re-parenting or renaming it.
    pub fn move_node(&self, orig: &str, dest: &str) -> Result<()> {
        if orig == dest {
            return Ok(());
        }
        let o_parts = split_components(orig)?;
        let d_parts = split_components(dest)?;
        if o_parts.len() <= d_parts.len() && o_parts[..] == d_parts[..o_parts.len()] {
            return Err(FsError::MoveCycle {
                orig: orig.to_string(),
                dest: dest.to_string(),
            });
        }

        let mut op_parts = o_parts;
        let o_child = op_parts
            .pop()
            .ok_or_else(|| FsError::BadPath(orig.to_string()))?;
        let mut dp_parts = d_parts;
        let d_child = dp_parts
            .pop()
            .ok_or_else(|| FsError::BadPath(dest.to_string()))?;

        // Walk the two ancestries in lexicographic order of the full
        // paths so any pair of concurrent moves agrees on the order of
        // overlapping ancestors. When the second ancestry ends on a
        // node the first walk passes over, the first walk takes that
        // node's write lock up front; the second walk then skips every
        // node already held instead of re-locking it.
        let orig_first = orig < dest;
        let (first_parts, second_parts) = if orig_first {
            (&op_parts, &dp_parts)
        } else {
            (&dp_parts, &op_parts)
        };
        let shared_write = (second_parts.len() < first_parts.len()
            && second_parts[..] == first_parts[..second_parts.len()])
            .then(|| second_parts.len());

        let mut locks = LockSet::new();
        let first = self.lock_path(first_parts, &mut locks, Walk::Move { shared_write })?;
        let second = self.lock_path(
            second_parts,
            &mut locks,
            Walk::Move { shared_write: None },
        )?;
        let (orig_parent, dest_parent) = if orig_first {
            (first, second)
        } else {
            (second, first)
        };

        {
            let node = locks.node(dest_parent).expect("destination parent is pinned");
            let entries = node
                .dir_entries()
                .ok_or_else(|| FsError::NotADirectory(path_repr(&dp_parts)))?;
            if entries.lookup(d_child).is_some() {
                return Err(FsError::AlreadyExists(dest.to_string()));
            }
        }
        let child = {
            let node = locks.node(orig_parent).expect("origin parent is pinned");
            let entries = node
                .dir_entries()
                .ok_or_else(|| FsError::NotADirectory(path_repr(&op_parts)))?;
            entries
                .lookup(o_child)
                .ok_or_else(|| FsError::NotFound(orig.to_string()))?
        };

        locks.push(child, NodeLock::Write(self.table.wrlock(child)?));
        locks
            .node_mut(orig_parent)
            .expect("origin parent is pinned for writing")
            .dir_entries_mut()
            .expect("origin kind was checked above")
            .reset(child)?;
        let added = locks
            .node_mut(dest_parent)
            .expect("destination parent is pinned for writing")
            .dir_entries_mut()
            .expect("destination kind was checked above")
            .add(d_child, child);
        if let Err(err) = added {
            // destination full: put the entry back under its old name
            locks
                .node_mut(orig_parent)
                .expect("origin parent is pinned for writing")
                .dir_entries_mut()
                .expect("origin kind was checked above")
                .add(o_child, child)
                .expect("the slot just cleared is still free");
            return Err(err);
        }
        Ok(())
    }

    /// Dump the tree to any sink.
    pub fn print_tree<W: Write>(&self, out: &mut W) -> Result<()> {
        self.table.print_tree(out)
    }

    /// Dump the tree to a file on the server's filesystem.
    pub fn print_tree_to(&self, path: &str) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.table.print_tree(&mut out)?;
        out.flush()?;
        Ok(())
    }

    // Walk `parts` from the root, pinning every node into `locks`:
    // read locks on ancestors, a write lock on the terminal (and on the
    // shared depth a move asks for). Returns the terminal's inumber.
    fn lock_path<'t>(
        &'t self,
        parts: &[&str],
        locks: &mut LockSet<'t>,
        walk: Walk,
    ) -> Result<u32> {
        let last = parts.len();
        let mut cur = FS_ROOT;
        for depth in 0..=last {
            let want_write = depth == last
                || matches!(walk, Walk::Move { shared_write: Some(d) } if d == depth);
            let skip = matches!(walk, Walk::Move { .. }) && locks.contains(cur);
            if !skip {
                let lock = if want_write {
                    NodeLock::Write(self.table.wrlock(cur)?)
                } else {
                    NodeLock::Read(self.table.rdlock(cur)?)
                };
                locks.push(cur, lock);
            }
            if depth == last {
                return Ok(cur);
            }
            cur = match locks.node(cur).expect("current node is pinned") {
                Node::Dir(entries) => entries.lookup(parts[depth]).ok_or_else(|| {
                    FsError::NotFound(path_repr(&parts[..=depth]))
                })?,
                _ => return Err(FsError::NotADirectory(path_repr(&parts[..depth]))),
            };
        }
        unreachable!("the walk returns at the terminal")
    }
}

impl Default for TecnicoFs {
    fn default() -> Self {
        Self::new()
    }
}

// Tokenize a path. One trailing slash is tolerated and stripped, the
// leading slash is optional, an empty component (`a//b`) is malformed.
// The root is the empty component list.
fn split_components(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() || path.len() > MAX_FILE_NAME {
        return Err(FsError::BadPath(path.to_string()));
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(FsError::BadPath(path.to_string()));
    }
    Ok(parts)
}

// Split into (parent components, child name); `"x"` splits to the root
// as parent and `"x"` as child. The root itself has no parent.
fn split_parent_child(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = split_components(path)?;
    match parts.pop() {
        Some(child) => Ok((parts, child)),
        None => Err(FsError::BadPath(path.to_string())),
    }
}

fn path_repr(parts: &[&str]) -> String {
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}
