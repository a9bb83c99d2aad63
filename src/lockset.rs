use crate::inode::Node;
use crate::param::LOCK_STACK_SIZE;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

// The lock-set: every node lock one operation currently holds, in
// acquisition order. Operations never unlock a node individually; the
// whole set is released at once on every exit path, which is what keeps
// a resolved path alive until the operation commits.

/// A held read or write guard on one inode slot.
pub enum NodeLock<'t> {
    Read(RwLockReadGuard<'t, Node>),
    Write(RwLockWriteGuard<'t, Node>),
}

impl NodeLock<'_> {
    fn node(&self) -> &Node {
        match self {
            NodeLock::Read(guard) => guard,
            NodeLock::Write(guard) => guard,
        }
    }
}

pub struct LockSet<'t> {
    held: Vec<(u32, NodeLock<'t>)>,
}

impl<'t> LockSet<'t> {
    pub fn new() -> Self {
        Self {
            held: Vec::with_capacity(LOCK_STACK_SIZE),
        }
    }

    pub fn push(&mut self, inum: u32, lock: NodeLock<'t>) {
        self.held.push((inum, lock));
    }

    pub fn contains(&self, inum: u32) -> bool {
        self.held.iter().any(|(held, _)| *held == inum)
    }

    /// View a held node, through whichever guard pinned it.
    pub fn node(&self, inum: u32) -> Option<&Node> {
        self.held
            .iter()
            .find(|(held, _)| *held == inum)
            .map(|(_, lock)| lock.node())
    }

    /// Mutate a held node. Only write guards qualify.
    pub fn node_mut(&mut self, inum: u32) -> Option<&mut Node> {
        match self.held.iter_mut().find(|(held, _)| *held == inum)? {
            (_, NodeLock::Write(guard)) => Some(&mut **guard),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    // Unlock everything, newest first.
    pub fn release(&mut self) {
        while self.held.pop().is_some() {}
    }
}

impl Default for LockSet<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::{IType, InodeTable};

    #[test]
    fn tracks_membership_and_access() {
        let table = InodeTable::new();
        let (a, a_guard) = table.alloc(IType::Dir).unwrap();
        let (b, b_guard) = table.alloc(IType::File).unwrap();
        drop((a_guard, b_guard));

        let mut locks = LockSet::new();
        locks.push(a, NodeLock::Read(table.rdlock(a).unwrap()));
        locks.push(b, NodeLock::Write(table.wrlock(b).unwrap()));

        assert!(locks.contains(a));
        assert!(locks.contains(b));
        assert!(!locks.contains(7));
        assert_eq!(locks.len(), 2);

        assert_eq!(locks.node(a).unwrap().itype(), IType::Dir);
        // a read guard never yields a mutable view
        assert!(locks.node_mut(a).is_none());
        assert!(locks.node_mut(b).is_some());
    }

    #[test]
    fn release_frees_every_lock() {
        let table = InodeTable::new();
        let (a, guard) = table.alloc(IType::Dir).unwrap();
        drop(guard);

        let mut locks = LockSet::new();
        locks.push(a, NodeLock::Write(table.wrlock(a).unwrap()));
        locks.release();
        assert!(locks.is_empty());

        // the slot must be lockable again
        drop(table.wrlock(a).unwrap());
    }

    #[test]
    fn drop_releases_like_release() {
        let table = InodeTable::new();
        let (a, guard) = table.alloc(IType::Dir).unwrap();
        drop(guard);
        {
            let mut locks = LockSet::new();
            locks.push(a, NodeLock::Write(table.wrlock(a).unwrap()));
        }
        drop(table.wrlock(a).unwrap());
    }
}
