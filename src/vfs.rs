//! External VFS boundary the Mount Resolver drives. Deliberately narrowed to
//! the operations the resolver needs (`root`, `lookup`, `read_link`,
//! `get_attr`); the NFS data operations (read/write/readdir/...) stay
//! external, per spec §1.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode(pub Vec<u8>);

#[derive(Debug, Clone)]
pub struct LookupResult {
    pub inode: Inode,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FileAttr {
    pub is_dir: bool,
    pub is_symlink: bool,
}

#[derive(Debug)]
pub enum VfsError {
    NotFound,
    NotDir,
    Stale,
    Io(String),
}

#[async_trait]
pub trait Vfs: Send + Sync {
    /// Root inode of a volume, used for whole-volume mounts and as the walk
    /// starting point for subdirectory mounts.
    async fn root(&self, volume: &str) -> Result<Inode, VfsError>;

    /// Looks up `name` under `parent`. Returns `VfsError::Stale` when the
    /// parent inode is stale; the resolver retries once on that error.
    async fn lookup(&self, parent: &Inode, name: &str) -> Result<LookupResult, VfsError>;

    /// Reads a symlink's target.
    async fn read_link(&self, inode: &Inode) -> Result<String, VfsError>;

    async fn get_attr(&self, inode: &Inode) -> Result<FileAttr, VfsError>;
}
