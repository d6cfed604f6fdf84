//! Crate-wide error taxonomy (spec §7): wire errors surfaced to the client,
//! and internal categories that drive propagation policy.

use std::fmt;

/// Wire-facing error codes. Maps directly onto the ten codes the MOUNT/NFS
/// protocols expect; `Ok` is not itself an error but is listed for
/// completeness of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    Ok,
    NoEnt,
    Perm,
    Io,
    Acces,
    NotDir,
    Inval,
    NotSupp,
    ServerFault,
    Rofs,
    Stale,
}

/// Internal error categories. `Parse` and `Policy` failures are line/request
/// scoped and recoverable; `Alloc` aborts the enclosing parse; `StaleInode`
/// is retried once by the resolver; `Config` is fatal at init.
#[derive(Debug)]
pub enum CoreError {
    Parse(String),
    Alloc,
    Policy(WireError),
    StaleInode,
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Parse(msg) => write!(f, "parse error: {msg}"),
            CoreError::Alloc => write!(f, "allocation failure"),
            CoreError::Policy(e) => write!(f, "policy denial: {e:?}"),
            CoreError::StaleInode => write!(f, "stale inode"),
            CoreError::Config(msg) => write!(f, "configuration error: {msg}"),
            CoreError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e)
    }
}

impl CoreError {
    /// Maps an internal error onto the wire taxonomy per spec §7:
    /// EACCES -> ACCES, EROFS -> ROFS, ESTALE -> STALE, ENOMEM -> SERVERFAULT.
    pub fn to_wire(&self) -> WireError {
        match self {
            CoreError::Parse(_) => WireError::Inval,
            CoreError::Alloc => WireError::ServerFault,
            CoreError::Policy(e) => *e,
            CoreError::StaleInode => WireError::Stale,
            CoreError::Config(_) => WireError::Inval,
            CoreError::Io(_) => WireError::Io,
        }
    }
}
