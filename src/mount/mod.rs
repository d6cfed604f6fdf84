//! `MOUNT` protocol implementation for NFS version 3 as specified in RFC 1813 section 5.0.
//! <https://datatracker.ietf.org/doc/html/rfc1813#section-5.0>.

#![allow(dead_code)]

pub mod dump;
pub mod export;
pub mod mnt;
pub mod null;
pub mod umnt;
pub mod umntall;

use std::sync::Arc;

use crate::error::WireError;
use crate::mount_auth::ReverseResolver;
use crate::mount_state::MountState;
use crate::rmtab::Rmtab;
use crate::vfs::Vfs;

/// Maximum bytes in a path name.
pub const MOUNT_DIRPATH_LEN: usize = 1024;
/// Maximum bytes in a name.
pub const MOUNT_HOST_NAME_LEN: usize = 255;

pub use crate::mount_auth::FileHandle;

/// Server pathname of a directory.
pub type DirPath = String;

/// Client host name.
pub type HostName = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Not owner
    Permission = 1,
    /// No such file or directory
    NoEntry = 2,
    /// I/O error
    IO = 3,
    /// Permission denied
    Access = 4,
    /// Not a directory
    NotDir = 5,
    /// Invalid argument
    InvalidArgument = 6,
    /// Filename too long
    NameTooLong = 7,
    /// Operation is not supported
    NotSupported = 8,
    /// A failure on the server
    ServerFault = 9,
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Ok => Error::ServerFault,
            WireError::NoEnt => Error::NoEntry,
            WireError::Perm => Error::Permission,
            WireError::Io => Error::IO,
            WireError::Acces | WireError::Rofs => Error::Access,
            WireError::NotDir => Error::NotDir,
            WireError::Inval => Error::InvalidArgument,
            WireError::NotSupp => Error::NotSupported,
            WireError::ServerFault | WireError::Stale => Error::ServerFault,
        }
    }
}

/// Entry of the list maintained on the server of clients
/// that have requested file handles with the MNT procedure.
#[derive(Clone)]
pub struct MountEntry {
    /// Name of the client host that is sending RPC.
    pub hostname: HostName,
    /// Server pathname of a directory.
    pub directory: DirPath,
}

/// Export entry, containing list of clients, allowed to
/// mount the specified directory.
#[derive(Clone)]
pub struct ExportEntry {
    /// Exported directory.
    pub directory: DirPath,
    /// Client host names. They are implementation specific
    /// and cannot be directly interpreted by clients.
    pub name: Vec<HostName>,
}

/// Ties the MOUNT v3 procedure surface (`Mnt`/`Umnt`/`Umntall`/`Export`/
/// `Dump`/`Null`) to the core: mount state, rmtab, and the external VFS and
/// reverse-DNS collaborators.
pub struct MountService {
    pub state: Arc<MountState>,
    pub rmtab: Arc<Rmtab>,
    pub vfs: Arc<dyn Vfs>,
    pub resolver: Arc<dyn ReverseResolver>,
}

pub trait Mount {}

impl Mount for MountService {}
