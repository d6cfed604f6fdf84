//! Defines Mount version 3 [`Mnt`] interface (Procedure 1).
//!
//! as defined in RFC 1813 section 5.2.1.
//! <https://datatracker.ietf.org/doc/html/rfc1813#section-5.2.1>.

#![allow(dead_code)]

use std::net::IpAddr;

use async_trait::async_trait;

use super::{DirPath, Error, FileHandle, HostName, MountService};
use crate::resolver::{self, MountRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlavor {
    None,
    Unix,
    Short,
    Des,
    Kerb,
}

pub struct Success {
    pub file_handle: FileHandle,
    pub auth_flavors: Vec<AuthFlavor>,
}

pub type Result = std::result::Result<Success, Error>;

#[async_trait]
pub trait Promise {
    async fn keep(result: Result);
}

#[async_trait]
pub trait Mnt {
    async fn mnt<P: Promise + Send>(&self, dirpath: DirPath, host: HostName, addr: Option<IpAddr>, promise: P);
}

#[async_trait]
impl Mnt for MountService {
    async fn mnt<P: Promise + Send>(&self, dirpath: DirPath, host: HostName, addr: Option<IpAddr>, _promise: P) {
        let volume = dirpath.trim_start_matches('/').split('/').next().unwrap_or("").to_string();
        let outcome = resolver::resolve_mount(
            &self.state,
            &self.rmtab,
            self.vfs.as_ref(),
            self.resolver.as_ref(),
            MountRequest {
                volume: &volume,
                dirpath: &dirpath,
                host: &host,
                addr,
            },
        )
        .await;

        let result = match outcome {
            Ok(reply) => Ok(Success {
                file_handle: reply.handle,
                auth_flavors: reply.auth_flavors,
            }),
            Err(e) => Err(Error::from(e)),
        };
        P::keep(result).await;
    }
}
