//! Tenant-scoped role-based access control.
//!
//! Roles bundle permissions; assignments scope a role to a user within one
//! agency. Resolution is cache-first with the store as the source of truth,
//! so a cache outage degrades to slower checks, never wrong ones.

use thiserror::Error;

pub mod queries;
pub mod service;

pub use service::PermissionService;

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RbacError>;
