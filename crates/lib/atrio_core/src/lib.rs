//! # atrio_core
//!
//! Core auth and permission domain logic for Atrio.

pub mod auth;
pub mod cache;
pub mod migrate;
pub mod models;
pub mod rbac;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
