//! Shared runtime plumbing for the Sahaay workspace: logging bootstrap and
//! startup environment checks.

pub mod utils;
pub mod env;
