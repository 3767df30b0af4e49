//! Database pool initialization shared by CallGuard services

pub mod init;

pub use init::*;
