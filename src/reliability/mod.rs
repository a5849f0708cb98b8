//! Durability for commands that outlive the process.

pub mod disk;

pub use disk::{DiskError, DiskSpool, SpoolConfig};
