//! Consistency checker and repair tool for FAT12 volume images.
//!
//! A check walks the directory tree from the root, follows every file's
//! cluster chain to reconcile it with the declared size, and then turns
//! clusters that are allocated but unreachable into recovered root entries.

pub mod bpb;
pub mod chain;
pub mod check;
pub mod clusters;
pub mod config;
pub mod dir;
pub mod disk;
pub mod error;
pub mod fs;
pub mod image;
pub mod reclaim;
pub mod report;
pub mod table;
pub mod walk;

#[cfg(test)]
pub(crate) mod testing;

pub use check::{check, run_check};
pub use config::CheckOptions;
pub use error::{CheckError, CheckResult};
pub use image::{FileDisk, MemoryDisk};
pub use report::{Event, ExitStatus, Report, Summary};
