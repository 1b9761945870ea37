pub mod commands;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod hash_cache;
pub mod manifest;
pub mod sharder;
pub mod upload;
pub mod vault;

pub use skep_types::{CancelFlag, Result, Sha1Hash, ShardId, SkepError, UploadId};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
