pub mod check;
pub mod compact;
pub mod delete;
pub mod download;
pub mod list;
pub mod prune;
pub mod rename;
pub mod upload;
