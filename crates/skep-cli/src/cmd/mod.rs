pub(crate) mod check;
pub(crate) mod compact;
pub(crate) mod delete;
pub(crate) mod download;
pub(crate) mod list;
pub(crate) mod prune;
pub(crate) mod rename;
pub(crate) mod upload;
