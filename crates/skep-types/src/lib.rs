pub mod cancel;
pub mod error;
pub mod ids;

pub use cancel::CancelFlag;
pub use error::{Result, SkepError};
pub use ids::{Sha1Hash, ShardId, UploadId};
