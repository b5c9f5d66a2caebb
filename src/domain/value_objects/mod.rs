pub mod post_id;
pub mod user_id;

pub use post_id::{PermanentId, PostId, TemporaryId};
pub use user_id::UserId;
