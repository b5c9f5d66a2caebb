pub mod post;
pub mod profile;

pub use post::Post;
pub use profile::Profile;
