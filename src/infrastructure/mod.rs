pub mod cache;
pub mod remote;
