pub mod keys;
pub(crate) mod lock;
pub mod store;

pub use keys::{CacheKey, CacheKeyPrefix, CacheValue, KeyFilter};
pub use store::{
    CacheEntry, CacheEvent, CacheStore, CacheTransaction, CacheView, FetchTicket, SubscriptionId,
};
