pub mod mutation;
pub mod query_service;

pub use mutation::{
    CreatePostIntent, LikeOutcome, MutationCoordinator, MutationError, MutationHandle,
    MutationPhase, MutationStatus, MutationTracker, ToggleLikeIntent,
};
pub use query_service::{QueryClient, QueryState};
