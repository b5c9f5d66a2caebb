use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::shared::error::AppError;
use crate::shared::validation::require_identifier;

const TEMPORARY_PREFIX: &str = "tmp:";

static NEXT_TEMPORARY_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifier of a post.
///
/// A post carries a `Temporary` id until the remote store confirms it and a
/// `Permanent` one afterwards. Equality and hashing include the tag, so the
/// two never collide even when their string forms match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PostId {
    Temporary(TemporaryId),
    Permanent(PermanentId),
}

impl PostId {
    pub fn permanent(value: impl Into<String>) -> Result<Self, AppError> {
        PermanentId::new(value.into()).map(PostId::Permanent)
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, PostId::Temporary(_))
    }

    pub fn as_permanent(&self) -> Option<&PermanentId> {
        match self {
            PostId::Permanent(id) => Some(id),
            PostId::Temporary(_) => None,
        }
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostId::Temporary(id) => write!(f, "{id}"),
            PostId::Permanent(id) => write!(f, "{id}"),
        }
    }
}

impl From<PermanentId> for PostId {
    fn from(id: PermanentId) -> Self {
        PostId::Permanent(id)
    }
}

impl From<TemporaryId> for PostId {
    fn from(id: TemporaryId) -> Self {
        PostId::Temporary(id)
    }
}

/// Server-assigned post identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermanentId(String);

impl PermanentId {
    pub fn new(value: String) -> Result<Self, AppError> {
        require_identifier(&value, "Post ID")?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermanentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PermanentId> for String {
    fn from(id: PermanentId) -> Self {
        id.0
    }
}

/// Locally minted identifier for a post whose creation is still pending.
///
/// Scoped to the wall-clock millisecond it was minted at plus a process-wide
/// sequence number, so rapid repeated submissions never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporaryId {
    minted_at_ms: i64,
    seq: u64,
}

impl TemporaryId {
    pub fn mint() -> Self {
        Self::mint_at(Utc::now().timestamp_millis())
    }

    pub fn mint_at(minted_at_ms: i64) -> Self {
        Self {
            minted_at_ms,
            seq: NEXT_TEMPORARY_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn minted_at_ms(&self) -> i64 {
        self.minted_at_ms
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for TemporaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TEMPORARY_PREFIX}{}-{}", self.minted_at_ms, self.seq)
    }
}
