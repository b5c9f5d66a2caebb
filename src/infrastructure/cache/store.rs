use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::keys::{CacheKey, CacheKeyPrefix, CacheValue, KeyFilter};
use super::lock::{mutex_lock, rw_read, rw_write};
use crate::domain::entities::{Post, Profile};
use crate::domain::value_objects::{PostId, UserId};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(CacheKey),
    Removed(CacheKey),
    Invalidated(CacheKey),
}

impl CacheEvent {
    pub fn key(&self) -> &CacheKey {
        match self {
            CacheEvent::Updated(key) | CacheEvent::Removed(key) | CacheEvent::Invalidated(key) => {
                key
            }
        }
    }
}

pub type Subscriber = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Option<CacheValue>,
    pub stale: bool,
    pub fetching: bool,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    revision: u64,
}

impl CacheEntry {
    fn empty(revision: u64) -> Self {
        Self {
            value: None,
            stale: false,
            fetching: false,
            error: None,
            updated_at: Utc::now(),
            revision,
        }
    }
}

/// Proof that a fetch started against a given entry revision.
///
/// A fetch result is only written back when nothing has touched the entry
/// since the ticket was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: CacheKey,
    revision: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    Set(CacheKey, CacheValue),
    Remove(CacheKey),
    RemoveMatching(KeyFilter),
    Invalidate(KeyFilter),
}

/// Writes applied as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheTransaction {
    ops: Vec<CacheOp>,
}

impl CacheTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: CacheKey, value: CacheValue) -> Self {
        self.ops.push(CacheOp::Set(key, value));
        self
    }

    /// Writes `Some`, removes on `None`. Used to put snapshots back.
    pub fn restore(self, key: CacheKey, snapshot: Option<CacheValue>) -> Self {
        match snapshot {
            Some(value) => self.set(key, value),
            None => self.remove(key),
        }
    }

    pub fn remove(mut self, key: CacheKey) -> Self {
        self.ops.push(CacheOp::Remove(key));
        self
    }

    pub fn remove_matching(mut self, filter: impl Into<KeyFilter>) -> Self {
        self.ops.push(CacheOp::RemoveMatching(filter.into()));
        self
    }

    pub fn invalidate(mut self, filter: impl Into<KeyFilter>) -> Self {
        self.ops.push(CacheOp::Invalidate(filter.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }
}

/// Read-only view handed to [`CacheStore::update`] while the write lock is held.
pub struct CacheView<'a> {
    entries: &'a HashMap<CacheKey, CacheEntry>,
}

impl CacheView<'_> {
    pub fn read(&self, key: &CacheKey) -> Option<CacheValue> {
        self.entries.get(key).and_then(|entry| entry.value.clone())
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: KeyFilter,
    callback: Subscriber,
}

/// Observable key/value store holding the latest known view of each query.
///
/// Created once per session and shared through an `Arc`. Every method is
/// synchronous and never awaits. Subscribers run after the lock has been
/// released, once the whole write (or transaction) is visible.
pub struct CacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    subscriptions: Mutex<Vec<Subscription>>,
    events: broadcast::Sender<CacheEvent>,
    next_revision: AtomicU64,
    next_subscription: AtomicU64,
}

impl CacheStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            events,
            next_revision: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn read(&self, key: &CacheKey) -> Option<CacheValue> {
        let entries = rw_read(&self.entries, "read");
        entries.get(key).and_then(|entry| entry.value.clone())
    }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entries = rw_read(&self.entries, "entry");
        entries.get(key).cloned()
    }

    pub fn write(&self, key: CacheKey, value: CacheValue) {
        self.commit(CacheTransaction::new().set(key, value));
    }

    pub fn transactional_write<I>(&self, values: I)
    where
        I: IntoIterator<Item = (CacheKey, CacheValue)>,
    {
        let tx = values
            .into_iter()
            .fold(CacheTransaction::new(), |tx, (key, value)| tx.set(key, value));
        self.commit(tx);
    }

    /// Marks every matching entry stale and returns how many matched.
    /// The value stays readable until a fetch replaces it.
    pub fn invalidate(&self, filter: impl Into<KeyFilter>) -> usize {
        self.commit(CacheTransaction::new().invalidate(filter))
            .iter()
            .filter(|event| matches!(event, CacheEvent::Invalidated(_)))
            .count()
    }

    /// Removes `key` and returns the value that was removed.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheValue> {
        let (_, removed) = self.update(|view| {
            (CacheTransaction::new().remove(key.clone()), view.read(key))
        });
        removed
    }

    /// Applies all operations under one lock, then notifies subscribers.
    pub fn commit(&self, tx: CacheTransaction) -> Vec<CacheEvent> {
        self.update(|_| (tx, ())).0
    }

    /// Builds a transaction from the current state and applies it without
    /// releasing the lock in between, so the read-modify-write is atomic.
    pub fn update<F, T>(&self, build: F) -> (Vec<CacheEvent>, T)
    where
        F: FnOnce(&CacheView<'_>) -> (CacheTransaction, T),
    {
        let (events, output) = {
            let mut entries = rw_write(&self.entries, "update");
            let (tx, output) = build(&CacheView { entries: &entries });
            (self.apply(&mut entries, tx), output)
        };

        if !events.is_empty() {
            trace!(events = events.len(), "cache transaction committed");
            self.notify(&events);
        }
        (events, output)
    }

    fn apply(
        &self,
        entries: &mut HashMap<CacheKey, CacheEntry>,
        tx: CacheTransaction,
    ) -> Vec<CacheEvent> {
        let mut events = Vec::with_capacity(tx.len());
        for op in tx.ops {
            match op {
                CacheOp::Set(key, value) => {
                    let revision = self.bump_revision();
                    let entry = entries
                        .entry(key.clone())
                        .or_insert_with(|| CacheEntry::empty(revision));
                    entry.value = Some(value);
                    entry.stale = false;
                    entry.error = None;
                    entry.updated_at = Utc::now();
                    entry.revision = revision;
                    events.push(CacheEvent::Updated(key));
                }
                CacheOp::Remove(key) => {
                    if entries.remove(&key).is_some() {
                        events.push(CacheEvent::Removed(key));
                    }
                }
                CacheOp::RemoveMatching(filter) => {
                    let matched: Vec<CacheKey> = entries
                        .keys()
                        .filter(|key| filter.matches(key))
                        .cloned()
                        .collect();
                    for key in matched {
                        entries.remove(&key);
                        events.push(CacheEvent::Removed(key));
                    }
                }
                CacheOp::Invalidate(filter) => {
                    let revision = self.bump_revision();
                    for (key, entry) in entries.iter_mut() {
                        if filter.matches(key) {
                            entry.stale = true;
                            entry.revision = revision;
                            events.push(CacheEvent::Invalidated(key.clone()));
                        }
                    }
                }
            }
        }
        events
    }

    pub fn subscribe<F>(&self, key: CacheKey, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.subscribe_filter(KeyFilter::Key(key), callback)
    }

    pub fn subscribe_prefix<F>(&self, prefix: CacheKeyPrefix, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.subscribe_filter(KeyFilter::Prefix(prefix), callback)
    }

    fn subscribe_filter<F>(&self, filter: KeyFilter, callback: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        mutex_lock(&self.subscriptions, "subscribe").push(Subscription {
            id,
            filter,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = mutex_lock(&self.subscriptions, "unsubscribe");
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    /// Event stream for background consumers.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn stale_keys(&self) -> Vec<CacheKey> {
        let entries = rw_read(&self.entries, "stale_keys");
        entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        rw_read(&self.entries, "keys").keys().cloned().collect()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        rw_read(&self.entries, "contains").contains_key(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry at the end of a session.
    pub fn clear(&self) {
        let removed: Vec<CacheEvent> = {
            let mut entries = rw_write(&self.entries, "clear");
            entries.drain().map(|(key, _)| CacheEvent::Removed(key)).collect()
        };
        debug!(removed = removed.len(), "cache cleared");
        self.notify(&removed);
    }

    /// Flags the entry as loading and returns the ticket for the result.
    pub fn begin_fetch(&self, key: &CacheKey) -> FetchTicket {
        let mut entries = rw_write(&self.entries, "begin_fetch");
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::empty(self.bump_revision()));
        entry.fetching = true;
        FetchTicket {
            key: key.clone(),
            revision: entry.revision,
        }
    }

    /// Stores a fetched value unless the entry changed since `begin_fetch`.
    /// Returns whether the value was applied.
    pub fn complete_fetch(&self, ticket: FetchTicket, value: CacheValue) -> bool {
        let applied = {
            let mut entries = rw_write(&self.entries, "complete_fetch");
            let Some(entry) = entries.get_mut(&ticket.key) else {
                return false;
            };
            if entry.revision != ticket.revision {
                entry.fetching = false;
                false
            } else {
                entry.value = Some(value);
                entry.stale = false;
                entry.fetching = false;
                entry.error = None;
                entry.updated_at = Utc::now();
                entry.revision = self.bump_revision();
                true
            }
        };

        if applied {
            self.notify(&[CacheEvent::Updated(ticket.key)]);
        } else {
            debug!(key = ?ticket.key, "discarded fetch result superseded by a newer write");
        }
        applied
    }

    /// Records a fetch failure; the last known value stays readable.
    pub fn fail_fetch(&self, ticket: FetchTicket, error: impl Into<String>) {
        let updated = {
            let mut entries = rw_write(&self.entries, "fail_fetch");
            match entries.get_mut(&ticket.key) {
                Some(entry) => {
                    entry.fetching = false;
                    if entry.revision == ticket.revision {
                        entry.error = Some(error.into());
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        if updated {
            self.notify(&[CacheEvent::Updated(ticket.key)]);
        }
    }

    pub fn posts(&self) -> Option<Arc<Vec<Post>>> {
        self.read(&CacheKey::PostList)
            .and_then(|value| value.as_posts().cloned())
    }

    pub fn like_count(&self, post_id: &PostId) -> Option<u32> {
        self.read(&CacheKey::like_count(post_id))
            .and_then(|value| value.as_like_count())
    }

    pub fn user_liked(&self, post_id: &PostId, user_id: &UserId) -> Option<bool> {
        self.read(&CacheKey::user_like(post_id, user_id))
            .and_then(|value| value.as_liked())
    }

    pub fn profile(&self, user_id: &UserId) -> Option<Profile> {
        self.read(&CacheKey::Profile(user_id.clone()))
            .and_then(|value| value.as_profile().cloned())
    }

    fn bump_revision(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::Relaxed)
    }

    fn notify(&self, events: &[CacheEvent]) {
        if events.is_empty() {
            return;
        }

        let deliveries: Vec<(Subscriber, CacheEvent)> = {
            let subscriptions = mutex_lock(&self.subscriptions, "notify");
            events
                .iter()
                .flat_map(|event| {
                    subscriptions
                        .iter()
                        .filter(|subscription| subscription.filter.matches(event.key()))
                        .map(|subscription| (Arc::clone(&subscription.callback), event.clone()))
                })
                .collect()
        };

        for (callback, event) in deliveries {
            callback(&event);
        }

        for event in events {
            // no receivers is fine
            let _ = self.events.send(event.clone());
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TemporaryId;

    fn post_id(id: &str) -> PostId {
        PostId::permanent(id).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn write_then_read() {
        let store = CacheStore::new();
        let p1 = post_id("p1");

        assert!(store.read(&CacheKey::like_count(&p1)).is_none());
        store.write(CacheKey::like_count(&p1), CacheValue::LikeCount(3));

        assert_eq!(store.like_count(&p1), Some(3));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_deletes_without_marking_stale() {
        let store = CacheStore::new();
        let p1 = post_id("p1");
        store.write(CacheKey::like_count(&p1), CacheValue::LikeCount(1));

        let removed = store.remove(&CacheKey::like_count(&p1));

        assert_eq!(removed, Some(CacheValue::LikeCount(1)));
        assert!(store.is_empty());
        assert!(store.stale_keys().is_empty());
    }

    #[test]
    fn concurrent_removes_hand_out_each_value_once() {
        let store = Arc::new(CacheStore::new());
        let key = CacheKey::like_count(&post_id("p1"));

        let workers: Vec<_> = (0..4u32)
            .map(|worker| {
                let store = Arc::clone(&store);
                let key = key.clone();
                std::thread::spawn(move || {
                    let mut removed = Vec::new();
                    for i in 0..500u32 {
                        store.write(key.clone(), CacheValue::LikeCount(worker * 10_000 + i));
                        if let Some(value) = store.remove(&key) {
                            removed.push(value.as_like_count().unwrap());
                        }
                    }
                    removed
                })
            })
            .collect();

        let mut removed: Vec<u32> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        let total = removed.len();
        removed.sort_unstable();
        removed.dedup();

        assert_eq!(removed.len(), total);
        assert!(store.is_empty());
    }

    #[test]
    fn remove_matching_drops_every_key_of_a_post() {
        let store = CacheStore::new();
        let temp = PostId::from(TemporaryId::mint());
        store.transactional_write([
            (CacheKey::like_count(&temp), CacheValue::LikeCount(1)),
            (CacheKey::user_like(&temp, &user("u1")), CacheValue::Liked(false)),
            (CacheKey::user_like(&temp, &user("u2")), CacheValue::Liked(true)),
            (CacheKey::like_count(&post_id("p1")), CacheValue::LikeCount(4)),
        ]);

        let events =
            store.commit(CacheTransaction::new().remove_matching(CacheKeyPrefix::Post(temp.clone())));

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|event| matches!(event, CacheEvent::Removed(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.like_count(&post_id("p1")), Some(4));
    }

    #[test]
    fn invalidate_keeps_value_and_marks_stale() {
        let store = CacheStore::new();
        let p1 = post_id("p1");
        let u1 = user("u1");
        store.transactional_write([
            (CacheKey::like_count(&p1), CacheValue::LikeCount(2)),
            (CacheKey::user_like(&p1, &u1), CacheValue::Liked(true)),
            (CacheKey::PostList, CacheValue::posts(Vec::new())),
        ]);

        let matched = store.invalidate(CacheKeyPrefix::Post(p1.clone()));

        assert_eq!(matched, 2);
        assert_eq!(store.like_count(&p1), Some(2));
        let stale = store.stale_keys();
        assert_eq!(stale.len(), 2);
        assert!(stale.contains(&CacheKey::like_count(&p1)));
        assert!(!store.entry(&CacheKey::PostList).unwrap().stale);
    }

    #[test]
    fn subscriber_sees_complete_transaction() {
        let store = Arc::new(CacheStore::new());
        let p1 = post_id("p1");
        let u1 = user("u1");
        let observed = Arc::new(Mutex::new(Vec::new()));

        {
            let store_ref = Arc::clone(&store);
            let observed = Arc::clone(&observed);
            let (p1, u1) = (p1.clone(), u1.clone());
            store.subscribe(CacheKey::like_count(&p1), move |_| {
                let snapshot = (store_ref.like_count(&p1), store_ref.user_liked(&p1, &u1));
                observed.lock().unwrap().push(snapshot);
            });
        }

        store.transactional_write([
            (CacheKey::like_count(&p1), CacheValue::LikeCount(1)),
            (CacheKey::user_like(&p1, &u1), CacheValue::Liked(true)),
        ]);

        assert_eq!(*observed.lock().unwrap(), vec![(Some(1), Some(true))]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = CacheStore::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let id = store.subscribe_prefix(CacheKeyPrefix::LikeCounts, move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        store.write(CacheKey::like_count(&post_id("p1")), CacheValue::LikeCount(1));
        assert!(store.unsubscribe(id));
        store.write(CacheKey::like_count(&post_id("p2")), CacheValue::LikeCount(1));

        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn fetch_result_is_discarded_after_local_write() {
        let store = CacheStore::new();
        let p1 = post_id("p1");
        let key = CacheKey::like_count(&p1);
        store.write(key.clone(), CacheValue::LikeCount(0));

        let ticket = store.begin_fetch(&key);
        assert!(store.entry(&key).unwrap().fetching);
        store.write(key.clone(), CacheValue::LikeCount(1));

        assert!(!store.complete_fetch(ticket, CacheValue::LikeCount(0)));
        assert_eq!(store.like_count(&p1), Some(1));
        assert!(!store.entry(&key).unwrap().fetching);
    }

    #[test]
    fn fetch_result_applies_when_untouched() {
        let store = CacheStore::new();
        let key = CacheKey::PostList;
        store.write(key.clone(), CacheValue::posts(Vec::new()));
        store.invalidate(key.clone());

        let ticket = store.begin_fetch(&key);
        assert!(store.complete_fetch(ticket, CacheValue::posts(Vec::new())));

        let entry = store.entry(&key).unwrap();
        assert!(!entry.stale);
        assert!(!entry.fetching);
    }

    #[test]
    fn failed_fetch_keeps_last_value() {
        let store = CacheStore::new();
        let p1 = post_id("p1");
        let key = CacheKey::like_count(&p1);
        store.write(key.clone(), CacheValue::LikeCount(5));

        let ticket = store.begin_fetch(&key);
        store.fail_fetch(ticket, "offline");

        let entry = store.entry(&key).unwrap();
        assert_eq!(entry.value, Some(CacheValue::LikeCount(5)));
        assert_eq!(entry.error.as_deref(), Some("offline"));
    }

    #[test]
    fn update_reads_and_writes_atomically() {
        let store = CacheStore::new();
        let p1 = post_id("p1");
        let key = CacheKey::like_count(&p1);
        store.write(key.clone(), CacheValue::LikeCount(4));

        let (events, previous) = store.update(|view| {
            let previous = view.read(&key);
            let next = previous.as_ref().and_then(CacheValue::as_like_count).unwrap_or(0) + 1;
            (
                CacheTransaction::new().set(key.clone(), CacheValue::LikeCount(next)),
                previous,
            )
        });

        assert_eq!(previous, Some(CacheValue::LikeCount(4)));
        assert_eq!(events, vec![CacheEvent::Updated(key)]);
        assert_eq!(store.like_count(&p1), Some(5));
    }

    #[test]
    fn restore_with_none_removes_key() {
        let store = CacheStore::new();
        let temp = PostId::from(TemporaryId::mint());
        store.write(CacheKey::like_count(&temp), CacheValue::LikeCount(0));

        store.commit(CacheTransaction::new().restore(CacheKey::like_count(&temp), None));

        assert!(!store.contains(&CacheKey::like_count(&temp)));
    }

    #[tokio::test]
    async fn broadcasts_events_to_background_listeners() {
        let store = CacheStore::new();
        let mut rx = store.events();

        store.write(CacheKey::PostList, CacheValue::posts(Vec::new()));
        store.invalidate(CacheKey::PostList);

        assert_eq!(rx.recv().await.unwrap(), CacheEvent::Updated(CacheKey::PostList));
        assert_eq!(
            rx.recv().await.unwrap(),
            CacheEvent::Invalidated(CacheKey::PostList)
        );
    }

    #[test]
    fn clear_drops_everything() {
        let store = CacheStore::new();
        store.write(CacheKey::PostList, CacheValue::posts(Vec::new()));
        store.write(CacheKey::Profile(user("u1")), CacheValue::Profile(Profile::new(user("u1"), "Ann")));

        store.clear();

        assert!(store.is_empty());
    }
}
