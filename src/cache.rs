//! Request/response cache with tag invalidation.
//!
//! Queries store their result under a key together with the tags the result
//! provides. Mutations invalidate tags; every entry providing a matching tag is
//! marked stale, subscribers are told which keys went stale, and the next read
//! of a stale key refetches.

use std::{
  collections::{HashMap, VecDeque},
  future::Future,
  time::Instant,
};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, instrument};

use crate::domain::ResourceKind;

const EVENT_CAPACITY: usize = 64;
const JOURNAL_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TagId {
  List,
  Item(String),
}

/// A resource label. `id: None` covers every tag of the kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
  pub kind: ResourceKind,
  pub id: Option<TagId>,
}

impl Tag {
  pub fn kind(kind: ResourceKind) -> Self { Self { kind, id: None } }

  pub fn list(kind: ResourceKind) -> Self { Self { kind, id: Some(TagId::List) } }

  pub fn item(kind: ResourceKind, id: impl Into<String>) -> Self { Self { kind, id: Some(TagId::Item(id.into())) } }

  fn matches(&self, other: &Tag) -> bool {
    self.kind == other.kind && (self.id.is_none() || other.id.is_none() || self.id == other.id)
  }
}

#[derive(Clone, Debug, Serialize)]
pub struct Invalidation {
  pub keys: Vec<String>,
  pub tags: Vec<Tag>,
}

struct Entry {
  value: Value,
  tags: Vec<Tag>,
  stale: bool,
  fetched_at: Instant,
}

#[derive(Default)]
struct Inner {
  entries: HashMap<String, Entry>,
  /// Bumped by every `invalidate`, matched or not.
  generation: u64,
  /// Tags invalidated at recent generations, oldest first.
  journal: VecDeque<(u64, Vec<Tag>)>,
}

impl Inner {
  /// Tags from `provides` that were invalidated after generation `since`.
  /// A journal that no longer reaches back to `since` counts as a match.
  fn invalidated_since(&self, since: u64, provides: &[Tag]) -> Vec<Tag> {
    if self.generation == since {
      return Vec::new();
    }
    match self.journal.front() {
      Some((oldest, _)) if *oldest <= since + 1 => {}
      _ => return provides.to_vec(),
    }
    self
      .journal
      .iter()
      .filter(|(g, _)| *g > since)
      .flat_map(|(_, tags)| tags.iter())
      .filter(|t| provides.iter().any(|p| t.matches(p)))
      .cloned()
      .collect()
  }
}

pub struct ResourceCache {
  inner: RwLock<Inner>,
  events: broadcast::Sender<Invalidation>,
}

impl Default for ResourceCache {
  fn default() -> Self { Self::new() }
}

impl ResourceCache {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self { inner: RwLock::new(Inner::default()), events }
  }

  /// Subscribe to invalidation events.
  pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> { self.events.subscribe() }

  /// Serve `key` from cache when fresh; otherwise run `fetch` and record the
  /// tags `provides` derives from the result. Failed fetches are not cached.
  ///
  /// A result whose tags were invalidated while the fetch was running is
  /// returned but stored stale, and subscribers are told about the key.
  #[instrument(level = "debug", skip(self, provides, fetch))]
  pub async fn get_or_fetch<F, Fut, P, E>(&self, key: &str, provides: P, fetch: F) -> Result<Value, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    P: FnOnce(&Value) -> Vec<Tag>,
  {
    let started_at = {
      let inner = self.inner.read().await;
      if let Some(e) = inner.entries.get(key) {
        if !e.stale {
          debug!(target: "cache", %key, age_ms = e.fetched_at.elapsed().as_millis() as u64, "cache hit");
          return Ok(e.value.clone());
        }
      }
      inner.generation
    };

    let value = fetch().await?;
    let tags = provides(&value);

    let raced = {
      let mut inner = self.inner.write().await;
      let raced = inner.invalidated_since(started_at, &tags);
      debug!(target: "cache", %key, tags = tags.len(), stale = !raced.is_empty(), "cache fill");
      inner.entries.insert(
        key.to_string(),
        Entry { value: value.clone(), tags, stale: !raced.is_empty(), fetched_at: Instant::now() },
      );
      raced
    };
    if !raced.is_empty() {
      info!(target: "cache", %key, "invalidated during fetch");
      let _ = self.events.send(Invalidation { keys: vec![key.to_string()], tags: raced });
    }
    Ok(value)
  }

  /// Mark every entry providing one of `tags` stale. Returns the affected keys.
  #[instrument(level = "debug", skip(self))]
  pub async fn invalidate(&self, tags: &[Tag]) -> Vec<String> {
    let mut keys = Vec::new();
    {
      let mut inner = self.inner.write().await;
      inner.generation += 1;
      let generation = inner.generation;
      inner.journal.push_back((generation, tags.to_vec()));
      while inner.journal.len() > JOURNAL_CAPACITY {
        inner.journal.pop_front();
      }
      for (key, e) in inner.entries.iter_mut() {
        if !e.stale && e.tags.iter().any(|p| tags.iter().any(|t| t.matches(p))) {
          e.stale = true;
          keys.push(key.clone());
        }
      }
    }
    keys.sort();
    if !keys.is_empty() {
      info!(target: "cache", ?keys, "invalidated");
      // No subscribers is fine.
      let _ = self.events.send(Invalidation { keys: keys.clone(), tags: tags.to_vec() });
    }
    keys
  }

  /// Drop one key outright, e.g. to force a reload.
  pub async fn evict(&self, key: &str) -> bool { self.inner.write().await.entries.remove(key).is_some() }

  pub async fn is_fresh(&self, key: &str) -> bool {
    self.inner.read().await.entries.get(key).map(|e| !e.stale).unwrap_or(false)
  }
}
