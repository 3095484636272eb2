//! Short-lived quote cache with stale-serve and single-flight refresh.
//!
//! Each code owns a slot holding its last snapshot and, while a refresh is
//! running, a shared handle to that refresh. Callers that find a refresh in
//! flight await the same handle instead of issuing their own upstream call.
//! A batch lookup claims every slot it needs to refresh and fetches them
//! with one feed call.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::feed::{QuoteBatch, QuoteFeed, QuoteRequest, SourceError};
use crate::{CacheError, QuoteSnapshot, SecurityCode};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

/// A snapshot as served by the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedQuote {
    pub snapshot: QuoteSnapshot,
    pub freshness: Freshness,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: QuoteSnapshot,
    expires_at: Instant,
}

impl CacheEntry {
    fn serve(&self, now: Instant) -> CachedQuote {
        let freshness = if now < self.expires_at {
            Freshness::Fresh
        } else {
            Freshness::Stale
        };
        CachedQuote {
            snapshot: self.snapshot.clone(),
            freshness,
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<QuoteBatch, SourceError>>>;

#[derive(Clone)]
struct Inflight {
    id: u64,
    refresh: SharedRefresh,
}

#[derive(Default)]
struct SlotState {
    entry: Option<CacheEntry>,
    inflight: Option<Inflight>,
}

type Slot = Arc<Mutex<SlotState>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-code quote cache in front of a [`QuoteFeed`].
///
/// Expiry is evaluated on read; expired entries are kept so they can be
/// served as [`Freshness::Stale`] when a refresh fails.
pub struct SnapshotCache {
    feed: Arc<dyn QuoteFeed>,
    ttl: Duration,
    slots: Mutex<HashMap<SecurityCode, Slot>>,
    next_refresh_id: AtomicU64,
}

impl SnapshotCache {
    pub fn new(feed: Arc<dyn QuoteFeed>, ttl: Duration) -> Self {
        Self {
            feed,
            ttl,
            slots: Mutex::new(HashMap::new()),
            next_refresh_id: AtomicU64::new(1),
        }
    }

    pub fn with_default_ttl(feed: Arc<dyn QuoteFeed>) -> Self {
        Self::new(feed, DEFAULT_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, code: &SecurityCode) -> Slot {
        let mut slots = lock(&self.slots);
        slots.entry(code.clone()).or_default().clone()
    }

    /// Cached quote for `code`, refreshing it through the feed when the
    /// entry is missing or expired.
    pub async fn get(&self, code: &SecurityCode) -> Result<CachedQuote, CacheError> {
        let mut results = self.get_batch(std::slice::from_ref(code)).await;
        results.remove(code).unwrap_or_else(|| {
            Err(CacheError::NoData {
                code: code.clone(),
                reason: String::from("code was not looked up"),
            })
        })
    }

    /// Looks up every code, refreshing all stale or missing ones that are
    /// not already being refreshed with a single feed call.
    pub async fn get_batch(
        &self,
        codes: &[SecurityCode],
    ) -> BTreeMap<SecurityCode, Result<CachedQuote, CacheError>> {
        let codes: BTreeSet<SecurityCode> = codes.iter().cloned().collect();
        let mut results = BTreeMap::new();
        let mut waiting: Vec<(SecurityCode, Slot, u64)> = Vec::new();
        let mut refreshes: BTreeMap<u64, SharedRefresh> = BTreeMap::new();

        let refresh_id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let (planned_tx, planned_rx) = oneshot::channel::<Vec<(SecurityCode, Slot)>>();
        let refresh = self.refresh_future(refresh_id, planned_rx);
        let mut claimed: Vec<(SecurityCode, Slot)> = Vec::new();

        let now = Instant::now();
        for code in codes {
            let slot = self.slot(&code);
            let mut state = lock(&slot);

            if let Some(served) = state.entry.as_ref().map(|entry| entry.serve(now)) {
                if served.freshness == Freshness::Fresh {
                    debug!(%code, "quote cache hit");
                    results.insert(code, Ok(served));
                    continue;
                }
            }

            let inflight = state.inflight.get_or_insert_with(|| {
                claimed.push((code.clone(), slot.clone()));
                Inflight {
                    id: refresh_id,
                    refresh: refresh.clone(),
                }
            });
            refreshes
                .entry(inflight.id)
                .or_insert_with(|| inflight.refresh.clone());
            let id = inflight.id;
            drop(state);
            waiting.push((code, slot, id));
        }

        if !claimed.is_empty() {
            debug!(codes = claimed.len(), "refreshing quotes");
        }
        // Unblocks the refresh. With nothing claimed no slot references it
        // and it is dropped unpolled.
        let _ = planned_tx.send(claimed);
        drop(refresh);

        // Our own refresh and any borrowed from concurrent batches run
        // together.
        let outcomes: BTreeMap<u64, Result<QuoteBatch, SourceError>> =
            join_all(refreshes.into_iter().map(|(id, shared)| async move { (id, shared.await) }))
                .await
                .into_iter()
                .collect();

        for (code, slot, id) in waiting {
            let outcome = outcomes.get(&id).cloned().unwrap_or_else(|| {
                Err(SourceError::unavailable("refresh result went missing"))
            });
            let served = resolve_waiter(&code, &slot, outcome);
            results.insert(code, served);
        }

        results
    }

    /// Builds the refresh that runs once the claimed slot list arrives.
    /// It stores fresh entries and releases the claims itself, so any
    /// waiter can drive it to completion.
    fn refresh_future(
        &self,
        refresh_id: u64,
        planned: oneshot::Receiver<Vec<(SecurityCode, Slot)>>,
    ) -> SharedRefresh {
        let feed = Arc::clone(&self.feed);
        let ttl = self.ttl;

        async move {
            let claimed = planned.await.unwrap_or_default();
            let codes = claimed.iter().map(|(code, _)| code.clone());
            let result = match QuoteRequest::new(codes) {
                Ok(request) => feed.fetch(request).await,
                Err(error) => Err(error),
            };

            let expires_at = Instant::now() + ttl;
            for (code, slot) in &claimed {
                let mut state = lock(slot);
                if let Ok(batch) = &result {
                    if let Some(snapshot) = batch.quotes.get(code) {
                        state.entry = Some(CacheEntry {
                            snapshot: snapshot.clone(),
                            expires_at,
                        });
                    }
                }
                if state.inflight.as_ref().map(|inflight| inflight.id) == Some(refresh_id) {
                    state.inflight = None;
                }
            }

            result
        }
        .boxed()
        .shared()
    }

    /// Current entry without triggering a refresh.
    pub fn peek(&self, code: &SecurityCode) -> Option<CachedQuote> {
        let slot = lock(&self.slots).get(code).cloned()?;
        let state = lock(&slot);
        state.entry.as_ref().map(|entry| entry.serve(Instant::now()))
    }

    /// Number of codes holding a snapshot, fresh or stale.
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| lock(slot).entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
    }
}

fn resolve_waiter(
    code: &SecurityCode,
    slot: &Slot,
    outcome: Result<QuoteBatch, SourceError>,
) -> Result<CachedQuote, CacheError> {
    let reason = match &outcome {
        Ok(batch) => match batch.quotes.get(code) {
            Some(snapshot) => {
                return Ok(CachedQuote {
                    snapshot: snapshot.clone(),
                    freshness: Freshness::Fresh,
                })
            }
            None => String::from("provider returned no record for this code"),
        },
        Err(error) => error.to_string(),
    };

    let state = lock(slot);
    match &state.entry {
        Some(entry) => {
            debug!(%code, %reason, "serving stale quote");
            Ok(entry.serve(Instant::now()))
        }
        None => Err(CacheError::NoData {
            code: code.clone(),
            reason,
        }),
    }
}
