//! Report cache: previously generated reports addressed by fingerprint.
//!
//! # Layout
//!
//! - `orrery.report/{id}`: one [`ReportRecord`] per id (overwrite, never append)
//! - `orrery.report-index`: JSON array of [`ReportMeta`], newest first, capped
//!
//! # Crash consistency
//!
//! The store has no transactions. Writes are ordered so that an interruption
//! at any point leaves, at worst, an index entry without a record (a stale
//! entry), never a record the index does not list:
//!
//! - `save` removes records that fall off the capped index, then writes the
//!   index, then writes the record.
//! - `delete` and eviction remove records before rewriting the index.
//!
//! Stale entries read as cache misses and are dropped by [`ReportCache::heal`].
//!
//! The cache is a pure optimization. A failed write never reaches the caller:
//! on a full store the oldest reports are evicted and the save is retried
//! once; if that still fails the save is abandoned and logged.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::StoreResult;
use crate::fingerprint::fingerprint;
use crate::model::{FormInput, ReportMeta, ReportRecord, ReportType};
use crate::storage::DurableStore;

/// Prefix of per-report record keys.
pub const RECORD_PREFIX: &str = "orrery.report/";

/// Key holding the report index.
pub const INDEX_KEY: &str = "orrery.report-index";

/// Sizing of the report cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCacheConfig {
    /// Maximum entries in the index.
    pub index_cap: usize,

    /// Eviction only runs when the index holds more than this many entries.
    pub eviction_floor: usize,

    /// Oldest reports removed per eviction pass.
    pub eviction_batch: usize,
}

impl Default for ReportCacheConfig {
    fn default() -> Self {
        Self {
            index_cap: 100,
            eviction_floor: 5,
            eviction_batch: 10,
        }
    }
}

impl From<&CoreConfig> for ReportCacheConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            index_cap: config.report_index_cap,
            eviction_floor: config.eviction_floor,
            eviction_batch: config.eviction_batch,
        }
    }
}

/// Cache of generated reports.
///
/// On a miss the caller generates the report and calls [`ReportCache::save`];
/// the cache never invokes a generator itself.
#[derive(Clone)]
pub struct ReportCache {
    store: DurableStore,
    clock: Arc<dyn Clock>,
    config: ReportCacheConfig,
}

fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}{id}")
}

impl ReportCache {
    pub fn new(store: DurableStore, clock: Arc<dyn Clock>, config: ReportCacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Save a report and return its id.
    ///
    /// The id is the fingerprint of `form_input` when given (so saving the
    /// same input again overwrites), otherwise a fresh time-ordered id.
    /// Store failures are absorbed; the id is returned regardless.
    pub async fn save<T: Serialize>(
        &self,
        report_type: ReportType,
        payload: &T,
        form_input: Option<&FormInput>,
        title: Option<&str>,
    ) -> String {
        let id = match form_input {
            Some(input) => fingerprint(report_type, input),
            None => format!("{}_{}", report_type.as_str(), uuid::Uuid::now_v7().simple()),
        };
        let meta = ReportMeta {
            id: id.clone(),
            report_type,
            title: title
                .map(str::to_string)
                .unwrap_or_else(|| format!("{report_type} report")),
            created_at: self.clock.now(),
            form_input: form_input.cloned(),
        };
        let record = ReportRecord { meta, payload };
        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(id = %id, error = %e, "Report payload not serializable; not cached");
                return id;
            }
        };

        let first = match self.write_report(&record.meta, &raw).await {
            Ok(()) => {
                debug!(id = %id, bytes = raw.len(), "Report cached");
                return id;
            }
            Err(e) => e,
        };

        if !first.is_quota_exceeded() {
            warn!(id = %id, error = %first, "Failed to cache report");
            self.forget_if_missing(&id).await;
            return id;
        }

        let evicted = self.evict_oldest(&id).await;
        if evicted == 0 {
            warn!(id = %id, error = %first, "Store full and nothing to evict; report not cached");
            self.forget_if_missing(&id).await;
            return id;
        }

        match self.write_report(&record.meta, &raw).await {
            Ok(()) => info!(id = %id, evicted, "Report cached after eviction"),
            Err(e) => {
                warn!(id = %id, evicted, error = %e, "Failed to cache report after eviction");
                self.forget_if_missing(&id).await;
            }
        }
        id
    }

    /// One attempt at the index-then-record write sequence.
    async fn write_report(&self, meta: &ReportMeta, raw_record: &str) -> StoreResult<()> {
        let mut index = self.index().await;
        index.retain(|m| m.id != meta.id);
        index.insert(0, meta.clone());

        if index.len() > self.config.index_cap {
            let overflow = index.split_off(self.config.index_cap);
            for old in &overflow {
                self.store.remove(&record_key(&old.id)).await;
            }
            debug!(dropped = overflow.len(), "Report index over cap; dropped oldest");
        }

        self.store.set_json(INDEX_KEY, &index).await?;
        self.store.set(&record_key(&meta.id), raw_record).await
    }

    /// Remove the oldest `eviction_batch` reports, never `keep_id`.
    ///
    /// Does nothing unless the index holds more than `eviction_floor` entries.
    /// Returns the number of reports removed.
    async fn evict_oldest(&self, keep_id: &str) -> usize {
        let index = self.index().await;
        if index.len() <= self.config.eviction_floor {
            return 0;
        }

        let mut victims: Vec<String> = index
            .iter()
            .rev()
            .filter(|m| m.id != keep_id)
            .take(self.config.eviction_batch)
            .map(|m| m.id.clone())
            .collect();
        victims.sort();

        for id in &victims {
            self.store.remove(&record_key(id)).await;
        }
        let remaining: Vec<ReportMeta> = index
            .into_iter()
            .filter(|m| victims.binary_search(&m.id).is_err())
            .collect();
        if let Err(e) = self.store.set_json(INDEX_KEY, &remaining).await {
            // Records are already gone; the leftover entries are stale and
            // read as misses.
            warn!(error = %e, "Failed to rewrite report index after eviction");
        }

        info!(
            evicted = victims.len(),
            remaining = remaining.len(),
            "Evicted oldest reports to free space"
        );
        victims.len()
    }

    /// Drop `id` from the index unless its record exists.
    async fn forget_if_missing(&self, id: &str) {
        if self.store.contains(&record_key(id)).await {
            return;
        }
        let mut index = self.index().await;
        let before = index.len();
        index.retain(|m| m.id != id);
        if index.len() != before {
            if let Err(e) = self.store.set_json(INDEX_KEY, &index).await {
                warn!(id, error = %e, "Failed to drop stale index entry");
            }
        }
    }

    /// Look up a report by id. Does not consult the index.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> Option<ReportRecord<T>> {
        let record = self.store.get_json(&record_key(id)).await;
        debug!(id, hit = record.is_some(), "Report lookup");
        record
    }

    /// Look up the report previously saved for this exact input.
    pub async fn get_by_form<T: DeserializeOwned>(
        &self,
        report_type: ReportType,
        form_input: &FormInput,
    ) -> Option<ReportRecord<T>> {
        self.get(&fingerprint(report_type, form_input)).await
    }

    /// Saved reports, newest first, optionally of one type.
    pub async fn list(&self, report_type: Option<ReportType>) -> Vec<ReportMeta> {
        let index = self.index().await;
        match report_type {
            Some(t) => index.into_iter().filter(|m| m.report_type == t).collect(),
            None => index,
        }
    }

    /// Delete a report and its index entry.
    pub async fn delete(&self, id: &str) {
        self.store.remove(&record_key(id)).await;

        let mut index = self.index().await;
        let before = index.len();
        index.retain(|m| m.id != id);
        if index.len() != before {
            if let Err(e) = self.store.set_json(INDEX_KEY, &index).await {
                warn!(id, error = %e, "Failed to remove report from index");
            }
        }
    }

    /// Drop index entries whose record is missing or unreadable.
    ///
    /// Run once at startup. Unreadable records are removed too. Returns the
    /// number of entries dropped.
    pub async fn heal(&self) -> usize {
        let index = self.index().await;
        let mut kept = Vec::with_capacity(index.len());
        let mut dropped = 0;

        for meta in index {
            let key = record_key(&meta.id);
            if self
                .store
                .get_json::<ReportRecord<serde_json::Value>>(&key)
                .await
                .is_some()
            {
                kept.push(meta);
            } else {
                self.store.remove(&key).await;
                dropped += 1;
            }
        }

        if dropped > 0 {
            match self.store.set_json(INDEX_KEY, &kept).await {
                Ok(()) => info!(dropped, "Dropped stale report index entries"),
                Err(e) => warn!(error = %e, "Failed to rewrite healed report index"),
            }
        }
        dropped
    }

    async fn index(&self) -> Vec<ReportMeta> {
        self.store.get_json(INDEX_KEY).await.unwrap_or_default()
    }
}
