//! File-backed, category-aware TTL cache.
//!
//! Every record lives in its own JSON file, grouped by category:
//!
//! ```text
//! <root>/index.json
//! <root>/company_info/AAPL.json
//! <root>/income_statement/AAPL@quarterly.json
//! ```
//!
//! Files are replaced atomically (write to a temp file in the same directory,
//! then rename), so a reader sees either the old record or the new one. Any
//! record that fails to decode is reported and treated as a miss.

mod category;
mod clock;
mod record;

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{CacheError, Frequency, Symbol, UtcDateTime};
use record::{CacheIndex, IndexEntry};

pub use category::{CachePolicy, Category, CategoryPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use record::{CacheKey, CachePayload, CacheRecord};

const INDEX_FILE: &str = "index.json";
const RECORD_EXTENSION: &str = "json";

/// Hit and miss counts observed by one store since it was opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub corrupt: u64,
    pub writes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    corrupt: AtomicU64,
    writes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStatus {
    pub category: Category,
    pub enabled: bool,
    pub ttl_hours: u32,
    pub entries: usize,
    pub expired: usize,
    pub size_bytes: u64,
    pub oldest: Option<UtcDateTime>,
    pub newest: Option<UtcDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub root: PathBuf,
    pub total_entries: usize,
    pub total_expired: usize,
    pub total_size_bytes: u64,
    pub categories: Vec<CategoryStatus>,
    pub session: CacheCounters,
}

/// One record as listed by [`CacheStore::entries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntryInfo {
    pub category: Category,
    pub symbol: Symbol,
    pub frequency: Option<Frequency>,
    pub fetched_at: UtcDateTime,
    pub expires_at: UtcDateTime,
    pub expired: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub symbol: Option<Symbol>,
    pub category: Option<Category>,
}

impl EntryFilter {
    fn matches(&self, category: Category, key: &CacheKey) -> bool {
        self.symbol.as_ref().map_or(true, |symbol| &key.symbol == symbol)
            && self.category.map_or(true, |wanted| wanted == category)
    }
}

/// Persistent cache shared by every component of a run.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    index: Mutex<CacheIndex>,
    counters: Counters,
}

impl CacheStore {
    pub fn open(root: impl Into<PathBuf>, policy: CachePolicy) -> Result<Self, CacheError> {
        Self::open_with_clock(root, policy, Arc::new(SystemClock))
    }

    /// Open (creating if needed) the cache rooted at `root`.
    ///
    /// A missing or unreadable index is rebuilt from the record files.
    pub fn open_with_clock(
        root: impl Into<PathBuf>,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::io(&root, source))?;

        let index = match load_index(&root) {
            Some(index) => index,
            None => {
                let index = rebuild_index(&root)?;
                save_index(&root, &index)?;
                debug!(
                    root = %root.display(),
                    entries = index.entries.len(),
                    "rebuilt cache index"
                );
                index
            }
        };

        Ok(Self {
            root,
            policy,
            clock,
            index: Mutex::new(index),
            counters: Counters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters.snapshot()
    }

    /// Return the payload for `key` when a fresh record exists.
    ///
    /// Disabled categories, absent records, expired records and records that
    /// fail to decode are all misses.
    pub fn get(&self, category: Category, key: &CacheKey) -> Option<CachePayload> {
        if !self.policy.is_enabled(category) {
            return None;
        }

        let path = record_path(&self.root, category, key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                Counters::bump(&self.counters.misses);
                debug!(%category, %key, "cache miss");
                return None;
            }
            Err(error) => {
                Counters::bump(&self.counters.corrupt);
                warn!(path = %path.display(), %error, "unreadable cache record, treating as miss");
                return None;
            }
        };

        let record = match decode_record(&bytes, category, key) {
            Ok(record) => record,
            Err(reason) => {
                Counters::bump(&self.counters.corrupt);
                warn!(path = %path.display(), %reason, "corrupt cache record, treating as miss");
                return None;
            }
        };

        if !record.is_fresh_at(self.clock.now()) {
            Counters::bump(&self.counters.expired);
            debug!(%category, %key, fetched_at = %record.fetched_at, "cache record expired");
            return None;
        }

        Counters::bump(&self.counters.hits);
        debug!(%category, %key, "cache hit");
        Some(record.payload)
    }

    /// Store `payload` under `key`, stamped with the current time.
    ///
    /// Returns `Ok(false)` without touching disk when the category is disabled.
    pub fn put(
        &self,
        category: Category,
        key: &CacheKey,
        payload: CachePayload,
    ) -> Result<bool, CacheError> {
        if payload.category() != category {
            return Err(CacheError::CategoryMismatch {
                expected: category.as_str(),
                found: payload.category().as_str(),
            });
        }
        if !self.policy.is_enabled(category) {
            debug!(%category, %key, "cache disabled for category, skipping write");
            return Ok(false);
        }

        let record = CacheRecord {
            category,
            key: key.clone(),
            fetched_at: self.clock.now(),
            ttl_hours: self.policy.for_category(category).ttl_hours,
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&record)?;

        let mut index = self.lock_index();
        let dir = self.root.join(category.as_str());
        fs::create_dir_all(&dir).map_err(|source| CacheError::io(&dir, source))?;
        write_atomic(&record_path(&self.root, category, key), &bytes)?;

        index.entries.insert(
            IndexEntry::index_key(category, key),
            IndexEntry {
                category,
                key: key.clone(),
                fetched_at: record.fetched_at,
                ttl_hours: record.ttl_hours,
                size_bytes: bytes.len() as u64,
            },
        );
        save_index(&self.root, &index)?;

        Counters::bump(&self.counters.writes);
        debug!(%category, %key, bytes = bytes.len(), "cache record written");
        Ok(true)
    }

    /// Remove every record for `symbol`, or every record when `symbol` is `None`.
    pub fn invalidate(&self, symbol: Option<&Symbol>) -> Result<usize, CacheError> {
        let mut index = self.lock_index();
        let removed = self.remove_where(&mut index, |_, key| {
            symbol.map_or(true, |symbol| &key.symbol == symbol)
        })?;
        debug!(symbol = ?symbol.map(Symbol::as_str), removed, "cache invalidated");
        Ok(removed)
    }

    /// Remove every record in `category`.
    pub fn invalidate_category(&self, category: Category) -> Result<usize, CacheError> {
        let mut index = self.lock_index();
        let removed = self.remove_where(&mut index, |candidate, _| candidate == category)?;
        debug!(%category, removed, "cache category invalidated");
        Ok(removed)
    }

    /// Remove records matching both parts of `filter`.
    pub fn invalidate_matching(&self, filter: &EntryFilter) -> Result<usize, CacheError> {
        let mut index = self.lock_index();
        self.remove_where(&mut index, |category, key| filter.matches(category, key))
    }

    /// Remove records that can no longer be served: expired ones and those of
    /// disabled categories.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut index = self.lock_index();
        let stale: BTreeSet<String> = index
            .entries
            .iter()
            .filter(|(_, entry)| self.is_stale(entry, now))
            .map(|(index_key, _)| index_key.clone())
            .collect();

        let removed = self.remove_where(&mut index, |category, key| {
            stale.contains(&IndexEntry::index_key(category, key))
        })?;
        debug!(removed, "expired cache records purged");
        Ok(removed)
    }

    /// Per-category summary taken from the index.
    pub fn status(&self) -> CacheStatus {
        let now = self.clock.now();
        let index = self.lock_index();

        let categories: Vec<CategoryStatus> = Category::ALL
            .into_iter()
            .map(|category| {
                let policy = self.policy.for_category(category);
                let mut status = CategoryStatus {
                    category,
                    enabled: self.policy.is_enabled(category),
                    ttl_hours: policy.ttl_hours,
                    entries: 0,
                    expired: 0,
                    size_bytes: 0,
                    oldest: None,
                    newest: None,
                };
                for entry in index.entries.values().filter(|e| e.category == category) {
                    status.entries += 1;
                    status.size_bytes += entry.size_bytes;
                    if self.is_stale(entry, now) {
                        status.expired += 1;
                    }
                    status.oldest = Some(
                        status
                            .oldest
                            .map_or(entry.fetched_at, |oldest| oldest.min(entry.fetched_at)),
                    );
                    status.newest = Some(
                        status
                            .newest
                            .map_or(entry.fetched_at, |newest| newest.max(entry.fetched_at)),
                    );
                }
                status
            })
            .collect();

        CacheStatus {
            root: self.root.clone(),
            total_entries: categories.iter().map(|c| c.entries).sum(),
            total_expired: categories.iter().map(|c| c.expired).sum(),
            total_size_bytes: categories.iter().map(|c| c.size_bytes).sum(),
            categories,
            session: self.counters.snapshot(),
        }
    }

    /// Records matching `filter`, newest first.
    pub fn entries(&self, filter: &EntryFilter) -> Vec<CacheEntryInfo> {
        let now = self.clock.now();
        let index = self.lock_index();

        let mut entries: Vec<CacheEntryInfo> = index
            .entries
            .values()
            .filter(|entry| filter.matches(entry.category, &entry.key))
            .map(|entry| CacheEntryInfo {
                category: entry.category,
                symbol: entry.key.symbol.clone(),
                frequency: entry.key.frequency,
                fetched_at: entry.fetched_at,
                expires_at: entry.fetched_at.plus_hours(entry.ttl_hours),
                expired: self.is_stale(entry, now),
                size_bytes: entry.size_bytes,
            })
            .collect();

        entries.sort_by(|left, right| {
            right
                .fetched_at
                .cmp(&left.fetched_at)
                .then_with(|| left.symbol.cmp(&right.symbol))
                .then_with(|| left.category.cmp(&right.category))
        });
        entries
    }

    /// Expired, or in a category that can no longer be served.
    fn is_stale(&self, entry: &IndexEntry, now: UtcDateTime) -> bool {
        !self.policy.is_enabled(entry.category) || !entry.is_fresh_at(now)
    }

    fn lock_index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index
            .lock()
            .expect("cache index lock should not be poisoned")
    }

    /// Delete record files selected by `predicate` and drop them from the index.
    ///
    /// The directories are scanned rather than the index so that records the
    /// index lost track of are removed too.
    fn remove_where<F>(&self, index: &mut CacheIndex, predicate: F) -> Result<usize, CacheError>
    where
        F: Fn(Category, &CacheKey) -> bool,
    {
        let mut removed = 0;
        for category in Category::ALL {
            for (key, path) in scan_category(&self.root, category)? {
                if !predicate(category, &key) {
                    continue;
                }
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(error) if error.kind() == ErrorKind::NotFound => {}
                    Err(error) => return Err(CacheError::io(&path, error)),
                }
            }
        }

        index
            .entries
            .retain(|_, entry| !predicate(entry.category, &entry.key));
        save_index(&self.root, index)?;
        Ok(removed)
    }
}

fn record_path(root: &Path, category: Category, key: &CacheKey) -> PathBuf {
    root.join(category.as_str())
        .join(format!("{}.{RECORD_EXTENSION}", key.file_stem()))
}

fn decode_record(bytes: &[u8], category: Category, key: &CacheKey) -> Result<CacheRecord, String> {
    let record: CacheRecord = serde_json::from_slice(bytes).map_err(|error| error.to_string())?;
    if record.category != category || record.payload.category() != category {
        return Err(format!(
            "record holds '{}' data, expected '{category}'",
            record.payload.category()
        ));
    }
    if &record.key != key {
        return Err(format!("record is keyed '{}', expected '{key}'", record.key));
    }
    Ok(record)
}

/// Record files of one category; files this store did not name are skipped.
fn scan_category(root: &Path, category: Category) -> Result<Vec<(CacheKey, PathBuf)>, CacheError> {
    let dir = root.join(category.as_str());
    let read_dir = match fs::read_dir(&dir) {
        Ok(read_dir) => read_dir,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(CacheError::io(&dir, error)),
    };

    let mut found = Vec::new();
    for entry in read_dir {
        let path = entry.map_err(|error| CacheError::io(&dir, error))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        let Some(key) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(CacheKey::from_file_stem)
        else {
            continue;
        };
        found.push((key, path));
    }
    Ok(found)
}

fn load_index(root: &Path) -> Option<CacheIndex> {
    let path = root.join(INDEX_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => return None,
        Err(error) => {
            warn!(path = %path.display(), %error, "unreadable cache index, rebuilding");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(index) => Some(index),
        Err(error) => {
            warn!(path = %path.display(), %error, "corrupt cache index, rebuilding");
            None
        }
    }
}

fn rebuild_index(root: &Path) -> Result<CacheIndex, CacheError> {
    let mut index = CacheIndex::default();
    for category in Category::ALL {
        for (key, path) in scan_category(root, category)? {
            let decoded = fs::read(&path)
                .map_err(|error| error.to_string())
                .and_then(|bytes| {
                    decode_record(&bytes, category, &key).map(|record| (record, bytes.len()))
                });
            match decoded {
                Ok((record, size)) => {
                    index.entries.insert(
                        IndexEntry::index_key(category, &key),
                        IndexEntry {
                            category,
                            key,
                            fetched_at: record.fetched_at,
                            ttl_hours: record.ttl_hours,
                            size_bytes: size as u64,
                        },
                    );
                }
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "skipping corrupt cache record");
                }
            }
        }
    }
    Ok(index)
}

fn save_index(root: &Path, index: &CacheIndex) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec_pretty(index)?;
    write_atomic(&root.join(INDEX_FILE), &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir).map_err(|source| CacheError::io(dir, source))?;
    file.write_all(bytes)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|source| CacheError::io(path, source))?;
    file.persist(path)
        .map_err(|error| CacheError::io(path, error.error))?;
    Ok(())
}
