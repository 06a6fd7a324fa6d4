//! Vector store trait and the in-process IVF implementation.
//!
//! `VectorStore` is the surface the chat pipeline consumes. It is async so
//! a networked vector database can stand in for `IvfVectorStore` without
//! touching callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use haven_core::error::HavenError;
use haven_core::types::{DistanceMetric, MessageId};

use crate::collection::{CollectionSchema, ScalarFields};
use crate::ivf::{similarity, IvfIndex, IvfParams};

/// Store-assigned entry identifier, increasing per collection.
pub type EntryId = u64;

/// A single hit returned from a vector search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entry_id: EntryId,
    /// Message the vector was computed from.
    pub owner_id: MessageId,
    /// Higher is closer. `1 - distance` for L2 collections.
    pub similarity: f64,
    pub fields: ScalarFields,
}

/// Vector persistence surface.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    ///
    /// Returns `true` when a new collection was created. An existing
    /// collection of the same name is left as it is.
    async fn ensure_collection(&self, schema: CollectionSchema) -> Result<bool, HavenError>;

    /// Index a vector under `owner_id`. Visible to searches once this returns.
    async fn insert(
        &self,
        collection: &str,
        owner_id: MessageId,
        vector: Vec<f32>,
        fields: ScalarFields,
    ) -> Result<EntryId, HavenError>;

    /// Up to `k` nearest entries, most similar first.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, HavenError>;

    /// Number of entries in a collection.
    async fn count(&self, collection: &str) -> Result<usize, HavenError>;

    /// Remove a collection and all its entries. Returns whether it existed.
    async fn drop_collection(&self, collection: &str) -> Result<bool, HavenError>;

    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>, HavenError>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    id: EntryId,
    owner_id: MessageId,
    vector: Arc<[f32]>,
    fields: ScalarFields,
}

type Collections = HashMap<String, Collection>;

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Collection {
    schema: CollectionSchema,
    entries: Vec<StoredEntry>,
    index: IvfIndex,
    next_id: EntryId,
    /// Distinguishes a recreated collection from the one a job snapshotted.
    epoch: u64,
    training: bool,
}

impl Collection {
    fn new(schema: CollectionSchema) -> Self {
        let index = IvfIndex::new(schema.ivf.clone(), schema.metric);
        Self {
            schema,
            entries: Vec::new(),
            index,
            next_id: 1,
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            training: false,
        }
    }

    /// Snapshot the vectors for training unless a job is already running.
    /// `force` skips the size threshold.
    fn begin_training(&mut self, name: &str, force: bool) -> Option<TrainingJob> {
        if self.training || self.entries.is_empty() {
            return None;
        }
        if !force && !self.index.needs_training(self.entries.len()) {
            return None;
        }

        self.training = true;
        Some(TrainingJob {
            collection: name.to_string(),
            epoch: self.epoch,
            params: self.index.params().clone(),
            metric: self.index.metric(),
            vectors: self.entries.iter().map(|e| Arc::clone(&e.vector)).collect(),
        })
    }
}

/// Vectors captured for training, detached from the store lock.
struct TrainingJob {
    collection: String,
    epoch: u64,
    params: IvfParams,
    metric: DistanceMetric,
    vectors: Vec<Arc<[f32]>>,
}

impl TrainingJob {
    fn run(self) -> TrainedIndex {
        let started = Instant::now();
        let index = IvfIndex::build(self.params, self.metric, &self.vectors);
        debug!(
            collection = %self.collection,
            entries = self.vectors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "IVF training finished"
        );
        TrainedIndex {
            collection: self.collection,
            epoch: self.epoch,
            covered: self.vectors.len(),
            index,
        }
    }
}

struct TrainedIndex {
    collection: String,
    epoch: u64,
    /// Leading entries already assigned to lists.
    covered: usize,
    index: IvfIndex,
}

/// Swap a trained index in. Entries appended while training ran are
/// assigned here. Returns `false` if the collection was dropped meanwhile.
fn install(collections: &RwLock<Collections>, trained: TrainedIndex) -> Result<bool, HavenError> {
    let mut collections = collections
        .write()
        .map_err(|e| HavenError::VectorBackend(format!("Lock poisoned: {}", e)))?;
    let coll = match collections.get_mut(&trained.collection) {
        Some(c) if c.epoch == trained.epoch => c,
        _ => {
            debug!(collection = %trained.collection, "Collection dropped during training");
            return Ok(false);
        }
    };

    let mut index = trained.index;
    for (pos, entry) in coll.entries.iter().enumerate().skip(trained.covered) {
        index.add(pos, &entry.vector);
    }
    let late = coll.entries.len() - trained.covered;
    coll.index = index;
    coll.training = false;

    info!(
        collection = %trained.collection,
        entries = coll.entries.len(),
        late,
        nlist = coll.index.nlist(),
        "IVF index installed"
    );
    Ok(true)
}

fn train_and_install(collections: &RwLock<Collections>, job: TrainingJob) {
    let name = job.collection.clone();
    if let Err(e) = install(collections, job.run()) {
        warn!(collection = %name, error = %e, "Failed to install IVF index");
    }
}

/// In-memory vector store with one IVF index per collection.
///
/// Thread-safe via interior RwLock; searches share the read lock. Once a
/// collection reaches its training threshold, k-means runs on a blocking
/// thread over a snapshot of the vectors. Searches stay exhaustive and
/// inserts keep landing until the trained index is swapped in.
#[derive(Debug, Default)]
pub struct IvfVectorStore {
    collections: Arc<RwLock<Collections>>,
}

impl IvfVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of a collection, if it exists.
    pub fn schema(&self, collection: &str) -> Result<Option<CollectionSchema>, HavenError> {
        let collections = self.read()?;
        Ok(collections.get(collection).map(|c| c.schema.clone()))
    }

    /// Whether the collection's IVF index has been trained.
    pub fn is_trained(&self, collection: &str) -> Result<bool, HavenError> {
        let collections = self.read()?;
        let coll = collections
            .get(collection)
            .ok_or_else(|| HavenError::UnknownCollection(collection.to_string()))?;
        Ok(coll.index.is_trained())
    }

    /// Train the collection's index on the calling thread, regardless of
    /// its threshold.
    ///
    /// Returns `false` if the collection is empty or training is already
    /// under way.
    pub fn train_now(&self, collection: &str) -> Result<bool, HavenError> {
        let job = {
            let mut collections = self.write()?;
            let coll = collections
                .get_mut(collection)
                .ok_or_else(|| HavenError::UnknownCollection(collection.to_string()))?;
            coll.begin_training(collection, true)
        };
        match job {
            Some(job) => install(&self.collections, job.run()),
            None => Ok(false),
        }
    }

    /// Run `job` on the blocking pool, or inline outside a runtime.
    fn schedule_training(&self, job: TrainingJob) {
        info!(
            collection = %job.collection,
            entries = job.vectors.len(),
            "IVF training started"
        );
        let collections = Arc::clone(&self.collections);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                // k-means is CPU-bound; keep it off the async workers.
                handle.spawn_blocking(move || train_and_install(&collections, job));
            }
            Err(_) => train_and_install(&collections, job),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collections>, HavenError> {
        self.collections
            .read()
            .map_err(|e| HavenError::VectorBackend(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collections>, HavenError> {
        self.collections
            .write()
            .map_err(|e| HavenError::VectorBackend(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl VectorStore for IvfVectorStore {
    async fn ensure_collection(&self, schema: CollectionSchema) -> Result<bool, HavenError> {
        schema.validate()?;

        let mut collections = self.write()?;
        if collections.contains_key(&schema.name) {
            return Ok(false);
        }

        info!(
            collection = %schema.name,
            dimension = schema.dimension,
            metric = ?schema.metric,
            nlist = schema.ivf.nlist,
            "Vector collection created"
        );
        collections.insert(schema.name.clone(), Collection::new(schema));
        Ok(true)
    }

    async fn insert(
        &self,
        collection: &str,
        owner_id: MessageId,
        vector: Vec<f32>,
        fields: ScalarFields,
    ) -> Result<EntryId, HavenError> {
        let (id, job) = {
            let mut collections = self.write()?;
            let coll = collections
                .get_mut(collection)
                .ok_or_else(|| HavenError::UnknownCollection(collection.to_string()))?;

            coll.schema.check_vector(&vector)?;
            coll.schema.check_fields(&fields)?;

            let id = coll.next_id;
            coll.next_id += 1;
            let position = coll.entries.len();
            coll.index.add(position, &vector);
            coll.entries.push(StoredEntry {
                id,
                owner_id,
                vector: Arc::from(vector),
                fields,
            });

            (id, coll.begin_training(collection, false))
        };

        debug!(collection, entry_id = id, owner_id, "Vector indexed");
        if let Some(job) = job {
            self.schedule_training(job);
        }
        Ok(id)
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, HavenError> {
        let collections = self.read()?;
        let coll = collections
            .get(collection)
            .ok_or_else(|| HavenError::UnknownCollection(collection.to_string()))?;

        coll.schema.check_vector(query)?;
        if k == 0 || coll.entries.is_empty() {
            return Ok(Vec::new());
        }

        let metric = coll.schema.metric;
        let mut scored: Vec<(f64, &StoredEntry)> = coll
            .index
            .candidates(query, coll.entries.len())
            .into_iter()
            .map(|pos| {
                let entry = &coll.entries[pos];
                (similarity(metric, query, &entry.vector), entry)
            })
            .collect();

        // Descending similarity; earlier entries win ties.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.id.cmp(&b.1.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(sim, entry)| SearchHit {
                entry_id: entry.id,
                owner_id: entry.owner_id,
                similarity: sim,
                fields: entry.fields.clone(),
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize, HavenError> {
        let collections = self.read()?;
        collections
            .get(collection)
            .map(|c| c.entries.len())
            .ok_or_else(|| HavenError::UnknownCollection(collection.to_string()))
    }

    async fn drop_collection(&self, collection: &str) -> Result<bool, HavenError> {
        let mut collections = self.write()?;
        let existed = collections.remove(collection).is_some();
        if existed {
            info!(collection, "Vector collection dropped");
        }
        Ok(existed)
    }

    async fn list_collections(&self) -> Result<Vec<String>, HavenError> {
        let collections = self.read()?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
