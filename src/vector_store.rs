//! # VectorStore
//!
//! Persistent chunk index for the timetable assistant.
//!
//! The store keeps every ingested [`Chunk`] together with its embedding and a
//! flat (brute-force, Euclidean) `hora` ANN index over those vectors. All owners
//! share one store; owner and date scoping happens at query time by scanning the
//! ranked candidates (see [`crate::retriever`]).
//!
//! ## Lifecycle
//! - [`VectorStore::open_or_create`] loads `<path>` or, whatever went wrong,
//!   starts from an empty in-memory store. Nothing touches the disk until the
//!   first successful [`add`](VectorStore::add).
//! - [`add`](VectorStore::add) embeds a batch, then persists the whole store
//!   before the batch becomes visible in memory. A failing batch leaves both the
//!   on-disk and the in-memory state as they were.
//! - [`remove_owner`](VectorStore::remove_owner) drops one owner's chunks,
//!   [`wipe`] drops the whole directory.
//!
//! ## On-disk layout
//! - `<path>/chunks-<blake3>.bin`: bincode snapshot of ids, chunks and vectors,
//!   named after its own checksum.
//! - `<path>/manifest.yaml`: dimension, embedding model, chunk count, owners
//!   and the name of the current snapshot file.
//!
//! A save writes the new snapshot under its own name, then renames the manifest
//! into place; only that rename switches readers to the new state. Older
//! snapshots are deleted afterwards. There is no locking: two processes writing
//! the same path race, last writer wins.
//!
//! ## Quick Example
//! ```no_run
//! use edt_assistant::embedding::{Embedder, HashingEmbedder};
//! use edt_assistant::vector_store::VectorStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = HashingEmbedder::new(384);
//! let mut store = VectorStore::open_or_create("index", embedder.dimension());
//! store.add(&embedder, vec![/* chunks */])?;
//! # Ok(()) }
//! ```

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::bruteforce_idx::BruteForceIndex;
use hora::index::bruteforce_params::BruteForceParams;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::{fmt, fs};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::embedding::Embedder;

const MANIFEST_FILE: &str = "manifest.yaml";
const CHUNKS_PREFIX: &str = "chunks-";
const CHUNKS_SUFFIX: &str = ".bin";
const FORMAT_VERSION: u32 = 2;

/// A chunk, its stable id and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    id: usize,
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimension: usize,
    next_id: usize,
    entries: &'a [StoredChunk],
}

#[derive(Deserialize)]
struct Snapshot {
    dimension: usize,
    next_id: usize,
    entries: Vec<StoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    dimension: usize,
    embedding_model: String,
    chunks: usize,
    owners: Vec<String>,
    /// Snapshot file in the same directory.
    chunks_file: String,
    /// blake3 hex digest of `chunks_file`.
    checksum: String,
}

fn chunks_file_name(checksum: &str) -> String {
    format!("{CHUNKS_PREFIX}{checksum}{CHUNKS_SUFFIX}")
}

fn is_chunks_file(name: &str) -> bool {
    name.starts_with(CHUNKS_PREFIX) && name.ends_with(CHUNKS_SUFFIX)
}

/// Outcome of reading a persisted store.
///
/// Every variant but [`Loaded`](LoadResult::Loaded) is recoverable by starting
/// from an empty store, which is what [`VectorStore::open_or_create`] does.
pub enum LoadResult {
    Loaded(VectorStore),
    /// No manifest at the path: nothing was ever saved there.
    Missing,
    /// Unreadable, truncated or checksum-mismatched data.
    Corrupt(String),
    /// The persisted vectors were built with another embedding dimension.
    DimensionMismatch { expected: usize, found: usize },
}

impl LoadResult {
    /// The loaded store, if any.
    pub fn into_store(self) -> Option<VectorStore> {
        match self {
            LoadResult::Loaded(store) => Some(store),
            _ => None,
        }
    }
}

/// Per-owner ingestion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    NotIngested,
    Ingested,
}

/// Why a batch could not be ingested. The previously persisted state is intact.
#[derive(Debug)]
pub enum IngestError {
    /// The embedding provider failed on a chunk.
    Embedding(String),
    /// The provider returned a vector of the wrong length. This is a
    /// configuration error (backend and index disagree), not a transient one.
    DimensionMismatch { expected: usize, found: usize },
    /// The ANN index rejected the vectors.
    Index(&'static str),
    /// Writing the store to disk failed.
    Persistence(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Embedding(e) => write!(f, "ingestion did not complete: embedding failed: {e}"),
            IngestError::DimensionMismatch { expected, found } => write!(
                f,
                "ingestion did not complete: embedding dimension {found} does not match index dimension {expected}"
            ),
            IngestError::Index(e) => write!(f, "ingestion did not complete: index error: {e}"),
            IngestError::Persistence(e) => {
                write!(f, "ingestion did not complete: could not persist index: {e}")
            }
        }
    }
}

impl Error for IngestError {}

/// Persistent embedding store shared by all owners.
pub struct VectorStore {
    path: PathBuf,
    /// Fixed at creation; every vector must match it exactly.
    dimension: usize,
    embedding_model: String,
    next_id: usize,
    entries: Vec<StoredChunk>,
    /// Flat L2 index; node idx is the position in `entries`.
    index: BruteForceIndex<f32, usize>,
}

impl VectorStore {
    /// Create an empty, unsaved store for `path`.
    pub fn create(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            path: path.into(),
            dimension,
            embedding_model: String::new(),
            next_id: 0,
            entries: Vec::new(),
            index: BruteForceIndex::new(dimension, &BruteForceParams::default()),
        }
    }

    /// Load the store persisted at `path`, expecting vectors of `dimension`.
    pub fn load(path: impl Into<PathBuf>, dimension: usize) -> LoadResult {
        let path = path.into();
        let manifest_path = path.join(MANIFEST_FILE);

        if !manifest_path.is_file() {
            return LoadResult::Missing;
        }

        let manifest: Manifest = match fs::read_to_string(&manifest_path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_yaml::from_str(&s).map_err(|e| e.to_string()))
        {
            Ok(manifest) => manifest,
            Err(e) => return LoadResult::Corrupt(format!("manifest: {e}")),
        };

        if manifest.dimension != dimension {
            return LoadResult::DimensionMismatch {
                expected: dimension,
                found: manifest.dimension,
            };
        }

        let chunks_file = manifest.chunks_file.as_str();
        if !is_chunks_file(chunks_file) || chunks_file.contains(['/', '\\']) {
            return LoadResult::Corrupt(format!("manifest names an invalid snapshot `{chunks_file}`"));
        }
        let bytes = match fs::read(path.join(chunks_file)) {
            Ok(bytes) => bytes,
            Err(e) => return LoadResult::Corrupt(format!("{chunks_file}: {e}")),
        };
        if blake3::hash(&bytes).to_hex().as_str() != manifest.checksum {
            return LoadResult::Corrupt(format!("{chunks_file}: checksum mismatch"));
        }

        let snapshot: Snapshot =
            match bincode::serde::decode_from_slice(&bytes, bincode::config::standard()) {
                Ok((snapshot, _)) => snapshot,
                Err(e) => return LoadResult::Corrupt(format!("{chunks_file}: {e}")),
            };

        if snapshot.dimension != dimension
            || snapshot.entries.iter().any(|e| e.vector.len() != dimension)
        {
            return LoadResult::Corrupt("vector lengths disagree with the manifest".to_string());
        }

        let mut store = Self::create(path, dimension);
        store.embedding_model = manifest.embedding_model;
        store.next_id = snapshot.next_id;
        store.entries = snapshot.entries;

        if let Err(e) = store.rebuild_index() {
            return LoadResult::Corrupt(format!("index rebuild: {e}"));
        }

        LoadResult::Loaded(store)
    }

    /// Load `path`, or fall back to a fresh empty store.
    ///
    /// Never fails: a missing, corrupt or incompatible index is logged and
    /// replaced (in memory) by an empty one. The old files are only overwritten
    /// by the next successful [`add`](Self::add).
    pub fn open_or_create(path: impl Into<PathBuf>, dimension: usize) -> Self {
        let path = path.into();
        match Self::load(&path, dimension) {
            LoadResult::Loaded(store) => {
                info!("Loaded index from {} ({} chunks)", path.display(), store.len());
                return store;
            }
            LoadResult::Missing => {
                info!("No index found at {}, starting empty", path.display());
            }
            LoadResult::Corrupt(reason) => {
                warn!("Index at {} is unreadable ({reason}), starting empty", path.display());
            }
            LoadResult::DimensionMismatch { expected, found } => {
                warn!(
                    "Index at {} has dimension {found}, expected {expected}; starting empty",
                    path.display()
                );
            }
        }
        Self::create(path, dimension)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct owners with at least one chunk.
    pub fn owners(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.chunk.owner_id.as_str()).collect()
    }

    pub fn owner_state(&self, owner_id: &str) -> IngestState {
        if self.entries.iter().any(|e| e.chunk.owner_id == owner_id) {
            IngestState::Ingested
        } else {
            IngestState::NotIngested
        }
    }

    /// Embed `chunks`, append them and persist the whole store.
    ///
    /// Returns the number of chunks added. The batch is all-or-nothing: on error
    /// neither the files at [`path`](Self::path) nor this value change.
    ///
    /// # Errors
    /// See [`IngestError`].
    pub fn add(&mut self, embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if !self.embedding_model.is_empty() && self.embedding_model != embedder.model_name() {
            warn!(
                "Index was built with {}, now embedding with {}",
                self.embedding_model,
                embedder.model_name()
            );
        }

        let mut batch = Vec::with_capacity(chunks.len());
        let mut next_id = self.next_id;
        for chunk in chunks {
            let vector = embedder
                .embed(&chunk.text)
                .map_err(|e| IngestError::Embedding(e.to_string()))?;
            if vector.len() != self.dimension {
                return Err(IngestError::DimensionMismatch {
                    expected: self.dimension,
                    found: vector.len(),
                });
            }
            batch.push(StoredChunk {
                id: next_id,
                chunk,
                vector,
            });
            next_id += 1;
        }

        let added = batch.len();
        let mut entries = self.entries.clone();
        entries.extend(batch);

        self.persist(&entries, next_id, embedder.model_name())?;

        self.entries = entries;
        self.next_id = next_id;
        self.embedding_model = embedder.model_name().to_string();
        self.rebuild_index().map_err(IngestError::Index)?;

        info!("Saved {added} chunks to {}", self.path.display());
        Ok(added)
    }

    /// Remove every chunk of `owner_id` and persist. Returns how many were removed.
    pub fn remove_owner(&mut self, owner_id: &str) -> Result<usize, IngestError> {
        let kept: Vec<StoredChunk> = self
            .entries
            .iter()
            .filter(|e| e.chunk.owner_id != owner_id)
            .cloned()
            .collect();
        let removed = self.entries.len() - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let model = self.embedding_model.clone();
        self.persist(&kept, self.next_id, &model)?;
        self.entries = kept;
        self.rebuild_index().map_err(IngestError::Index)?;

        info!("Removed {removed} chunks of {owner_id}");
        Ok(removed)
    }

    /// Delete the persisted files and forget every chunk.
    pub fn wipe(&mut self) -> io::Result<()> {
        wipe(&self.path)?;
        self.entries.clear();
        self.next_id = 0;
        self.index = BruteForceIndex::new(self.dimension, &BruteForceParams::default());
        Ok(())
    }

    /// Chunks nearest to `vector` that satisfy `keep`, best first, at most `top_k`.
    ///
    /// Every candidate is ranked, then filtered, so a selective `keep` still sees
    /// the whole corpus. A query vector of the wrong length yields nothing.
    pub fn nearest<F>(&self, vector: &[f32], top_k: usize, keep: F) -> Vec<(&Chunk, f32)>
    where
        F: Fn(&Chunk) -> bool,
    {
        if self.entries.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if vector.len() != self.dimension {
            warn!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            );
            return Vec::new();
        }

        let mut ranked: Vec<(&Chunk, f32)> = self
            .index
            .search_nodes(vector, self.entries.len())
            .into_iter()
            .filter_map(|(node, distance)| {
                let position = (*node.idx())?;
                self.entries.get(position).map(|e| (&e.chunk, distance))
            })
            .filter(|(chunk, _)| keep(chunk))
            .collect();

        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(top_k);
        ranked
    }

    fn rebuild_index(&mut self) -> Result<(), &'static str> {
        let mut index = BruteForceIndex::new(self.dimension, &BruteForceParams::default());
        for (position, entry) in self.entries.iter().enumerate() {
            index.add(&entry.vector, position)?;
        }
        if !self.entries.is_empty() {
            index.build(Metric::Euclidean)?;
        }
        self.index = index;
        Ok(())
    }

    fn persist(&self, entries: &[StoredChunk], next_id: usize, model: &str) -> Result<(), IngestError> {
        self.write_files(entries, next_id, model)
            .map_err(|e| IngestError::Persistence(e.to_string()))
    }

    fn write_files(&self, entries: &[StoredChunk], next_id: usize, model: &str) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(&self.path)?;

        let snapshot = SnapshotRef {
            dimension: self.dimension,
            next_id,
            entries,
        };
        let bytes = bincode::serde::encode_to_vec(&snapshot, bincode::config::standard())?;

        let checksum = blake3::hash(&bytes).to_hex().to_string();
        let chunks_file = chunks_file_name(&checksum);

        let owners: BTreeSet<&str> = entries.iter().map(|e| e.chunk.owner_id.as_str()).collect();
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            embedding_model: model.to_string(),
            chunks: entries.len(),
            owners: owners.into_iter().map(str::to_string).collect(),
            chunks_file: chunks_file.clone(),
            checksum,
        };
        let yaml = serde_yaml::to_string(&manifest)?;

        let mut chunks_tmp = NamedTempFile::new_in(&self.path)?;
        chunks_tmp.write_all(&bytes)?;
        chunks_tmp.as_file().sync_all()?;
        chunks_tmp.persist(self.path.join(&chunks_file))?;

        // Readers switch to the new snapshot here.
        let mut manifest_tmp = NamedTempFile::new_in(&self.path)?;
        manifest_tmp.write_all(yaml.as_bytes())?;
        manifest_tmp.as_file().sync_all()?;
        manifest_tmp.persist(self.path.join(MANIFEST_FILE))?;

        self.remove_stale_snapshots(&chunks_file);
        debug!("Persisted {} chunks ({} bytes) to {chunks_file}", entries.len(), bytes.len());
        Ok(())
    }

    /// Delete snapshot files other than `current`. Failures only warn: the
    /// manifest already points at `current`.
    fn remove_stale_snapshots(&self, current: &str) {
        let dir = match fs::read_dir(&self.path) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot list {}: {e}", self.path.display());
                return;
            }
        };
        for entry in dir.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_chunks_file(name) && name != current {
                match fs::remove_file(entry.path()) {
                    Ok(()) => debug!("Removed stale snapshot {name}"),
                    Err(e) => warn!("Cannot remove stale snapshot {name}: {e}"),
                }
            }
        }
    }
}

/// Delete everything persisted at `path`. A missing path is not an error.
pub fn wipe(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!("Wiped index at {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, Box<dyn Error>> {
            Err("provider unavailable".into())
        }
        fn dimension(&self) -> usize {
            32
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn chunk(owner: &str, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            owner_id: owner.to_string(),
            source_uri: format!("http://edt/?login={owner}"),
            date_tags: BTreeSet::new(),
        }
    }

    fn index_dir() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index");
        (dir, path)
    }

    fn snapshot_files(path: &Path) -> Vec<PathBuf> {
        fs::read_dir(path)
            .unwrap()
            .flatten()
            .filter(|e| is_chunks_file(&e.file_name().to_string_lossy()))
            .map(|e| e.path())
            .collect()
    }

    #[test]
    fn test_add_persists_and_reloads() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let embedder = HashingEmbedder::new(32);

        let mut store = VectorStore::open_or_create(&path, 32);
        assert!(store.is_empty());
        assert!(!path.exists(), "nothing is written before the first add");

        let added = store.add(
            &embedder,
            vec![chunk("rcastelain", "Cm Réseaux"), chunk("htiaiba", "Tp Systèmes")],
        )?;
        assert_eq!(added, 2);

        let reloaded = VectorStore::load(&path, 32).into_store().expect("loaded");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.owner_state("rcastelain"), IngestState::Ingested);
        assert_eq!(reloaded.owners().len(), 2);
        Ok(())
    }

    #[test]
    fn test_load_missing_and_dimension_mismatch() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        assert!(matches!(VectorStore::load(&path, 32), LoadResult::Missing));

        let mut store = VectorStore::create(&path, 32);
        store.add(&HashingEmbedder::new(32), vec![chunk("a", "x")])?;

        assert!(matches!(
            VectorStore::load(&path, 64),
            LoadResult::DimensionMismatch {
                expected: 64,
                found: 32
            }
        ));
        let fallback = VectorStore::open_or_create(&path, 64);
        assert!(fallback.is_empty());
        assert_eq!(fallback.dimension(), 64);
        Ok(())
    }

    #[test]
    fn test_open_or_create_recovers_from_corruption() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let embedder = HashingEmbedder::new(32);
        let mut store = VectorStore::create(&path, 32);
        store.add(&embedder, vec![chunk("a", "x")])?;

        for snapshot in snapshot_files(&path) {
            fs::write(snapshot, b"definitely not bincode")?;
        }
        assert!(matches!(VectorStore::load(&path, 32), LoadResult::Corrupt(_)));

        let mut recovered = VectorStore::open_or_create(&path, 32);
        assert!(recovered.is_empty());
        recovered.add(&embedder, vec![chunk("a", "y")])?;
        assert_eq!(VectorStore::load(&path, 32).into_store().unwrap().len(), 1);

        fs::write(path.join(MANIFEST_FILE), ": : not yaml [")?;
        assert!(matches!(VectorStore::load(&path, 32), LoadResult::Corrupt(_)));
        Ok(())
    }

    #[test]
    fn test_failed_batch_leaves_state_intact() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let mut store = VectorStore::create(&path, 32);
        store.add(&HashingEmbedder::new(32), vec![chunk("a", "first")])?;

        let err = store.add(&FailingEmbedder, vec![chunk("a", "second")]).unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert!(err.to_string().starts_with("ingestion did not complete"));
        assert_eq!(store.len(), 1);
        assert_eq!(VectorStore::load(&path, 32).into_store().unwrap().len(), 1);
        Ok(())
    }

    #[test]
    fn test_snapshot_written_without_manifest_is_ignored() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let embedder = HashingEmbedder::new(32);
        let mut store = VectorStore::create(&path, 32);
        store.add(&embedder, vec![chunk("a", "first")])?;

        // A save interrupted before the manifest rename leaves a newer snapshot behind.
        let orphan = path.join(chunks_file_name(&blake3::hash(b"orphan").to_hex()));
        fs::write(&orphan, b"newer snapshot, never committed")?;

        let reloaded = VectorStore::load(&path, 32).into_store().expect("prior state");
        assert_eq!(reloaded.len(), 1);

        store.add(&embedder, vec![chunk("a", "second")])?;
        assert!(!orphan.exists());
        assert_eq!(snapshot_files(&path).len(), 1);
        assert_eq!(VectorStore::load(&path, 32).into_store().unwrap().len(), 2);
        Ok(())
    }

    #[test]
    fn test_persistence_failure_keeps_prior_state() -> Result<(), Box<dyn Error>> {
        let (dir, path) = index_dir();
        let embedder = HashingEmbedder::new(32);
        let mut store = VectorStore::create(&path, 32);
        store.add(&embedder, vec![chunk("a", "first")])?;

        // Put a regular file where the index directory should be.
        let aside = dir.path().join("aside");
        fs::rename(&path, &aside)?;
        fs::write(&path, b"not a directory")?;

        let err = store.add(&embedder, vec![chunk("a", "second")]).unwrap_err();
        assert!(matches!(err, IngestError::Persistence(_)));
        assert_eq!(store.len(), 1);
        assert!(matches!(store.remove_owner("a"), Err(IngestError::Persistence(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(fs::read(&path)?, b"not a directory");

        fs::remove_file(&path)?;
        fs::rename(&aside, &path)?;
        let reloaded = VectorStore::load(&path, 32).into_store().expect("prior state");
        assert_eq!(reloaded.len(), 1);
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch_on_add_is_rejected() {
        let (_dir, path) = index_dir();
        let mut store = VectorStore::create(&path, 32);
        let err = store
            .add(&HashingEmbedder::new(16), vec![chunk("a", "x")])
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::DimensionMismatch {
                expected: 32,
                found: 16
            }
        ));
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_owner_keeps_other_owners() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let embedder = HashingEmbedder::new(32);
        let mut store = VectorStore::create(&path, 32);
        store.add(
            &embedder,
            vec![chunk("a", "one"), chunk("b", "two"), chunk("a", "three")],
        )?;

        assert_eq!(store.remove_owner("a")?, 2);
        assert_eq!(store.remove_owner("a")?, 0);
        assert_eq!(store.owner_state("a"), IngestState::NotIngested);
        assert_eq!(store.owner_state("b"), IngestState::Ingested);

        let reloaded = VectorStore::load(&path, 32).into_store().unwrap();
        assert_eq!(reloaded.len(), 1);
        Ok(())
    }

    #[test]
    fn test_wipe() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let embedder = HashingEmbedder::new(32);
        let mut store = VectorStore::create(&path, 32);
        store.add(&embedder, vec![chunk("a", "one")])?;

        store.wipe()?;
        assert!(store.is_empty());
        assert_eq!(store.owner_state("a"), IngestState::NotIngested);
        assert!(!path.exists());
        // Wiping an absent path is fine.
        wipe(&path)?;
        Ok(())
    }

    #[test]
    fn test_nearest_orders_by_distance_and_filters() -> Result<(), Box<dyn Error>> {
        let (_dir, path) = index_dir();
        let embedder = HashingEmbedder::new(128);
        let mut store = VectorStore::create(&path, 128);
        store.add(
            &embedder,
            vec![
                chunk("a", "algorithmique"),
                chunk("a", "réseaux réseaux"),
                chunk("b", "réseaux"),
            ],
        )?;

        let query = embedder.embed("réseaux")?;
        let all = store.nearest(&query, 10, |_| true);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].1 <= w[1].1));

        let only_a = store.nearest(&query, 10, |c| c.owner_id == "a");
        assert_eq!(only_a.len(), 2);
        assert_eq!(only_a[0].0.text, "réseaux réseaux");

        assert!(store.nearest(&[0.0; 3], 10, |_| true).is_empty());
        Ok(())
    }
}
