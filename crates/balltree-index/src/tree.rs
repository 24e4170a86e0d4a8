//! The ball-tree index facade.

use crate::builder::build_tree;
use crate::node::BallTreeNode;
use crate::persist::{load_tree, store_tree};
use crate::search::MipSearcher;
use balltree_common::page::Locator;
use balltree_common::{BallTreeError, IndexConfig, Record, Result};
use balltree_storage::{IndexStorage, ROOT_FILE, StorageStats};
use std::path::Path;
use tracing::{info, trace};

/// Answer to a maximum inner-product query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Identifier of the best record.
    pub index: i32,
    /// Its inner product with the query.
    pub score: f64,
}

enum TreeState {
    Empty,
    Memory(BallTreeNode),
    Stored { storage: IndexStorage, root: Locator },
}

/// A ball-tree index for maximum inner-product search.
///
/// The index is either built in memory or backed by an index directory.
/// After [`BallTree::store`] or [`BallTree::restore`] the in-memory tree is
/// gone and queries page nodes and records in through the storage engine.
pub struct BallTree {
    config: IndexConfig,
    dimension: usize,
    state: TreeState,
}

impl Default for BallTree {
    fn default() -> Self {
        Self {
            config: IndexConfig::default(),
            dimension: 0,
            state: TreeState::Empty,
        }
    }
}

impl BallTree {
    /// Creates an empty index.
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dimension: 0,
            state: TreeState::Empty,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Vector dimension, once the index holds data.
    pub fn dimension(&self) -> Option<usize> {
        match self.state {
            TreeState::Empty => None,
            _ => Some(self.dimension),
        }
    }

    pub fn is_built(&self) -> bool {
        !matches!(self.state, TreeState::Empty)
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.state, TreeState::Stored { .. })
    }

    /// The in-memory tree, if the index has not been persisted.
    pub fn root(&self) -> Option<&BallTreeNode> {
        match &self.state {
            TreeState::Memory(root) => Some(root),
            _ => None,
        }
    }

    /// Builds the index over `vectors`, assigning identifiers `1..=n` in
    /// input order. Replaces any previous contents.
    pub fn build(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() > i32::MAX as usize {
            return Err(BallTreeError::InvalidInput(format!(
                "too many vectors: {}",
                vectors.len()
            )));
        }
        let records = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| Record::new(i as i32 + 1, v.clone()))
            .collect();
        self.build_records(records)
    }

    /// Builds the index over records with caller-assigned identifiers.
    pub fn build_records(&mut self, records: Vec<Record>) -> Result<()> {
        let dimension = validate_records(&records)?;
        let count = records.len();

        let root = build_tree(records, self.config.leaf_size);
        info!(
            records = count,
            dimension,
            leaves = root.leaf_count(),
            depth = root.depth(),
            "built ball tree"
        );

        self.dimension = dimension;
        self.state = TreeState::Memory(root);
        Ok(())
    }

    /// Persists the index to `dir` and serves later queries from there.
    ///
    /// Existing index files in `dir` are replaced. On failure the index
    /// keeps its previous state.
    pub fn store(&mut self, dir: impl AsRef<Path>) -> Result<Locator> {
        let dir = dir.as_ref();
        let storage = match &self.state {
            TreeState::Empty => return Err(BallTreeError::IndexNotBuilt),
            TreeState::Memory(root) => self.store_memory(root, dir, self.config.leaf_size)?,
            TreeState::Stored { storage, root } => {
                if same_dir(storage.dir(), dir) {
                    storage.flush()?;
                    return Ok(*root);
                }
                // Copy through memory with the source's leaf geometry, which
                // need not match this index's config
                let tree = load_tree(storage, *root)?;
                self.store_memory(&tree, dir, storage.leaf_size())?
            }
        };

        let locator = storage.root().ok_or(BallTreeError::IndexNotBuilt)?;
        self.state = TreeState::Stored {
            storage,
            root: locator,
        };
        Ok(locator)
    }

    fn store_memory(
        &self,
        root: &BallTreeNode,
        dir: &Path,
        leaf_size: usize,
    ) -> Result<IndexStorage> {
        let mut storage =
            IndexStorage::create(dir, self.dimension, leaf_size, &self.config.storage)?;
        store_tree(root, &mut storage)?;
        Ok(storage)
    }

    /// Opens a persisted index from `dir`.
    ///
    /// On failure the index keeps its previous state.
    pub fn restore(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let storage = IndexStorage::open(dir.as_ref(), &self.config.storage)?;
        let root = storage.root().ok_or_else(|| {
            BallTreeError::IndexFileMissing(dir.as_ref().join(ROOT_FILE).display().to_string())
        })?;

        info!(
            dir = %dir.as_ref().display(),
            dimension = storage.dimension(),
            "restored ball tree"
        );
        self.dimension = storage.dimension();
        self.state = TreeState::Stored { storage, root };
        Ok(())
    }

    /// Finds the record with the largest inner product with `query`.
    pub fn search(&self, query: &[f32]) -> Result<SearchResult> {
        if !self.is_built() {
            return Err(BallTreeError::IndexNotBuilt);
        }
        if query.len() != self.dimension {
            return Err(BallTreeError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(BallTreeError::InvalidInput(
                "query contains non-finite values".to_string(),
            ));
        }

        let mut searcher = MipSearcher::new(query);
        match &self.state {
            TreeState::Empty => return Err(BallTreeError::IndexNotBuilt),
            TreeState::Memory(root) => searcher.visit_memory(root),
            TreeState::Stored { storage, root } => searcher.visit_stored(storage, *root)?,
        }

        let stats = searcher.stats();
        trace!(
            nodes_visited = stats.nodes_visited,
            subtrees_pruned = stats.subtrees_pruned,
            records_scored = stats.records_scored,
            "search finished"
        );

        searcher
            .best()
            .map(|(index, score)| SearchResult { index, score })
            .ok_or_else(|| BallTreeError::Corrupted("no record produced a finite score".to_string()))
    }

    /// Incremental insertion is not supported. The index is left unchanged.
    pub fn insert(&mut self, _vector: &[f32]) -> Result<()> {
        Err(BallTreeError::Unsupported("insert"))
    }

    /// Incremental deletion is not supported. The index is left unchanged.
    pub fn delete(&mut self, _vector: &[f32]) -> Result<()> {
        Err(BallTreeError::Unsupported("delete"))
    }

    /// Storage statistics per kind, when the index is persisted.
    pub fn storage_stats(&self) -> Option<[StorageStats; 3]> {
        match &self.state {
            TreeState::Stored { storage, .. } => Some(storage.stats()),
            _ => None,
        }
    }
}

/// Checks a build input and returns its dimension.
fn validate_records(records: &[Record]) -> Result<usize> {
    let first = records
        .first()
        .ok_or_else(|| BallTreeError::InvalidInput("cannot build from an empty set".to_string()))?;
    let dimension = first.dimension();
    if dimension == 0 {
        return Err(BallTreeError::InvalidInput(
            "vectors must have at least one component".to_string(),
        ));
    }

    for record in records {
        if record.dimension() != dimension {
            return Err(BallTreeError::InvalidInput(format!(
                "record {} has dimension {}, expected {}",
                record.index,
                record.dimension(),
                dimension
            )));
        }
        if record.data.iter().any(|x| !x.is_finite()) {
            return Err(BallTreeError::InvalidInput(format!(
                "record {} contains non-finite values",
                record.index
            )));
        }
    }
    Ok(dimension)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
