//! Candidate pool and distinct identifier selection

use rand::Rng;
use std::collections::HashSet;
use std::path::Path;

use super::SamplingError;
use crate::BeatmapId;

/// Rejection draws attempted before falling back to an explicit scan.
const REDRAW_ATTEMPTS_PER_CANDIDATE: usize = 4;

/// Read-only pool of candidate beatmap identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatmapPool {
    ids: Vec<BeatmapId>,
    distinct: usize,
}

impl BeatmapPool {
    /// Build a pool from identifiers; duplicates are allowed but weigh the draw.
    pub fn new(ids: Vec<BeatmapId>) -> Self {
        let distinct = ids.iter().collect::<HashSet<_>>().len();
        Self { ids, distinct }
    }

    /// Load a JSON array of integers.
    pub fn load(path: &Path) -> Result<Self, SamplingError> {
        let content = std::fs::read_to_string(path).map_err(|e| SamplingError::Pool {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let ids: Vec<BeatmapId> = serde_json::from_str(&content).map_err(|e| SamplingError::Pool {
            path: path.to_path_buf(),
            message: format!("expected a JSON array of beatmap ids: {e}"),
        })?;
        Ok(Self::new(ids))
    }

    /// All identifiers as loaded
    pub fn ids(&self) -> &[BeatmapId] {
        &self.ids
    }

    /// Number of entries, duplicates included
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the pool has no entries
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of distinct identifiers
    pub fn distinct_len(&self) -> usize {
        self.distinct
    }
}

/// Draws identifiers uniformly from a pool without repeating any selected one
#[derive(Debug, Default)]
pub struct DistinctSelector {
    selected: HashSet<BeatmapId>,
}

impl DistinctSelector {
    /// Create a selector with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers currently held as selected
    pub fn selected(&self) -> &HashSet<BeatmapId> {
        &self.selected
    }

    /// Draw a fresh identifier and mark it selected.
    ///
    /// Redraws on collision with an already-selected identifier. Returns
    /// `None` once every distinct identifier in the pool has been selected.
    pub fn draw<R: Rng + ?Sized>(&mut self, pool: &BeatmapPool, rng: &mut R) -> Option<BeatmapId> {
        if self.selected.len() >= pool.distinct_len() {
            return None;
        }

        let attempts = pool.len().saturating_mul(REDRAW_ATTEMPTS_PER_CANDIDATE).max(1);
        for _ in 0..attempts {
            let id = pool.ids[rng.gen_range(0..pool.ids.len())];
            if self.selected.insert(id) {
                return Some(id);
            }
        }

        // Nearly exhausted pool: pick uniformly among the entries still free.
        let remaining: Vec<BeatmapId> = pool
            .ids
            .iter()
            .copied()
            .filter(|id| !self.selected.contains(id))
            .collect();
        let id = remaining[rng.gen_range(0..remaining.len())];
        self.selected.insert(id);
        Some(id)
    }

    /// Make `id` drawable again.
    pub fn release(&mut self, id: BeatmapId) -> bool {
        self.selected.remove(&id)
    }
}
