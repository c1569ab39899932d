//! User similarity index
//!
//! Holds every known user's encoded vector and the full pairwise cosine
//! similarity matrix. A rebuild constructs a complete [`IndexSnapshot`] off to
//! the side and then swaps the published `Arc` in one step, so a reader always
//! sees one internally consistent snapshot.

use ahash::AHashMap;
use ecoprint_core::{Error, FeatureEncoder, NumericScaler, Result, UserProfile, Vector};
use ordered_float::OrderedFloat;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A similar user returned by a neighbor query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub user_id: String,
    /// Dense row of the user in the snapshot the query ran against
    pub row: usize,
    pub similarity: f32,
}

/// Immutable published state of the index
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    /// Row -> user
    user_ids: Vec<String>,
    /// User -> row
    rows: AHashMap<String, usize>,
    /// Row -> encoded vector
    vectors: Vec<Vector>,
    /// Row-major N×N cosine similarities
    similarity: Vec<f32>,
    generation: u64,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// Number of rebuilds published before and including this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn row_of(&self, user_id: &str) -> Option<usize> {
        self.rows.get(user_id).copied()
    }

    pub fn user_at(&self, row: usize) -> Option<&str> {
        self.user_ids.get(row).map(String::as_str)
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn vector(&self, user_id: &str) -> Option<&Vector> {
        self.row_of(user_id).and_then(|row| self.vectors.get(row))
    }

    pub fn vector_at(&self, row: usize) -> Option<&Vector> {
        self.vectors.get(row)
    }

    pub fn similarity(&self, a: usize, b: usize) -> Option<f32> {
        let n = self.len();
        if a >= n || b >= n {
            return None;
        }
        Some(self.similarity[a * n + b])
    }

    pub fn similarity_row(&self, row: usize) -> Option<&[f32]> {
        let n = self.len();
        (row < n).then(|| &self.similarity[row * n..(row + 1) * n])
    }

    /// The `k` users most similar to `user_id`, most similar first.
    ///
    /// The user itself is never returned. Equal similarities are ordered by
    /// ascending row, i.e. by first appearance in the rebuild batch.
    pub fn neighbors(&self, user_id: &str, k: usize) -> Result<Vec<Neighbor>> {
        let row = self
            .row_of(user_id)
            .ok_or_else(|| Error::UserNotIndexed(user_id.to_string()))?;
        let Some(similarities) = self.similarity_row(row) else {
            return Err(Error::UserNotIndexed(user_id.to_string()));
        };

        let mut candidates: Vec<(usize, f32)> = similarities
            .iter()
            .copied()
            .enumerate()
            .filter(|&(other, _)| other != row)
            .collect();

        candidates.sort_by(|a, b| {
            OrderedFloat(b.1)
                .cmp(&OrderedFloat(a.1))
                .then_with(|| a.0.cmp(&b.0))
        });
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .map(|(other, similarity)| Neighbor {
                user_id: self.user_ids[other].clone(),
                row: other,
                similarity,
            })
            .collect())
    }

    /// Build a snapshot. When the encoder has no scaler yet and the batch is
    /// not empty, the batch is encoded with a scaler fitted on it, which is
    /// returned for the caller to install once the snapshot is published.
    fn build(
        encoder: &FeatureEncoder,
        profiles: &[UserProfile],
        abort: &AtomicBool,
        generation: u64,
    ) -> Result<(Self, Option<NumericScaler>)> {
        check_abort(abort)?;
        let candidate = match encoder.scaler() {
            None if !profiles.is_empty() => Some(NumericScaler::fit(encoder.schema()?, profiles)),
            _ => None,
        };

        let mut user_ids: Vec<String> = Vec::with_capacity(profiles.len());
        let mut rows: AHashMap<String, usize> = AHashMap::with_capacity(profiles.len());
        let mut vectors: Vec<Vector> = Vec::with_capacity(profiles.len());

        for profile in profiles {
            check_abort(abort)?;
            let vector = match &candidate {
                Some(scaler) => encoder.encode_with_scaler(profile, scaler)?,
                None => encoder.encode(profile)?,
            };
            match rows.get(&profile.user_id) {
                Some(&row) => vectors[row] = vector,
                None => {
                    rows.insert(profile.user_id.clone(), user_ids.len());
                    user_ids.push(profile.user_id.clone());
                    vectors.push(vector);
                }
            }
        }

        check_abort(abort)?;
        let similarity = similarity_matrix(&vectors, abort)?;

        let snapshot = Self {
            user_ids,
            rows,
            vectors,
            similarity,
            generation,
        };
        Ok((snapshot, candidate))
    }
}

fn check_abort(abort: &AtomicBool) -> Result<()> {
    if abort.load(Ordering::Acquire) {
        Err(Error::RebuildAborted)
    } else {
        Ok(())
    }
}

/// Full pairwise cosine matrix. Only the upper triangle is computed and then
/// mirrored, so the result is exactly symmetric; the diagonal is pinned to 1.
fn similarity_matrix(vectors: &[Vector], abort: &AtomicBool) -> Result<Vec<f32>> {
    let n = vectors.len();

    let upper: Vec<Vec<f32>> = (0..n)
        .into_par_iter()
        .map(|i| {
            if abort.load(Ordering::Relaxed) {
                return Vec::new();
            }
            ((i + 1)..n)
                .map(|j| vectors[i].cosine_similarity(&vectors[j]))
                .collect()
        })
        .collect();

    // A row skipped above implies the flag is set
    check_abort(abort)?;

    let mut matrix = vec![0.0f32; n * n];
    for (i, row) in upper.into_iter().enumerate() {
        matrix[i * n + i] = 1.0;
        for (offset, sim) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            matrix[i * n + j] = sim;
            matrix[j * n + i] = sim;
        }
    }

    Ok(matrix)
}

/// Cross-user similarity index with copy-on-write rebuilds
pub struct UserSimilarityIndex {
    encoder: Arc<FeatureEncoder>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// Serializes rebuilds
    rebuild_lock: Mutex<()>,
}

impl UserSimilarityIndex {
    pub fn new(encoder: Arc<FeatureEncoder>) -> Self {
        Self {
            encoder,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn encoder(&self) -> &Arc<FeatureEncoder> {
        &self.encoder
    }

    /// Replace the index with one built from `profiles`.
    ///
    /// Rows are assigned in first-seen order. When a user appears twice, the
    /// first row is kept and the later profile's vector replaces the earlier.
    pub fn rebuild(&self, profiles: &[UserProfile]) -> Result<()> {
        self.rebuild_with_abort(profiles, &AtomicBool::new(false))
    }

    /// Like [`rebuild`](Self::rebuild), giving up with
    /// [`Error::RebuildAborted`] once `abort` is raised. The published
    /// snapshot is untouched by an abandoned rebuild.
    pub fn rebuild_with_abort(&self, profiles: &[UserProfile], abort: &AtomicBool) -> Result<()> {
        let _guard = self.rebuild_lock.lock();
        let started = Instant::now();
        let generation = self.snapshot.read().generation() + 1;

        let (snapshot, scaler) = match IndexSnapshot::build(&self.encoder, profiles, abort, generation) {
            Ok(built) => built,
            Err(Error::RebuildAborted) => {
                tracing::warn!(profiles = profiles.len(), "similarity index rebuild abandoned");
                return Err(Error::RebuildAborted);
            }
            Err(e) => return Err(e),
        };

        if abort.load(Ordering::Acquire) {
            tracing::warn!(profiles = profiles.len(), "similarity index rebuild abandoned before publish");
            return Err(Error::RebuildAborted);
        }

        // The batch that produces the first published snapshot becomes the
        // scaling reference
        if let Some(scaler) = scaler {
            if !self.encoder.install_scaler(scaler)? {
                tracing::warn!("numeric scaler fitted elsewhere during rebuild; scaling may differ");
            }
        }

        let users = snapshot.len();
        *self.snapshot.write() = Arc::new(snapshot);

        tracing::info!(
            users,
            generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "similarity index rebuilt"
        );
        Ok(())
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn neighbors(&self, user_id: &str, k: usize) -> Result<Vec<Neighbor>> {
        self.snapshot().neighbors(user_id, k)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.snapshot().row_of(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ecoprint_core::{AttributeSpec, ProfileSchema};

    /// Three binary features whose codes equal their values
    pub(crate) fn toy_encoder() -> Arc<FeatureEncoder> {
        let schema = ProfileSchema::new(vec![
            AttributeSpec::categorical("f1", ["0", "1"]),
            AttributeSpec::categorical("f2", ["0", "1"]),
            AttributeSpec::categorical("f3", ["0", "1"]),
        ]);
        Arc::new(FeatureEncoder::new(schema).unwrap())
    }

    pub(crate) fn toy_profile(id: &str, values: [f64; 3]) -> UserProfile {
        UserProfile::new(id)
            .with("f1", values[0])
            .with("f2", values[1])
            .with("f3", values[2])
    }

    fn abc_index() -> UserSimilarityIndex {
        let index = UserSimilarityIndex::new(toy_encoder());
        index
            .rebuild(&[
                toy_profile("A", [1.0, 0.0, 0.0]),
                toy_profile("B", [1.0, 0.0, 1.0]),
                toy_profile("C", [0.0, 1.0, 1.0]),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_neighbors_rank_shared_dimensions_first() {
        let index = abc_index();
        let neighbors = index.neighbors("A", 2).unwrap();

        let ids: Vec<&str> = neighbors.iter().map(|n| n.user_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert!((neighbors[0].similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(neighbors[1].similarity, 0.0);
    }

    #[test]
    fn test_neighbors_bounds() {
        let index = abc_index();
        for user in ["A", "B", "C"] {
            for k in 0..5 {
                let neighbors = index.neighbors(user, k).unwrap();
                assert!(neighbors.len() <= k);
                assert!(neighbors.len() <= 2);
                assert!(neighbors.iter().all(|n| n.user_id != user));
            }
        }
    }

    #[test]
    fn test_matrix_symmetric_with_unit_diagonal() {
        let index = abc_index();
        let snapshot = index.snapshot();
        for i in 0..snapshot.len() {
            assert_eq!(snapshot.similarity(i, i), Some(1.0));
            for j in 0..snapshot.len() {
                assert_eq!(snapshot.similarity(i, j), snapshot.similarity(j, i));
            }
        }
        assert_eq!(snapshot.similarity(0, 3), None);
    }

    #[test]
    fn test_ties_broken_by_row() {
        let index = UserSimilarityIndex::new(toy_encoder());
        index
            .rebuild(&[
                toy_profile("target", [1.0, 1.0, 0.0]),
                toy_profile("x", [1.0, 0.0, 0.0]),
                toy_profile("y", [0.0, 1.0, 0.0]),
                toy_profile("z", [1.0, 0.0, 0.0]),
            ])
            .unwrap();

        let ids: Vec<String> = index
            .neighbors("target", 3)
            .unwrap()
            .into_iter()
            .map(|n| n.user_id)
            .collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_empty_index() {
        let index = UserSimilarityIndex::new(toy_encoder());
        assert!(index.is_empty());
        assert!(matches!(index.neighbors("A", 3), Err(Error::UserNotIndexed(_))));

        index.rebuild(&[]).unwrap();
        assert!(matches!(index.neighbors("A", 3), Err(Error::UserNotIndexed(_))));
    }

    #[test]
    fn test_single_user_has_no_neighbors() {
        let index = UserSimilarityIndex::new(toy_encoder());
        index.rebuild(&[toy_profile("A", [1.0, 0.0, 0.0])]).unwrap();
        assert!(index.neighbors("A", 5).unwrap().is_empty());
    }

    #[test]
    fn test_zero_vector_similarity_is_zero() {
        let index = UserSimilarityIndex::new(toy_encoder());
        index
            .rebuild(&[toy_profile("Z", [0.0, 0.0, 0.0]), toy_profile("A", [1.0, 0.0, 0.0])])
            .unwrap();
        let snapshot = index.snapshot();
        assert_eq!(snapshot.similarity(0, 1), Some(0.0));
        assert_eq!(snapshot.similarity(0, 0), Some(1.0));
    }

    #[test]
    fn test_rows_in_first_seen_order_and_duplicates_replace() {
        let index = UserSimilarityIndex::new(toy_encoder());
        index
            .rebuild(&[
                toy_profile("B", [1.0, 0.0, 0.0]),
                toy_profile("A", [1.0, 0.0, 0.0]),
                toy_profile("B", [0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.row_of("B"), Some(0));
        assert_eq!(snapshot.row_of("A"), Some(1));
        assert_eq!(snapshot.vector("B").unwrap().as_slice(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rebuild_replaces_snapshot() {
        let index = abc_index();
        let before = index.snapshot();
        assert_eq!(before.generation(), 1);

        index.rebuild(&[toy_profile("D", [1.0, 1.0, 1.0])]).unwrap();
        assert_eq!(index.generation(), 2);
        assert!(!index.contains("A"));
        assert!(index.contains("D"));

        // Readers holding the old snapshot keep a consistent view
        assert_eq!(before.len(), 3);
        assert_eq!(before.neighbors("A", 1).unwrap()[0].user_id, "B");
    }

    #[test]
    fn test_aborted_rebuild_keeps_published_snapshot() {
        let index = abc_index();
        let abort = AtomicBool::new(true);

        let result = index.rebuild_with_abort(&[toy_profile("D", [1.0, 1.0, 1.0])], &abort);
        assert!(matches!(result, Err(Error::RebuildAborted)));
        assert_eq!(index.generation(), 1);
        assert!(index.contains("A"));
        assert!(!index.contains("D"));
    }

    #[test]
    fn test_uninitialized_encoder_fails_rebuild() {
        let index = UserSimilarityIndex::new(Arc::new(FeatureEncoder::default()));
        assert!(matches!(
            index.rebuild(&[toy_profile("A", [1.0, 0.0, 0.0])]),
            Err(Error::SchemaUndefined)
        ));
    }

    fn grocery_encoder() -> Arc<FeatureEncoder> {
        let schema = ProfileSchema::new(vec![
            AttributeSpec::categorical("diet", ["Vegan", "Omnivore"]),
            AttributeSpec::numeric("grocery"),
        ]);
        Arc::new(FeatureEncoder::new(schema).unwrap())
    }

    fn grocery_batch() -> Vec<UserProfile> {
        vec![
            UserProfile::new("a").with("diet", "Omnivore").with("grocery", 100.0),
            UserProfile::new("b").with("diet", "Omnivore").with("grocery", 300.0),
        ]
    }

    #[test]
    fn test_empty_rebuild_does_not_fix_scaler() {
        let encoder = grocery_encoder();
        let index = UserSimilarityIndex::new(encoder.clone());

        index.rebuild(&[]).unwrap();
        assert!(encoder.scaler().is_none());

        index.rebuild(&grocery_batch()).unwrap();
        let params = encoder.scaler().unwrap().params(1).unwrap();
        assert_eq!(params.mean, 200.0);
        assert_eq!(params.std, 100.0);

        let snapshot = index.snapshot();
        assert_eq!(snapshot.vector("a").unwrap().get(1), Some(-1.0));
        assert_eq!(snapshot.vector("b").unwrap().get(1), Some(1.0));
    }

    #[test]
    fn test_aborted_rebuild_does_not_fix_scaler() {
        let encoder = grocery_encoder();
        let index = UserSimilarityIndex::new(encoder.clone());

        let abort = AtomicBool::new(true);
        assert!(index.rebuild_with_abort(&grocery_batch(), &abort).is_err());
        assert!(encoder.scaler().is_none());

        index
            .rebuild(&[UserProfile::new("c").with("grocery", 50.0), UserProfile::new("d").with("grocery", 150.0)])
            .unwrap();
        assert_eq!(encoder.scaler().unwrap().params(1).unwrap().mean, 100.0);
    }
}
