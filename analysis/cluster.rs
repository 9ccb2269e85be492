// analysis/cluster.rs

//! # Respondent Segmentation
//!
//! Unsupervised segmentation of the standardized feature matrix with seeded
//! k-means. The module scans a configured range of cluster counts, scores
//! each candidate by mean silhouette, and then fits the configured final
//! count regardless of which candidate scored best, so the scan is advisory
//! and the reported segmentation is stable across study waves.
//!
//! Every stochastic step is seeded. A restart r of the Lloyd loop draws its
//! generator from `seed + r`, and the best restart by inertia wins, so two
//! runs with one configuration produce byte-identical assignments.
//!
//! Silhouette is the classic `(b - a) / max(a, b)` per point, averaged over
//! the sample; a singleton cluster contributes zero for its lone member. A
//! candidate count whose assignment collapses below two populated clusters
//! cannot be scored and is recorded as a diagnostic instead of a candidate.

use crate::config::AnalysisConfig;
use crate::diagnostics::Diagnostic;
use crate::features::FeatureMatrix;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

const MAX_ITERATIONS: usize = 300;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cannot cluster an empty matrix.")]
    EmptyInput,
    #[error(
        "Requested {k} clusters but only {rows} records are available. \
         Lower the configured cluster count below the sample size."
    )]
    TooManyClusters { k: usize, rows: usize },
    #[error("Feature matrix has {rows} rows but the outcome vector has {outcome}.")]
    LengthMismatch { rows: usize, outcome: usize },
}

/// One fitted k-means solution.
#[derive(Debug, Clone)]
pub struct ClusterAssignment {
    /// Cluster index per record, in row order.
    pub assignments: Vec<usize>,
    /// `k x n_features` centroid matrix in standardized space.
    pub centroids: Array2<f64>,
    /// Sum of squared distances from each record to its centroid.
    pub inertia: f64,
}

/// Scan result for one candidate cluster count.
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub k: usize,
    pub inertia: f64,
    pub silhouette: f64,
}

/// The silhouette scan and the count it favored.
#[derive(Debug, Clone)]
pub struct ClusterSelection {
    pub candidates: Vec<CandidateScore>,
    /// Count with the highest silhouette; `None` when no candidate could be
    /// scored.
    pub best_k: Option<usize>,
    /// The count actually fitted for reporting.
    pub chosen_k: usize,
}

/// Descriptive statistics for one final cluster, on the raw feature scale.
#[derive(Debug, Clone)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub share: f64,
    pub outcome_mean: f64,
    pub outcome_std: f64,
    pub feature_means: Vec<(String, f64)>,
}

#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub selection: ClusterSelection,
    pub assignment: ClusterAssignment,
    pub profiles: Vec<ClusterProfile>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Scans cluster counts, fits the configured count, and profiles the result.
pub fn segment(
    matrix: &FeatureMatrix,
    outcome: ArrayView1<f64>,
    config: &AnalysisConfig,
) -> Result<ClusterOutcome, ClusterError> {
    let x = matrix.standardized.view();
    let n = x.nrows();
    if n != outcome.len() {
        return Err(ClusterError::LengthMismatch {
            rows: n,
            outcome: outcome.len(),
        });
    }

    let mut candidates = Vec::new();
    let mut diagnostics = Vec::new();
    for k in config.cluster_k_min..=config.cluster_k_max {
        if k > n {
            log::warn!("skipping k={k}: only {n} records");
            continue;
        }
        let fitted = fit_kmeans(x, k, config.cluster_restarts, config.cluster_seed)?;
        match internal::silhouette(x, &fitted.assignments, k) {
            Ok(score) => {
                log::info!(
                    "k={k}: inertia {:.4}, mean silhouette {score:.4}",
                    fitted.inertia
                );
                candidates.push(CandidateScore {
                    k,
                    inertia: fitted.inertia,
                    silhouette: score,
                });
            }
            Err(reason) => {
                log::warn!("k={k}: silhouette unavailable ({reason})");
                diagnostics.push(Diagnostic::SilhouetteFailed { k, reason });
            }
        }
    }

    // Strictly-greater comparison keeps the smallest count on ties.
    let mut best_k = None;
    let mut best_score = f64::NEG_INFINITY;
    for candidate in &candidates {
        if candidate.silhouette > best_score {
            best_score = candidate.silhouette;
            best_k = Some(candidate.k);
        }
    }

    let chosen_k = config.chosen_clusters;
    let assignment = fit_kmeans(x, chosen_k, config.cluster_restarts, config.cluster_seed)?;
    if let Some(best) = best_k {
        if best != chosen_k {
            log::info!(
                "silhouette favors k={best}, reporting the configured k={chosen_k} segmentation"
            );
        }
    }

    let profiles =
        internal::profile_clusters(matrix, outcome, &assignment.assignments, chosen_k, config);

    Ok(ClusterOutcome {
        selection: ClusterSelection {
            candidates,
            best_k,
            chosen_k,
        },
        assignment,
        profiles,
        diagnostics,
    })
}

/// Fits k-means with `restarts` independent seeded initializations and keeps
/// the solution with the lowest inertia.
pub fn fit_kmeans(
    x: ArrayView2<f64>,
    k: usize,
    restarts: usize,
    seed: u64,
) -> Result<ClusterAssignment, ClusterError> {
    let n = x.nrows();
    if n == 0 {
        return Err(ClusterError::EmptyInput);
    }
    if k > n {
        return Err(ClusterError::TooManyClusters { k, rows: n });
    }

    let mut best: Option<ClusterAssignment> = None;
    for restart in 0..restarts.max(1) {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(restart as u64));
        let candidate = internal::kmeans_once(x, k, &mut rng);
        let replace = match &best {
            Some(current) => candidate.inertia < current.inertia,
            None => true,
        };
        if replace {
            best = Some(candidate);
        }
    }
    // restarts.max(1) guarantees at least one solution.
    best.ok_or(ClusterError::EmptyInput)
}

mod internal {
    use super::*;

    /// One Lloyd run from a k-means++ initialization.
    pub(super) fn kmeans_once(x: ArrayView2<f64>, k: usize, rng: &mut StdRng) -> ClusterAssignment {
        let n = x.nrows();
        let mut centroids = plus_plus_init(x, k, rng);
        let mut assignments = vec![0usize; n];

        for _ in 0..MAX_ITERATIONS {
            let mut changed = false;
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                let nearest = nearest_centroid(row, centroids.view());
                if assignments[i] != nearest {
                    assignments[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = Array2::<f64>::zeros((k, x.ncols()));
            let mut counts = vec![0usize; k];
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                let cluster = assignments[i];
                counts[cluster] += 1;
                let mut target = sums.row_mut(cluster);
                target += &row;
            }
            for cluster in 0..k {
                // An emptied cluster keeps its previous centroid.
                if counts[cluster] > 0 {
                    let mut row = centroids.row_mut(cluster);
                    row.assign(&sums.row(cluster));
                    row /= counts[cluster] as f64;
                }
            }
        }

        let inertia = x
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, row)| squared_distance(row, centroids.row(assignments[i])))
            .sum();

        ClusterAssignment {
            assignments,
            centroids,
            inertia,
        }
    }

    /// k-means++ seeding: first centroid uniform, the rest drawn with
    /// probability proportional to squared distance from the nearest chosen
    /// centroid.
    fn plus_plus_init(x: ArrayView2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
        let n = x.nrows();
        let mut centroids = Array2::<f64>::zeros((k, x.ncols()));
        let first = rng.gen_range(0..n);
        centroids.row_mut(0).assign(&x.row(first));

        let mut min_distances = vec![f64::MAX; n];
        for next in 1..k {
            let last = centroids.row(next - 1);
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                let dist = squared_distance(row, last);
                if dist < min_distances[i] {
                    min_distances[i] = dist;
                }
            }
            let total: f64 = min_distances.iter().sum();
            let pick = if total > 0.0 {
                match WeightedIndex::new(&min_distances) {
                    Ok(weights) => weights.sample(rng),
                    Err(_) => rng.gen_range(0..n),
                }
            } else {
                // Every record coincides with a chosen centroid; any index
                // yields the same degenerate geometry.
                rng.gen_range(0..n)
            };
            centroids.row_mut(next).assign(&x.row(pick));
        }
        centroids
    }

    fn nearest_centroid(row: ArrayView1<f64>, centroids: ArrayView2<f64>) -> usize {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (cluster, centroid) in centroids.axis_iter(Axis(0)).enumerate() {
            let dist = squared_distance(row, centroid);
            if dist < best_dist {
                best_dist = dist;
                best = cluster;
            }
        }
        best
    }

    pub(super) fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }

    /// Mean silhouette over all records. Needs at least two populated
    /// clusters; a singleton's member scores zero.
    pub(super) fn silhouette(
        x: ArrayView2<f64>,
        assignments: &[usize],
        k: usize,
    ) -> Result<f64, String> {
        let n = x.nrows();
        let mut counts = vec![0usize; k];
        for &cluster in assignments {
            counts[cluster] += 1;
        }
        let populated = counts.iter().filter(|&&c| c > 0).count();
        if populated < 2 {
            return Err(format!(
                "only {populated} populated cluster(s); silhouette needs at least two"
            ));
        }

        let mut total = 0.0;
        for i in 0..n {
            let own = assignments[i];
            if counts[own] == 1 {
                continue; // singleton contributes zero
            }
            let mut sums = vec![0.0; k];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let dist = squared_distance(x.row(i), x.row(j)).sqrt();
                sums[assignments[j]] += dist;
            }
            let a = sums[own] / (counts[own] - 1) as f64;
            let mut b = f64::MAX;
            for cluster in 0..k {
                if cluster != own && counts[cluster] > 0 {
                    let mean = sums[cluster] / counts[cluster] as f64;
                    if mean < b {
                        b = mean;
                    }
                }
            }
            let denom = a.max(b);
            if denom > 0.0 {
                total += (b - a) / denom;
            }
        }
        Ok(total / n as f64)
    }

    /// Raw-scale descriptive statistics per final cluster.
    pub(super) fn profile_clusters(
        matrix: &FeatureMatrix,
        outcome: ArrayView1<f64>,
        assignments: &[usize],
        k: usize,
        config: &AnalysisConfig,
    ) -> Vec<ClusterProfile> {
        let n = assignments.len();
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (i, &cluster) in assignments.iter().enumerate() {
            members[cluster].push(i);
        }

        let profile_columns: Vec<(String, usize)> = config
            .profile_features
            .iter()
            .filter_map(|name| match matrix.feature_index(name) {
                Some(index) => Some((name.clone(), index)),
                None => {
                    log::warn!("profile feature '{name}' is not in the feature matrix; skipping");
                    None
                }
            })
            .collect();

        members
            .into_iter()
            .enumerate()
            .map(|(cluster, indices)| {
                let size = indices.len();
                if size == 0 {
                    log::warn!("cluster {cluster} is empty in the final segmentation");
                    return ClusterProfile {
                        cluster,
                        size: 0,
                        share: 0.0,
                        outcome_mean: 0.0,
                        outcome_std: 0.0,
                        feature_means: profile_columns
                            .iter()
                            .map(|(name, _)| (name.clone(), 0.0))
                            .collect(),
                    };
                }
                let scores: Vec<f64> = indices.iter().map(|&i| outcome[i]).collect();
                let mean = scores.iter().sum::<f64>() / size as f64;
                let variance =
                    scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / size as f64;
                let feature_means = profile_columns
                    .iter()
                    .map(|(name, column)| {
                        let sum: f64 = indices.iter().map(|&i| matrix.raw[[i, *column]]).sum();
                        (name.clone(), sum / size as f64)
                    })
                    .collect();
                ClusterProfile {
                    cluster,
                    size,
                    share: size as f64 / n as f64,
                    outcome_mean: mean,
                    outcome_std: variance.sqrt(),
                    feature_means,
                }
            })
            .collect()
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array1;

    /// Two tight blobs around (0,0) and (10,10), twenty points each.
    fn two_blobs() -> Array2<f64> {
        let mut x = Array2::zeros((40, 2));
        for i in 0..20 {
            let jitter = (i as f64) * 0.01;
            x[[i, 0]] = jitter;
            x[[i, 1]] = -jitter;
            x[[20 + i, 0]] = 10.0 + jitter;
            x[[20 + i, 1]] = 10.0 - jitter;
        }
        x
    }

    fn matrix_from(x: Array2<f64>, names: &[&str]) -> FeatureMatrix {
        let columns = x.ncols();
        FeatureMatrix {
            feature_names: names.iter().map(|n| n.to_string()).collect(),
            standardized: x.clone(),
            raw: x,
            means: Array1::zeros(columns),
            scales: Array1::ones(columns),
            imputed_cells: 0,
        }
    }

    #[test]
    fn two_separated_blobs_are_recovered_exactly() {
        let x = two_blobs();
        let fitted = fit_kmeans(x.view(), 2, 10, 42).unwrap();
        let first = fitted.assignments[0];
        assert!(fitted.assignments[..20].iter().all(|&c| c == first));
        assert!(fitted.assignments[20..].iter().all(|&c| c != first));
        // Within-blob spread is tiny relative to the blob separation.
        assert!(fitted.inertia < 1.0, "inertia {} too high", fitted.inertia);
    }

    #[test]
    fn identical_seeds_give_identical_solutions() {
        let x = two_blobs();
        let a = fit_kmeans(x.view(), 3, 10, 7).unwrap();
        let b = fit_kmeans(x.view(), 3, 10, 7).unwrap();
        assert_eq!(a.assignments, b.assignments);
        assert_abs_diff_eq!(a.inertia, b.inertia, epsilon = 0.0);
    }

    #[test]
    fn more_clusters_than_records_is_rejected() {
        let x = Array2::<f64>::zeros((5, 2));
        let err = fit_kmeans(x.view(), 10, 3, 1).unwrap_err();
        assert!(matches!(
            err,
            ClusterError::TooManyClusters { k: 10, rows: 5 }
        ));
    }

    #[test]
    fn silhouette_scan_favors_the_true_count() {
        // Three blobs far apart; silhouette must peak at k=3.
        let mut x = Array2::zeros((60, 2));
        for i in 0..20 {
            let jitter = (i as f64) * 0.005;
            x[[i, 0]] = jitter;
            x[[20 + i, 0]] = 20.0 + jitter;
            x[[40 + i, 0]] = 40.0 + jitter;
            x[[i, 1]] = jitter;
            x[[20 + i, 1]] = jitter;
            x[[40 + i, 1]] = jitter;
        }
        let matrix = matrix_from(x, &["f0", "f1"]);
        let outcome = Array1::zeros(60);
        let mut config = AnalysisConfig::default();
        config.cluster_k_min = 2;
        config.cluster_k_max = 6;
        config.chosen_clusters = 3;
        config.profile_features = vec!["f0".to_string()];

        let result = segment(&matrix, outcome.view(), &config).unwrap();
        assert_eq!(result.selection.best_k, Some(3));
        assert_eq!(result.selection.chosen_k, 3);
        let winner = result
            .selection
            .candidates
            .iter()
            .find(|c| c.k == 3)
            .unwrap();
        assert!(winner.silhouette > 0.5, "silhouette {}", winner.silhouette);
        for pair in result.selection.candidates.windows(2) {
            assert!(
                pair[1].inertia <= pair[0].inertia,
                "inertia rose from k={} to k={}",
                pair[0].k,
                pair[1].k
            );
        }
        assert_eq!(result.profiles.len(), 3);
        let share_total: f64 = result.profiles.iter().map(|p| p.share).sum();
        assert_abs_diff_eq!(share_total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_geometry_records_silhouette_diagnostics() {
        // Every record identical: every candidate collapses to one populated
        // cluster and cannot be scored.
        let x = Array2::<f64>::zeros((10, 2));
        let matrix = matrix_from(x, &["f0", "f1"]);
        let outcome = Array1::from_elem(10, 5.0);
        let mut config = AnalysisConfig::default();
        config.cluster_k_min = 2;
        config.cluster_k_max = 3;
        config.chosen_clusters = 2;
        config.profile_features = vec!["f0".to_string()];

        let result = segment(&matrix, outcome.view(), &config).unwrap();
        assert_eq!(result.selection.best_k, None);
        assert!(result.selection.candidates.is_empty());
        assert_eq!(result.diagnostics.len(), 2);
        assert!(result
            .diagnostics
            .iter()
            .all(|d| matches!(d, Diagnostic::SilhouetteFailed { .. })));
        // The populated cluster carries every record and the flat outcome.
        let populated = result.profiles.iter().find(|p| p.size == 10).unwrap();
        assert_abs_diff_eq!(populated.outcome_mean, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(populated.outcome_std, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn profiles_average_raw_values_not_standardized_ones() {
        let standardized = two_blobs();
        // Raw copy shifted by 100 so the two scales cannot be confused.
        let raw = &standardized + 100.0;
        let matrix = FeatureMatrix {
            feature_names: vec!["q2".to_string(), "q1".to_string()],
            standardized,
            raw,
            means: Array1::zeros(2),
            scales: Array1::ones(2),
            imputed_cells: 0,
        };
        let outcome = Array1::from_shape_fn(40, |i| if i < 20 { 10.0 } else { 30.0 });
        let mut config = AnalysisConfig::default();
        config.cluster_k_min = 2;
        config.cluster_k_max = 2;
        config.chosen_clusters = 2;
        config.profile_features = vec!["q2".to_string()];

        let result = segment(&matrix, outcome.view(), &config).unwrap();
        for profile in &result.profiles {
            assert_eq!(profile.size, 20);
            let (ref name, mean) = profile.feature_means[0];
            assert_eq!(name, "q2");
            // Blob one has raw q2 near 100, blob two near 110.
            assert!(
                (99.0..101.0).contains(&mean) || (109.0..111.0).contains(&mean),
                "unexpected raw mean {mean}"
            );
            assert!(
                (profile.outcome_mean - 10.0).abs() < 1e-9
                    || (profile.outcome_mean - 30.0).abs() < 1e-9
            );
        }
    }
}
