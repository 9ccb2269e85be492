use riskfold::config::AnalysisConfig;
use riskfold::data::load_survey;
use riskfold::diagnostics::Diagnostic;
use riskfold::pipeline;
use riskfold::report;
use std::fmt::Write as FmtWrite;
use std::fs;
use tempfile::tempdir;

const REQUIRED: [&str; 14] = [
    "q1", "q2", "q3", "q4", "q7", "q28_1", "q28_2", "q28_3", "q28_5", "q29_1", "q29_2", "q29_3",
    "q29_4", "q27_1",
];

/// Writes a synthetic survey CSV: the required columns plus extras supplied
/// by the caller, and a `total_score` column from the given closure.
fn write_survey(
    path: &std::path::Path,
    n: usize,
    extra_headers: &[&str],
    extra_cell: impl Fn(usize, &str) -> String,
    score: impl Fn(usize) -> f64,
) {
    let mut text = String::new();
    for name in REQUIRED {
        text.push_str(name);
        text.push(',');
    }
    for name in extra_headers {
        text.push_str(name);
        text.push(',');
    }
    text.push_str("total_score\n");

    for i in 0..n {
        for (c, _) in REQUIRED.iter().enumerate() {
            // Deterministic pseudo-variation in the 1..=5 answer range.
            let value = 1 + (i * 7 + c * 3) % 5;
            write!(text, "{value},").unwrap();
        }
        for name in extra_headers {
            write!(text, "{},", extra_cell(i, name)).unwrap();
        }
        writeln!(text, "{}", score(i)).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn scan_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.cluster_k_max = 6;
    config.cluster_restarts = 3;
    config.chosen_clusters = 3;
    config
}

#[test]
fn decile_scores_hit_the_documented_thresholds() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survey.csv");
    // Scores 10, 20, ..., 1000: the canonical grid with known quartiles.
    write_survey(&path, 100, &[], |_, _| String::new(), |i| {
        (i as f64 + 1.0) * 10.0
    });

    let frame = load_survey(path.to_str().unwrap(), "total_score", None).unwrap();
    let analysis = pipeline::run(&frame, &scan_config()).unwrap();

    assert_eq!(analysis.labels.high_threshold, 752.5);
    assert_eq!(analysis.labels.low_threshold, 257.5);
    let positives = analysis.labels.binary.iter().filter(|&&b| b == 1.0).count();
    assert_eq!(positives, 25);
    let mut bucket_counts = [0usize; 3];
    for &bucket in &analysis.labels.ordinal {
        bucket_counts[bucket as usize] += 1;
    }
    assert_eq!(bucket_counts, [25, 50, 25]);
}

#[test]
fn comparison_tables_cover_every_variant_attempt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survey.csv");
    write_survey(&path, 80, &[], |_, _| String::new(), |i| {
        100.0 + ((i * 13) % 47) as f64 * 9.0
    });

    let frame = load_survey(path.to_str().unwrap(), "total_score", None).unwrap();
    let analysis = pipeline::run(&frame, &scan_config()).unwrap();
    let tables = report::tables(&analysis).unwrap();

    // Four classification attempts appear whether or not the extreme variant
    // is compiled in; only the status cell differs.
    assert_eq!(tables.classification.height(), 4);
    let status = tables.classification.column("status").unwrap();
    let status = status.str().unwrap();
    let statuses: Vec<&str> = (0..4).map(|i| status.get(i).unwrap()).collect();
    #[cfg(feature = "extreme-boost")]
    assert!(statuses.iter().all(|&s| s == "ok"));
    #[cfg(not(feature = "extreme-boost"))]
    assert_eq!(statuses.iter().filter(|&&s| s == "skipped").count(), 1);

    assert_eq!(tables.regression.height(), 2);
    assert_eq!(tables.assignments.height(), 80);
    assert_eq!(tables.cluster_summary.height(), 3);
    // Tree-based variants contribute ranked importance blocks.
    let rank = tables.importance.column("rank").unwrap();
    let rank = rank.i64().unwrap();
    assert!(rank.into_iter().flatten().all(|r| r >= 1));
}

#[test]
fn split_partitions_are_disjoint_and_exhaustive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survey.csv");
    write_survey(&path, 60, &[], |_, _| String::new(), |i| {
        50.0 + (i % 11) as f64 * 30.0
    });

    let frame = load_survey(path.to_str().unwrap(), "total_score", None).unwrap();
    let analysis = pipeline::run(&frame, &scan_config()).unwrap();

    for split in [&analysis.classification.split, &analysis.regression.split] {
        let mut seen = vec![false; 60];
        for &i in split.train.iter().chain(split.test.iter()) {
            assert!(!seen[i], "index {i} appears twice");
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s), "some index missing from the split");
    }
}

#[test]
fn reruns_reproduce_results_and_seed_changes_move_the_split() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survey.csv");
    write_survey(&path, 70, &[], |_, _| String::new(), |i| {
        200.0 + ((i * 17) % 29) as f64 * 25.0
    });

    let frame = load_survey(path.to_str().unwrap(), "total_score", None).unwrap();
    let config = scan_config();
    let first = pipeline::run(&frame, &config).unwrap();
    let second = pipeline::run(&frame, &config).unwrap();
    assert_eq!(first.classification.split, second.classification.split);
    assert_eq!(
        first.clusters.assignment.assignments,
        second.clusters.assignment.assignments
    );

    let mut reseeded = scan_config();
    reseeded.split_seed = 977;
    let third = pipeline::run(&frame, &reseeded).unwrap();
    assert_ne!(first.classification.split, third.classification.split);
}

#[test]
fn empty_and_free_text_columns_are_dropped_with_diagnostics() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survey.csv");
    // q9_1 is entirely blank; "comments" is free text.
    write_survey(
        &path,
        40,
        &["q9_1", "comments"],
        |i, name| match name {
            "q9_1" => String::new(),
            _ => format!("note {i}"),
        },
        |i| 60.0 + (i % 13) as f64 * 40.0,
    );

    let frame = load_survey(path.to_str().unwrap(), "total_score", None).unwrap();
    // The free-text column never survives ingestion.
    assert!(!frame.has_column("comments"));
    assert!(frame.has_column("q9_1"));

    let analysis = pipeline::run(&frame, &scan_config()).unwrap();
    // The all-missing family member is dropped from the matrix, not imputed.
    assert!(!analysis
        .features
        .feature_names
        .iter()
        .any(|name| name == "q9_1"));
    assert!(analysis
        .diagnostics()
        .any(|d| matches!(d, Diagnostic::EmptyColumn { column } if column == "q9_1")));
    assert_eq!(analysis.features.n_features(), REQUIRED.len());
}

#[test]
fn sparse_answers_are_imputed_rather_than_dropped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("survey.csv");
    // q10_2 answered by every third respondent only.
    write_survey(
        &path,
        45,
        &["q10_2"],
        |i, _| {
            if i % 3 == 0 {
                format!("{}", 1 + i % 4)
            } else {
                String::new()
            }
        },
        |i| 90.0 + (i % 7) as f64 * 55.0,
    );

    let frame = load_survey(path.to_str().unwrap(), "total_score", None).unwrap();
    let analysis = pipeline::run(&frame, &scan_config()).unwrap();

    assert!(analysis
        .features
        .feature_names
        .iter()
        .any(|name| name == "q10_2"));
    assert!(analysis.features.imputed_cells >= 30);
    // Standardized columns are finite everywhere after imputation.
    assert!(analysis.features.standardized.iter().all(|v| v.is_finite()));
}
