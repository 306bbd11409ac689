//! Compare split policies and landmark settings on the same dataset:
//! build-quality statistics and query-time pruning counters.
//!
//! Run with: cargo run --release --example index_diagnostics

use simsearch_rs::{Dataset, IndexConfig, SearchEngine, Series, SplitPolicy};

fn main() {
    let dataset = Dataset::new(
        (0..24)
            .map(|s| {
                let phase = s as f64 * 31.0;
                Series::univariate(
                    (0..2_500)
                        .map(|i| {
                            let t = i as f64 + phase;
                            (t * 0.05).sin() + 0.5 * (t * 0.017).cos() + 0.2 * (t * 0.31).sin()
                        })
                        .collect(),
                )
            })
            .collect(),
    );
    let window = 48;
    let query: Vec<Vec<f64>> = vec![dataset.series(5).channel(0)[700..700 + window].to_vec()];

    println!("Index Diagnostics");
    println!("=================");
    println!(
        "{:<22} {:>7} {:>7} {:>12} {:>10} {:>10}",
        "configuration", "leaves", "height", "leaf margin", "verified", "pruned"
    );

    for (name, policy, landmarks) in [
        ("equal", SplitPolicy::Equal, 0),
        ("range", SplitPolicy::Range, 0),
        ("variance", SplitPolicy::Variance, 0),
        ("variance + landmarks", SplitPolicy::Variance, 4),
    ] {
        let mut config = IndexConfig::new(window).with_split_policy(policy);
        if landmarks > 0 {
            config = config.with_landmarks(landmarks);
        }
        let engine = SearchEngine::build(dataset.clone(), config);
        let build = engine.build_report();
        let (_, report) = engine.knn_with_report(&query, 10);

        println!(
            "{:<22} {:>7} {:>7} {:>12.3} {:>10} {:>10}",
            name,
            build.leaves,
            build.height,
            build.leaf_margin,
            report.verified_offsets,
            report.pass2.nodes_pruned + report.pass2.entries_pruned
        );
    }
}
