//! End-to-end collection over synthetic results directories.

use std::{
    fs,
    path::{Path, PathBuf},
};

use cache_set_analyzer::{
    AnalysisConfig, Collector, SetUsage, SignalValue,
    config::ArtifactTemplates,
    report::{self, render_cross_table, render_markdown},
    stream_vcd_signals,
    trace::LogFile,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const RUN_DIR: &str = "out_2025-05-29/veri-testharness_sim";

fn write(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn log_path(root: &Path, config: &str, test: &str) -> PathBuf {
    root.join(config)
        .join(RUN_DIR)
        .join(format!("{test}.cv32a60x.log"))
}

fn config(tests: &[&str], configs: &[&str]) -> AnalysisConfig {
    AnalysisConfig {
        tests: tests.iter().map(|s| s.to_string()).collect(),
        configs: configs.iter().map(|s| s.to_string()).collect(),
        jobs: Some(4),
        ..AnalysisConfig::default()
    }
}

fn collect(root: &TempDir, config: &AnalysisConfig) -> cache_set_analyzer::ResultMatrix {
    Collector::new(root.path(), config)
        .collect(&config.tests, &config.configs)
        .unwrap()
}

#[test]
fn two_addresses_share_set_one() {
    let root = tempfile::tempdir().unwrap();
    write(
        &log_path(root.path(), "WT", "cache_test"),
        "load 0x00000010\nstore 0x00000410\n",
    );
    let cfg = config(&["cache_test"], &["WT"]);
    let matrix = collect(&root, &cfg);

    let usage = &matrix.get("cache_test", "WT").unwrap().usage;
    assert_eq!(usage.get(1), 2);
    assert_eq!(usage.total(), 2);
    assert!((0..16).filter(|&s| s != 1).all(|s| usage.get(s) == 0));
}

#[test]
fn summary_markers_become_stats() {
    let root = tempfile::tempdir().unwrap();
    write(
        &log_path(root.path(), "WT_HYB", "hello_world"),
        "Cache hits: 75\nCache misses: 25\nFinished after 4000 cycles\nMode switches: 4\n",
    );
    let cfg = config(&["hello_world"], &["WT_HYB"]);
    let matrix = collect(&root, &cfg);

    let stats = &matrix.get("hello_world", "WT_HYB").unwrap().stats;
    assert_eq!(stats.hits, Some(75));
    assert_eq!(stats.misses, Some(25));
    assert_eq!(stats.hit_ratio, Some(75.0));
    assert_eq!(stats.cycles, Some(4000));
    assert_eq!(stats.mode_switches, Some(4));
    assert_eq!(stats.set_assoc_hits, None);
}

#[test]
fn missing_config_directory_is_reported_as_na() {
    let root = tempfile::tempdir().unwrap();
    write(
        &log_path(root.path(), "WT", "cache_test"),
        "Cache hits: 9\nCache misses: 1\nFinished after 100 cycles\naddr: 40\n",
    );
    let cfg = config(&["cache_test"], &["WT", "WT_HYB"]);
    let matrix = collect(&root, &cfg);

    let hybrid = matrix.get("cache_test", "WT_HYB").unwrap();
    assert!(!hybrid.has_data());
    assert!(hybrid.stats.is_unknown());
    assert_eq!(hybrid.usage.total(), 0);

    let markdown = render_markdown(&matrix, None);
    assert!(markdown.contains("| WT | 100 | 90.00 | 9 | 1 |"));
    assert!(markdown.contains("| WT_HYB | N/A | N/A | N/A | N/A |"));
    assert!(markdown.contains("Cells without data: 1 of 2"));

    let table = render_cross_table(&matrix, "cache_test");
    let row_four = table.lines().find(|l| l.starts_with("  4 ")).unwrap();
    assert!(row_four.ends_with("N/A"));
}

#[test]
fn disjoint_set_ranges_are_distinguished() {
    let root = tempfile::tempdir().unwrap();
    // 16-byte lines: set n starts at 0x10 * n
    write(&log_path(root.path(), "X", "t"), "0x00 0x10 0x20 0x20");
    write(&log_path(root.path(), "Y", "t"), "0x80 0x90 0xa0");
    let cfg = config(&["t"], &["X", "Y"]);
    let matrix = collect(&root, &cfg);

    let table = render_cross_table(&matrix, "t");
    let rows: Vec<Vec<&str>> = table
        .lines()
        .skip(2)
        .map(|l| l.split_whitespace().collect())
        .collect();
    assert_eq!(rows.len(), 16);
    for set in [0, 1, 2] {
        assert_ne!(rows[set][1], "0");
        assert_eq!(rows[set][2], "0");
    }
    for set in [8, 9, 10] {
        assert_eq!(rows[set][1], "0");
        assert_ne!(rows[set][2], "0");
    }
    assert_eq!(rows[2], ["2", "2", "0"]);
}

#[test]
fn collection_is_repeatable() {
    let root = tempfile::tempdir().unwrap();
    for (config, text) in [("WT", "0x100 addr: 200"), ("WT_HYB", "address: 0x3f0 0xdeadbeef")] {
        for test in ["a", "b", "c"] {
            write(&log_path(root.path(), config, test), text);
        }
    }
    let cfg = config(&["a", "b", "c"], &["WT", "WT_HYB"]);
    let first = collect(&root, &cfg);
    let second = collect(&root, &cfg);
    for test in &cfg.tests {
        for config in &cfg.configs {
            let (x, y) = (first.get(test, config).unwrap(), second.get(test, config).unwrap());
            assert_eq!(x.usage, y.usage);
            assert_eq!(x.stats, y.stats);
        }
    }
    assert_eq!(render_markdown(&first, None), render_markdown(&second, None));
}

#[test]
fn log_tokens_parse_identically_twice() {
    let log = LogFile::from_text("t.log", "0x10 addr: 20 address: 30 0xZZ");
    let geometry = AnalysisConfig::default().geometry;
    let a: Vec<_> = log.access_events(geometry).collect();
    let b: Vec<_> = log.access_events(geometry).collect();
    assert_eq!(a, b);
    assert_eq!(SetUsage::from_events(a), SetUsage::from_events(b));
}

const HIT_VCD: &str = "\
$timescale 1ps $end
$scope module tb $end
$scope module i_cache $end
$var wire 1 ! hit $end
$var wire 1 \" miss $end
$var wire 1 # fa_mode $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
$dumpvars
0!
0\"
0#
$end
#10
1!
#20
0!
1\"
#25
1#
#30
1!
#40
0#
";

#[test]
fn waveform_stream_yields_hit_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hit.vcd");
    fs::write(&path, HIT_VCD).unwrap();

    let changes: Vec<(u64, SignalValue)> = stream_vcd_signals(&path, "hit")
        .unwrap()
        .filter(|e| e.timestamp > 0)
        .map(|e| (e.timestamp, e.value))
        .collect();
    assert_eq!(
        changes,
        [
            (10, SignalValue::Integer(1)),
            (20, SignalValue::Integer(0)),
            (30, SignalValue::Integer(1)),
        ]
    );
}

#[test]
fn waveform_fills_stats_when_log_is_absent() {
    let root = tempfile::tempdir().unwrap();
    write(
        &root.path().join("WT_HYB").join(RUN_DIR).join("t.cv32a60x.vcd"),
        HIT_VCD,
    );
    let mut cfg = config(&["t"], &["WT_HYB"]);
    cfg.signals.mode = Some("fa_mode".into());
    let matrix = collect(&root, &cfg);

    let cell = matrix.get("t", "WT_HYB").unwrap();
    assert!(cell.has_data());
    assert!(cell.log.is_none());
    assert_eq!(cell.stats.hits, Some(2));
    assert_eq!(cell.stats.misses, Some(1));
    assert_eq!(cell.stats.mode_switches, Some(2));
    assert_eq!(cell.stats.set_assoc_time, Some(25));
    assert_eq!(cell.stats.full_assoc_time, Some(15));
    assert!(render_markdown(&matrix, None).contains("#### Hybrid Mode Analysis (WT_HYB)"));
}

const DCACHE_VCD: &str = "\
$scope module tb $end
$scope module i_wt_dcache_mem $end
$var wire 4 ! rd_idx_i [3:0] $end
$var wire 8 \" rd_hit_oh_o [7:0] $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
$dumpvars
b0000 !
b00000000 \"
$end
#10
b0101 !
b00000010 \"
#20
b00000000 \"
#30
b00001000 \"
#40
b1100 !
b00000001 \"
";

#[test]
fn waveform_index_and_hit_vector_fill_set_usage() {
    let root = tempfile::tempdir().unwrap();
    write(
        &root.path().join("WT").join(RUN_DIR).join("t.cv32a60x.vcd"),
        DCACHE_VCD,
    );
    let cfg = config(&["t"], &["WT"]);
    let matrix = collect(&root, &cfg);

    let cell = matrix.get("t", "WT").unwrap();
    assert_eq!(cell.usage.get(5), 2);
    assert_eq!(cell.usage.get(12), 1);
    assert_eq!(cell.usage.total(), 3);
    assert_eq!(cell.blocks.get(5, 1), 1);
    assert_eq!(cell.blocks.get(5, 3), 1);
    assert_eq!(cell.blocks.get(12, 0), 1);

    let text = report::render_set_report(&matrix, "t");
    assert!(!text.contains("No cache access data found"));
    assert!(text.contains("=== WT Block Usage (set x way) ==="));
}

#[test]
fn log_addresses_win_over_waveform_usage() {
    let root = tempfile::tempdir().unwrap();
    let run = root.path().join("WT").join(RUN_DIR);
    write(&run.join("t.cv32a60x.vcd"), DCACHE_VCD);
    write(&run.join("t.cv32a60x.log"), "0x20");
    let cfg = config(&["t"], &["WT"]);
    let matrix = collect(&root, &cfg);

    let cell = matrix.get("t", "WT").unwrap();
    assert_eq!(cell.usage.get(2), 1);
    assert_eq!(cell.usage.total(), 1);
    assert_eq!(cell.blocks.total(), 3);
}

#[test]
fn custom_templates_with_wildcard_run_ids() {
    let root = tempfile::tempdir().unwrap();
    write(
        &root.path().join("WT/simulation_artifacts/run_42/matrix.trace.txt"),
        "0x30",
    );
    let mut cfg = config(&["matrix"], &["WT"]);
    cfg.artifacts = ArtifactTemplates {
        logs: vec!["simulation_artifacts/run_*/{test}.trace.*".into()],
        waveforms: vec![],
    };
    let matrix = collect(&root, &cfg);
    assert_eq!(matrix.get("matrix", "WT").unwrap().usage.get(3), 1);
}

#[test]
fn report_is_written_even_without_data() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let cfg = config(&["hello_world"], &["WT", "WT_HYB"]);
    let matrix = collect(&root, &cfg);

    let path = report::write_report(&matrix, &out.path().join("report"), None).unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("### Hello World"));
    assert!(text.contains("=== WT Cache Set Usage ===\nNo cache access data found"));
    assert!(text.contains("Cells without data: 2 of 2"));
}
