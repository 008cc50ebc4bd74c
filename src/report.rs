//! Text and Markdown rendering of a [`ResultMatrix`].
//!
//! Cells without recorded accesses are always printed as "no data" / `N/A`
//! so that coverage gaps stay visible.

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use crate::{
    collect::{CellResult, ResultMatrix},
    stats::{BlockUsage, SetUsage},
    vcd::SignalEvent,
};

const BAR_WIDTH: u64 = 20;
const NAME_WIDTH: usize = 12;
pub const REPORT_FILE: &str = "cache_analysis_report.md";

/// `0`-`9` relative to the busiest set, `X` once the scale saturates.
pub fn intensity_marker(count: u64, max: u64) -> char {
    if max == 0 {
        return '0';
    }
    let intensity = count * 10 / max;
    char::from_digit(intensity as u32, 10)
        .filter(|_| intensity < 10)
        .unwrap_or('X')
}

fn bar(count: u64, max: u64) -> String {
    let unit = (max / BAR_WIDTH).max(1);
    "█".repeat((count / unit).min(BAR_WIDTH) as usize)
}

fn na<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn short_name(name: &str) -> String {
    name.chars().take(NAME_WIDTH).collect()
}

pub fn render_heatmap(label: &str, usage: &SetUsage, num_sets: usize) -> String {
    let mut out = format!("=== {label} Cache Set Usage ===\n");
    if usage.is_empty() {
        out.push_str("No cache access data found\n");
        return out;
    }
    let max = usage.max();
    out.push_str("Set  Usage  Heatmap\n");
    out.push_str("---  -----  -------\n");
    for set in 0..num_sets {
        let count = usage.get(set);
        let line = format!(
            " {set:2}   {count:4}  {} {}",
            intensity_marker(count, max),
            bar(count, max)
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&render_summary(usage, num_sets));
    out
}

pub fn render_summary(usage: &SetUsage, num_sets: usize) -> String {
    let total = usage.total();
    let used = usage.touched_sets();
    let mut out = String::from("Summary:\n");
    out.push_str(&format!("- Total accesses: {total}\n"));
    out.push_str(&format!(
        "- Sets used: {used}/{num_sets} ({:.1}%)\n",
        used as f64 / num_sets.max(1) as f64 * 100.0
    ));
    out.push_str(&format!("- Max accesses per set: {}\n", usage.max()));
    out.push_str(&format!(
        "- Average per used set: {:.1}\n",
        total as f64 / used.max(1) as f64
    ));
    out
}

/// Set × way grid of block accesses; `.` marks a block never touched.
pub fn render_block_map(label: &str, blocks: &BlockUsage, num_sets: usize, ways: usize) -> String {
    let mut out = format!("=== {label} Block Usage (set x way) ===\n");
    let max = blocks.max();
    let header: String = (0..ways).map(|way| format!("{}", way % 10)).collect();
    out.push_str(&format!("Set  {header}\n"));
    for set in 0..num_sets {
        let row: String = (0..ways)
            .map(|way| match blocks.get(set, way) {
                0 => '.',
                count => intensity_marker(count, max),
            })
            .collect();
        out.push_str(&format!(" {set:2}  {row}\n"));
    }
    out
}

/// One row per set, one column per configuration of `test`.
pub fn render_cross_table(matrix: &ResultMatrix, test: &str) -> String {
    let cells: Vec<&CellResult> = matrix.row(test).collect();
    let header: Vec<String> = cells
        .iter()
        .map(|c| format!("{:>NAME_WIDTH$}", short_name(&c.config)))
        .collect();
    let rule = vec!["-".repeat(NAME_WIDTH); cells.len()];
    let mut out = format!("Set   {}\n---   {}\n", header.join("  "), rule.join("  "));
    for set in 0..matrix.geometry().num_sets {
        let row: Vec<String> = cells
            .iter()
            .map(|c| {
                if c.usage.is_empty() {
                    format!("{:>NAME_WIDTH$}", "N/A")
                } else {
                    format!("{:>NAME_WIDTH$}", c.usage.get(set))
                }
            })
            .collect();
        out.push_str(&format!(" {set:2}   {}\n", row.join("  ")));
    }
    out
}

/// Heatmap of every configuration of `test` followed by the cross table.
pub fn render_set_report(matrix: &ResultMatrix, test: &str) -> String {
    let geometry = matrix.geometry();
    let mut out = String::new();
    for cell in matrix.row(test) {
        out.push_str(&render_heatmap(&cell.config, &cell.usage, geometry.num_sets));
        out.push('\n');
        if !cell.blocks.is_empty() {
            out.push_str(&render_block_map(
                &cell.config,
                &cell.blocks,
                geometry.num_sets,
                geometry.ways,
            ));
            out.push('\n');
        }
    }
    out.push_str(&format!("CROSS-CONFIGURATION COMPARISON ({test})\n"));
    out.push_str(&render_cross_table(matrix, test));
    out
}

/// Value changes of one signal, reduced to what the report shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineSummary {
    pub signal: String,
    /// The waveform file did not exist.
    pub missing: bool,
    pub records: u64,
    pub asserted: u64,
    pub first: Option<u64>,
    pub last: Option<u64>,
    pub distribution: BTreeMap<String, u64>,
}

impl TimelineSummary {
    pub fn from_events(signal: &str, events: impl IntoIterator<Item = SignalEvent>) -> Self {
        let mut summary = Self {
            signal: signal.to_string(),
            ..Self::default()
        };
        for event in events {
            summary.records += 1;
            if event.value.is_asserted() {
                summary.asserted += 1;
            }
            summary.first.get_or_insert(event.timestamp);
            summary.last = Some(event.timestamp);
            *summary
                .distribution
                .entry(event.value.to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    pub fn missing(signal: &str) -> Self {
        Self {
            signal: signal.to_string(),
            missing: true,
            ..Self::default()
        }
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_hybrid(cell: &CellResult) -> String {
    let s = &cell.stats;
    let mut out = format!("#### Hybrid Mode Analysis ({})\n\n", cell.config);
    out.push_str(&format!("- Mode Switches: {}\n", na(s.mode_switches)));
    out.push_str(&format!("- Set Associative Hits: {}\n", na(s.set_assoc_hits)));
    out.push_str(&format!("- Fully Associative Hits: {}\n", na(s.full_assoc_hits)));
    out.push_str(&format!(
        "- Time in Set Associative Mode: {} cycles\n",
        na(s.set_assoc_time)
    ));
    out.push_str(&format!(
        "- Time in Fully Associative Mode: {} cycles\n\n",
        na(s.full_assoc_time)
    ));
    out
}

fn render_timeline(timeline: &TimelineSummary) -> String {
    let mut out = format!("## Signal Timeline: `{}`\n\n", timeline.signal);
    if timeline.missing {
        out.push_str("Waveform file not found.\n\n");
        return out;
    }
    if timeline.records == 0 {
        out.push_str("No value changes found.\n\n");
        return out;
    }
    out.push_str(&format!("- Value changes: {}\n", timeline.records));
    out.push_str(&format!(
        "- Asserted: {} ({:.2}%)\n",
        timeline.asserted,
        timeline.asserted as f64 / timeline.records as f64 * 100.0
    ));
    out.push_str(&format!("- First change: {}\n", na(timeline.first)));
    out.push_str(&format!("- Last change: {}\n\n", na(timeline.last)));
    out.push_str("| Value | Count |\n|-------|-------|\n");
    for (value, count) in &timeline.distribution {
        out.push_str(&format!("| {value} | {count} |\n"));
    }
    out.push('\n');
    out
}

pub fn render_markdown(matrix: &ResultMatrix, timeline: Option<&TimelineSummary>) -> String {
    let mut out = String::from("# Hybrid Cache Analysis Report\n\n");

    let total = matrix.tests().len() * matrix.configs().len();
    let missing = matrix
        .tests()
        .iter()
        .flat_map(|t| matrix.row(t))
        .filter(|c| !c.has_data())
        .count();
    out.push_str(&format!("Cells without data: {missing} of {total}\n\n"));

    out.push_str("## Performance Summary\n\n");
    for test in matrix.tests() {
        out.push_str(&format!("### {}\n\n", title_case(test)));
        out.push_str("| Configuration | Cycles | Hit Ratio (%) | Hits | Misses |\n");
        out.push_str("|---------------|--------|---------------|------|--------|\n");
        for cell in matrix.row(test) {
            let s = &cell.stats;
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                cell.config,
                na(s.cycles),
                na(s.hit_ratio.map(|r| format!("{r:.2}"))),
                na(s.hits),
                na(s.misses)
            ));
        }
        out.push('\n');

        for cell in matrix.row(test).filter(|c| c.stats.has_hybrid_fields()) {
            out.push_str(&render_hybrid(cell));
        }

        out.push_str("#### Cache Set Usage\n\n```text\n");
        out.push_str(&render_set_report(matrix, test));
        out.push_str("```\n\n---\n\n");
    }

    if let Some(timeline) = timeline {
        out.push_str(&render_timeline(timeline));
    }
    out
}

/// Writes the Markdown report into `out_dir`, creating it if needed.
pub fn write_report(
    matrix: &ResultMatrix,
    out_dir: &Path,
    timeline: Option<&TimelineSummary>,
) -> io::Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(REPORT_FILE);
    fs::write(&path, render_markdown(matrix, timeline))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geometry::CacheGeometry, vcd::SignalValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn markers_scale_to_busiest_set() {
        assert_eq!(intensity_marker(10, 10), 'X');
        assert_eq!(intensity_marker(9, 10), '9');
        assert_eq!(intensity_marker(1, 10), '1');
        assert_eq!(intensity_marker(0, 10), '0');
        assert_eq!(intensity_marker(1, 3), '3');
    }

    #[test]
    fn bars_are_capped() {
        assert_eq!(bar(100, 100).chars().count(), 20);
        assert_eq!(bar(3, 3), "███");
        assert_eq!(bar(0, 50), "");
    }

    #[test]
    fn empty_usage_says_no_data() {
        let text = render_heatmap("WT", &SetUsage::new(), 16);
        assert!(text.contains("No cache access data found"));
    }

    #[test]
    fn heatmap_lists_every_set() {
        let geometry = CacheGeometry::default();
        let usage = SetUsage::from_events([0x10, 0x410].map(|a| geometry.decode(a)));
        let text = render_heatmap("WT", &usage, 16);
        assert!(text.contains("  1      2  X ██\n"));
        assert!(text.contains("  0      0  0\n"));
        assert!(text.contains(" 15      0  0\n"));
        assert!(text.contains("- Sets used: 1/16 ("));
        assert!(text.contains("- Total accesses: 2"));
    }

    #[test]
    fn block_map_marks_untouched_blocks() {
        let mut blocks = BlockUsage::new();
        blocks.record(1, 2);
        blocks.record(1, 2);
        blocks.record(3, 0);
        let text = render_block_map("WT_HYB", &blocks, 4, 4);
        assert_eq!(
            text,
            "=== WT_HYB Block Usage (set x way) ===\n\
             Set  0123\n  \
             0  ....\n  \
             1  ..X.\n  \
             2  ....\n  \
             3  5...\n"
        );
    }

    #[test]
    fn title_case_names() {
        assert_eq!(title_case("cache_thrash"), "Cache Thrash");
        assert_eq!(title_case("hello_WORLD"), "Hello World");
    }

    #[test]
    fn timeline_summary() {
        let events = [(10, 1), (20, 0), (30, 1)].map(|(timestamp, v)| SignalEvent {
            timestamp,
            signal_name: "hit".into(),
            value: SignalValue::Integer(v),
        });
        let summary = TimelineSummary::from_events("hit", events);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.asserted, 2);
        assert_eq!(summary.first, Some(10));
        assert_eq!(summary.last, Some(30));
        assert_eq!(summary.distribution.get("1"), Some(&2));
        assert!(render_timeline(&summary).contains("- Asserted: 2 (66.67%)"));
    }

    #[test]
    fn missing_timeline_is_a_section_not_a_failure() {
        let text = render_timeline(&TimelineSummary::missing("hit"));
        assert_eq!(text, "## Signal Timeline: `hit`\n\nWaveform file not found.\n\n");
    }
}
