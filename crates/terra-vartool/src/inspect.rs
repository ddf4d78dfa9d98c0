//! Human-readable summaries of a variance table.

use std::fmt;

use terra_roam::{VarianceTable, level_offset, total_nodes_for_level};

/// Number of histogram buckets over the 256 `log2_variance` codes.
pub const BUCKETS: usize = 16;

/// Per-level statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelSummary {
    pub level: u8,
    pub nodes: usize,
    /// Nodes recorded with zero displacement.
    pub flat: usize,
    pub mean_log2: f64,
    pub max_log2: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableSummary {
    pub max_level: u8,
    pub entries: usize,
    pub levels: Vec<LevelSummary>,
    /// Counts of non-zero `log2_variance` codes, 16 codes per bucket.
    pub histogram: [usize; BUCKETS],
}

pub fn summarize(table: &VarianceTable) -> TableSummary {
    let entries = table.entries();
    let mut histogram = [0; BUCKETS];
    let levels = (0..=table.max_level())
        .map(|level| {
            let start = level_offset(level);
            let end = total_nodes_for_level(level).min(entries.len());
            let slice = &entries[start.min(end)..end];
            let mut sum = 0u64;
            let mut counted = 0usize;
            let mut max_log2 = 0;
            for entry in slice {
                if entry.log2_variance == 0 {
                    continue;
                }
                histogram[entry.log2_variance as usize / (256 / BUCKETS)] += 1;
                sum += entry.log2_variance as u64;
                counted += 1;
                max_log2 = max_log2.max(entry.log2_variance);
            }
            LevelSummary {
                level,
                nodes: slice.len(),
                flat: slice.len() - counted,
                mean_log2: if counted == 0 {
                    0.0
                } else {
                    sum as f64 / counted as f64
                },
                max_log2,
            }
        })
        .collect();
    TableSummary {
        max_level: table.max_level(),
        entries: entries.len(),
        levels,
        histogram,
    }
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "max level: {}", self.max_level)?;
        writeln!(f, "entries:   {}", self.entries)?;
        writeln!(f)?;
        writeln!(f, "{:>5} {:>9} {:>9} {:>9} {:>5}", "level", "nodes", "flat", "mean", "max")?;
        for l in &self.levels {
            writeln!(
                f,
                "{:>5} {:>9} {:>9} {:>9.2} {:>5}",
                l.level, l.nodes, l.flat, l.mean_log2, l.max_log2
            )?;
        }
        writeln!(f)?;
        let peak = self.histogram.iter().copied().max().unwrap_or(0).max(1);
        let width = 256 / BUCKETS;
        for (i, &count) in self.histogram.iter().enumerate() {
            let bar = "#".repeat(count * 40 / peak);
            writeln!(
                f,
                "{:>3}..{:<3} {:>9} {}",
                i * width,
                (i + 1) * width - 1,
                count,
                bar
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_roam::VarianceEntry;

    fn table() -> VarianceTable {
        let mut entries = vec![VarianceEntry::default(); total_nodes_for_level(1)];
        for (i, e) in entries.iter_mut().enumerate().take(8) {
            e.log2_variance = 100 + i as u8;
        }
        entries[8].log2_variance = 40;
        VarianceTable::new(1, entries).unwrap()
    }

    #[test]
    fn test_summary_per_level() {
        let summary = summarize(&table());
        assert_eq!(summary.entries, 24);
        assert_eq!(summary.levels.len(), 2);

        let roots = &summary.levels[0];
        assert_eq!((roots.nodes, roots.flat, roots.max_log2), (8, 0, 107));
        assert!((roots.mean_log2 - 103.5).abs() < 1e-9);

        let children = &summary.levels[1];
        assert_eq!((children.nodes, children.flat), (16, 15));
        assert_eq!(children.mean_log2, 40.0);
    }

    #[test]
    fn test_histogram_skips_flat_nodes() {
        let summary = summarize(&table());
        assert_eq!(summary.histogram.iter().sum::<usize>(), 9);
        assert_eq!(summary.histogram[2], 1);
        assert_eq!(summary.histogram[6], 8);
    }

    #[test]
    fn test_display_lists_levels() {
        let text = summarize(&table()).to_string();
        assert!(text.contains("max level: 1"));
        assert!(text.contains("entries:   24"));
        assert_eq!(text.lines().filter(|l| l.contains('#')).count(), 2);
    }
}
