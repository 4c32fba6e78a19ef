//! Fitness histogram: binned counts, aggregation, cutoff and MSE
//!
//! Shards report partial histograms each generation; the orchestrator
//! merges them by key-wise addition and derives the selection cutoff and
//! the termination statistics from the merged result. The wire form is a
//! JSON object whose keys are decimal-string bin centers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Histogram of candidates per binned fitness value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histogram {
    bins: BTreeMap<String, u64>,
}

/// Summary statistics over a histogram, for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistSummary {
    /// Number of candidates counted
    pub size: u64,
    /// Highest bin value
    pub max: f64,
    /// Interpolated median bin value
    pub median: f64,
    /// Count-weighted mean bin value
    pub mean: f64,
}

impl Histogram {
    /// Empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bin label for a fitness value at the given granularity
    /// (decimal places).
    pub fn bin_label(fitness: f64, granularity: u32) -> String {
        format!("{fitness:.prec$}", prec = granularity as usize)
    }

    /// Count one candidate at the given fitness.
    pub fn record(&mut self, fitness: f64, granularity: u32) {
        *self
            .bins
            .entry(Self::bin_label(fitness, granularity))
            .or_insert(0) += 1;
    }

    /// Key-wise addition of another (partial) histogram.
    pub fn merge(&mut self, other: &Histogram) {
        for (bin, count) in &other.bins {
            *self.bins.entry(bin.clone()).or_insert(0) += count;
        }
    }

    /// Total candidates counted.
    pub fn total(&self) -> u64 {
        self.bins.values().sum()
    }

    /// True when no candidate has been recorded.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bins parsed to f64 and sorted descending by bin value.
    ///
    /// Bins whose label does not parse are skipped; a peer speaking a
    /// different dialect degrades to a smaller histogram, not a crash.
    pub fn bins_desc(&self) -> Vec<(f64, u64)> {
        let mut parsed: Vec<(f64, u64)> = self
            .bins
            .iter()
            .filter_map(|(bin, count)| bin.parse::<f64>().ok().map(|b| (b, *count)))
            .collect();

        parsed.sort_by(|a, b| b.0.total_cmp(&a.0));
        parsed
    }

    /// Mean squared error of the population fitness against the optimum 1.0.
    ///
    /// An empty histogram yields infinity, which never satisfies a
    /// termination threshold.
    pub fn mse(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return f64::INFINITY;
        }

        let sum: f64 = self
            .bins_desc()
            .iter()
            .map(|(bin, count)| *count as f64 * (1.0 - bin).powi(2))
            .sum();

        sum / total as f64
    }

    /// Selection cutoff: walking bins in descending order, the first bin at
    /// which the cumulative fraction of candidates meets or exceeds
    /// `selection_rate`. Ties within the bin are all admitted.
    pub fn fitness_cutoff(&self, selection_rate: f64) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }

        let bins = self.bins_desc();
        let mut cumulative = 0u64;

        for (bin, count) in &bins {
            cumulative += count;
            if cumulative as f64 / total as f64 >= selection_rate {
                return Some(*bin);
            }
        }

        // selection_rate > 1.0 degenerates to admitting everything
        bins.last().map(|(bin, _)| *bin)
    }

    /// Max / median / mean over the binned distribution.
    pub fn summary(&self) -> Option<HistSummary> {
        let bins = self.bins_desc();
        let size: u64 = bins.iter().map(|(_, c)| c).sum();
        if size == 0 {
            return None;
        }

        let max = bins[0].0;
        let mean = bins.iter().map(|(b, c)| b * *c as f64).sum::<f64>() / size as f64;

        // interpolated median over descending bins
        let mid = size as f64 / 2.0;
        let mut median = bins[bins.len() - 1].0;
        let mut cumulative = 0u64;

        for (i, (bin, count)) in bins.iter().enumerate() {
            cumulative += count;
            let cum = cumulative as f64;

            if cum == mid {
                median = *bin;
                break;
            } else if cum > mid {
                if i == 0 {
                    median = *bin;
                } else {
                    let (prev_bin, prev_count) = bins[i - 1];
                    median = (prev_bin * prev_count as f64 + bin * *count as f64)
                        / (prev_count + count) as f64;
                }
                break;
            }
        }

        Some(HistSummary {
            size,
            max,
            median,
            mean,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(entries: &[(&str, u64)]) -> Histogram {
        let mut h = Histogram::new();
        for (bin, count) in entries {
            for _ in 0..*count {
                h.record(bin.parse().unwrap(), 3);
            }
        }
        h
    }

    #[test]
    fn test_record_bins_by_granularity() {
        let mut h = Histogram::new();
        h.record(0.9871, 3);
        h.record(0.98712, 3);
        h.record(0.5, 3);

        // the first two land in the same three-decimal bin
        assert_eq!(h.total(), 3);
        assert_eq!(h.bins_desc(), vec![(0.987, 2), (0.5, 1)]);
    }

    #[test]
    fn test_merge_adds_key_wise() {
        let mut a = hist(&[("0.900", 2), ("0.500", 1)]);
        let b = hist(&[("0.900", 3), ("0.100", 4)]);

        a.merge(&b);

        assert_eq!(a.total(), 10);
        assert_eq!(a.bins_desc(), vec![(0.9, 5), (0.5, 1), (0.1, 4)]);
    }

    #[test]
    fn test_cutoff_is_first_bin_reaching_rate() {
        // 10 candidates: top bin holds 10%, next holds 20%
        let h = hist(&[("0.900", 1), ("0.800", 2), ("0.700", 3), ("0.600", 4)]);

        // 10% of the population is already >= 0.9
        assert_eq!(h.fitness_cutoff(0.10), Some(0.9));
        // 30% needs the 0.8 bin as well
        assert_eq!(h.fitness_cutoff(0.30), Some(0.8));
        // 31% spills into the 0.7 bin; ties within it are all admitted
        assert_eq!(h.fitness_cutoff(0.31), Some(0.7));
    }

    #[test]
    fn test_cutoff_property_strictly_higher_bins() {
        let h = hist(&[("0.900", 5), ("0.700", 5), ("0.300", 10)]);
        let rate = 0.4;
        let cutoff = h.fitness_cutoff(rate).unwrap();

        let total = h.total() as f64;
        let above: u64 = h
            .bins_desc()
            .iter()
            .filter(|(b, _)| *b > cutoff)
            .map(|(_, c)| c)
            .sum();
        let at_or_above: u64 = h
            .bins_desc()
            .iter()
            .filter(|(b, _)| *b >= cutoff)
            .map(|(_, c)| c)
            .sum();

        assert!((above as f64) < rate * total);
        assert!((at_or_above as f64) >= rate * total);
    }

    #[test]
    fn test_cutoff_empty_histogram() {
        assert_eq!(Histogram::new().fitness_cutoff(0.2), None);
    }

    #[test]
    fn test_mse_against_optimum() {
        let h = hist(&[("1.000", 2), ("0.500", 2)]);
        // (2*0 + 2*0.25) / 4
        assert!((h.mse() - 0.125).abs() < 1e-9);

        assert!(Histogram::new().mse().is_infinite());
    }

    #[test]
    fn test_summary_stats() {
        let h = hist(&[("1.000", 1), ("0.500", 3)]);
        let s = h.summary().unwrap();

        assert_eq!(s.size, 4);
        assert_eq!(s.max, 1.0);
        assert!((s.mean - 0.625).abs() < 1e-9);
        // cumulative hits exactly size/2 inside the top bin run
        assert!(s.median <= 1.0 && s.median >= 0.5);
    }

    #[test]
    fn test_wire_format_is_flat_object() {
        let h = hist(&[("0.987", 2)]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"0.987":2}"#);

        let back: Histogram = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
