use crate::core::aggregate::StatsTable;
use crate::core::error::{AnalysisError, Result};
use crate::core::model::GeneStats;
use std::cmp::Ordering;

pub const DEFAULT_TOP_K: usize = 100;

struct Candidate<'a> {
    position: usize,
    mean: f64,
    stats: &'a GeneStats,
}

/// Mean descending, then table position ascending. Total over candidates, so
/// the result does not depend on the selection algorithm.
fn rank_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.mean
        .partial_cmp(&a.mean)
        .unwrap_or(Ordering::Equal)
        .then(a.position.cmp(&b.position))
}

/// The `k` rows with the largest mean, descending; equal means keep their
/// table order. Rows without a defined mean never compete.
pub fn top_k(table: &StatsTable, k: usize) -> Result<Vec<&GeneStats>> {
    let mut candidates: Vec<Candidate<'_>> = table
        .iter()
        .enumerate()
        .filter_map(|(position, stats)| {
            stats.mean.value().map(|mean| Candidate {
                position,
                mean,
                stats,
            })
        })
        .collect();
    if candidates.is_empty() {
        return Err(AnalysisError::EmptyTable { rows: table.len() });
    }
    if k == 0 {
        return Ok(Vec::new());
    }

    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, rank_order);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(rank_order);
    Ok(candidates.into_iter().map(|c| c.stats).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::Aggregator;
    use crate::core::model::{CoercionTally, Stat};
    use crate::core::stats::ReducedBlock;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn table(means: &[Option<f64>]) -> StatsTable {
        let stats = means
            .iter()
            .enumerate()
            .map(|(i, m)| GeneStats {
                gene: format!("G{i}"),
                observed: usize::from(m.is_some()),
                mean: m.map_or(Stat::NoData, Stat::Value),
                median: m.map_or(Stat::NoData, Stat::Value),
                variance: if m.is_some() {
                    Stat::SingleObservation
                } else {
                    Stat::NoData
                },
            })
            .collect();
        let mut agg = Aggregator::new();
        agg.push(ReducedBlock {
            index: 0,
            first_row: 0,
            stats,
            coercions: CoercionTally::default(),
        });
        agg.finish().table
    }

    fn names(sel: &[&GeneStats]) -> Vec<String> {
        sel.iter().map(|g| g.gene.clone()).collect()
    }

    #[rstest]
    fn ties_keep_table_order() {
        let t = table(&[Some(5.0), Some(5.0), Some(3.0), Some(5.0), Some(1.0)]);
        let sel = top_k(&t, 3).unwrap();
        assert_eq!(names(&sel), vec!["G0", "G1", "G3"]);
    }

    #[rstest]
    fn ties_across_the_cut_prefer_earlier_rows() {
        let t = table(&[Some(1.0), Some(2.0), Some(2.0), Some(2.0), Some(9.0)]);
        let sel = top_k(&t, 2).unwrap();
        assert_eq!(names(&sel), vec!["G4", "G1"]);
    }

    #[rstest]
    fn k_larger_than_table_returns_all_sorted() {
        let means: Vec<Option<f64>> = (0..10).map(|i| Some(f64::from(i % 4))).collect();
        let t = table(&means);
        let sel = top_k(&t, 100).unwrap();
        assert_eq!(sel.len(), 10);
        assert_eq!(
            names(&sel),
            vec!["G3", "G7", "G2", "G6", "G1", "G5", "G9", "G0", "G4", "G8"]
        );
    }

    #[rstest]
    fn undefined_means_are_not_candidates() {
        let t = table(&[None, Some(-4.0), None, Some(-1.0)]);
        let sel = top_k(&t, 10).unwrap();
        assert_eq!(names(&sel), vec!["G3", "G1"]);
    }

    #[rstest]
    #[case(&[])]
    #[case(&[None, None])]
    fn nothing_rankable_is_an_error(#[case] means: &[Option<f64>]) {
        let t = table(means);
        let err = top_k(&t, 5).unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyTable { rows } if rows == means.len()));
    }

    #[rstest]
    fn selection_borrows_from_table() {
        let t = table(&[Some(2.0), Some(8.0)]);
        let sel = top_k(&t, 1).unwrap();
        assert!(std::ptr::eq(sel[0], &t.rows()[1]));
    }
}
