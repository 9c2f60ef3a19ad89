use crate::core::model::{
    Block, Cell, CoercionTally, GeneStats, MissingKind, NumericRow, RawRow, Stat,
};

/// Spellings treated as an intentionally absent reading rather than bad data.
const NA_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "#N/A", "#N/A N/A", "#NA", "NaN", "nan", "-NaN", "-nan", "NULL",
    "null", "None", "<NA>", "1.#IND", "1.#QNAN", "-1.#IND", "-1.#QNAN",
];

pub struct ReducedBlock {
    pub index: usize,
    pub first_row: u64,
    pub stats: Vec<GeneStats>,
    pub coercions: CoercionTally,
}

pub fn coerce(raw: &str) -> Cell {
    let token = raw.trim();
    if NA_TOKENS.contains(&token) {
        return Cell::Missing(MissingKind::NaToken);
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Numeric(v),
        Ok(v) if v.is_nan() => Cell::Missing(MissingKind::NaToken),
        _ => Cell::Missing(MissingKind::Unparseable),
    }
}

pub fn to_numeric(row: &RawRow, tally: &mut CoercionTally) -> NumericRow {
    let cells = row
        .values
        .iter()
        .map(|raw| {
            let cell = coerce(raw);
            if let Cell::Missing(kind) = cell {
                tally.record(kind, raw);
            }
            cell
        })
        .collect();
    NumericRow {
        gene: row.gene.clone(),
        cells,
    }
}

/// Mean, median and sample variance over the non-missing cells of `row`.
pub fn summarize(row: &NumericRow) -> GeneStats {
    let mut values: Vec<f64> = row.cells.iter().filter_map(|c| c.value()).collect();
    let n = values.len();
    if n == 0 {
        return GeneStats {
            gene: row.gene.clone(),
            observed: 0,
            mean: Stat::NoData,
            median: Stat::NoData,
            variance: Stat::NoData,
        };
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n < 2 {
        Stat::SingleObservation
    } else {
        let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        Stat::Value(ss / (n - 1) as f64)
    };

    values.sort_by(f64::total_cmp);
    let mid = n / 2;
    let median = if n % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };

    GeneStats {
        gene: row.gene.clone(),
        observed: n,
        mean: Stat::Value(mean),
        median: Stat::Value(median),
        variance,
    }
}

/// Reduces every row of `block` in order. Pure: the same block always yields
/// the same output.
pub fn reduce_block(block: &Block) -> ReducedBlock {
    let mut coercions = CoercionTally::default();
    let stats = block
        .rows
        .iter()
        .map(|row| summarize(&to_numeric(row, &mut coercions)))
        .collect();
    ReducedBlock {
        index: block.index,
        first_row: block.first_row,
        stats,
        coercions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn row(gene: &str, values: &[&str]) -> RawRow {
        RawRow {
            gene: gene.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn stats_of(values: &[&str]) -> GeneStats {
        let mut tally = CoercionTally::default();
        summarize(&to_numeric(&row("G", values), &mut tally))
    }

    #[rstest]
    #[case("3.0", Cell::Numeric(3.0))]
    #[case(" 2.5 ", Cell::Numeric(2.5))]
    #[case("-1e3", Cell::Numeric(-1000.0))]
    #[case(".5", Cell::Numeric(0.5))]
    #[case("", Cell::Missing(MissingKind::NaToken))]
    #[case("NA", Cell::Missing(MissingKind::NaToken))]
    #[case("NaN", Cell::Missing(MissingKind::NaToken))]
    #[case("NAN", Cell::Missing(MissingKind::NaToken))]
    #[case("bad", Cell::Missing(MissingKind::Unparseable))]
    #[case("inf", Cell::Missing(MissingKind::Unparseable))]
    #[case("-Infinity", Cell::Missing(MissingKind::Unparseable))]
    #[case("1,5", Cell::Missing(MissingKind::Unparseable))]
    fn coercion(#[case] raw: &str, #[case] expected: Cell) {
        assert_eq!(coerce(raw), expected);
    }

    #[rstest]
    fn missing_value_is_excluded_not_zeroed() {
        let s = stats_of(&["3.0", "bad", "5.0"]);
        assert_eq!(s.observed, 2);
        assert_eq!(s.mean, Stat::Value(4.0));
        assert_eq!(s.median, Stat::Value(4.0));
        assert_eq!(s.variance, Stat::Value(2.0));
    }

    #[rstest]
    fn all_missing_row_has_no_data() {
        let s = stats_of(&["x", "y", "z"]);
        assert_eq!(s.observed, 0);
        assert_eq!(s.mean, Stat::NoData);
        assert_eq!(s.median, Stat::NoData);
        assert_eq!(s.variance, Stat::NoData);
    }

    #[rstest]
    fn single_value_has_mean_but_no_variance() {
        let s = stats_of(&["NA", "7.5", ""]);
        assert_eq!(s.mean, Stat::Value(7.5));
        assert_eq!(s.median, Stat::Value(7.5));
        assert_eq!(s.variance, Stat::SingleObservation);
        assert!(!s.variance.is_defined());
    }

    #[rstest]
    #[case(&["4", "1", "3"], 3.0)]
    #[case(&["4", "1", "3", "10"], 3.5)]
    #[case(&["-2", "-2"], -2.0)]
    fn median_of_sorted_values(#[case] values: &[&str], #[case] expected: f64) {
        assert_eq!(stats_of(values).median, Stat::Value(expected));
    }

    #[rstest]
    fn sample_variance_uses_n_minus_one() {
        let s = stats_of(&["2", "4", "4", "4", "5", "5", "7", "9"]);
        assert_eq!(s.mean, Stat::Value(5.0));
        assert_eq!(s.variance, Stat::Value(32.0 / 7.0));
    }

    #[rstest]
    fn reduce_block_preserves_order_and_tallies() {
        let block = Block {
            index: 3,
            first_row: 12,
            rows: vec![
                row("B", &["1", "oops", "3"]),
                row("A", &["NA", "NA", "NA"]),
                row("B", &["5", "5", "junk"]),
            ],
        };
        let reduced = reduce_block(&block);
        assert_eq!(reduced.index, 3);
        assert_eq!(reduced.first_row, 12);
        let names: Vec<&str> = reduced.stats.iter().map(|s| s.gene.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "B"]);
        assert_eq!(reduced.coercions.unparseable, 2);
        assert_eq!(reduced.coercions.na_tokens, 3);
        assert_eq!(reduced.coercions.first_unparseable.as_deref(), Some("oops"));

        let again = reduce_block(&block);
        assert_eq!(again.stats, reduced.stats);
    }
}
