use std::fmt;
use std::sync::Arc;

/// Column names from the header row. The first column identifies the gene,
/// every later column is a sample.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub id_column: String,
    pub samples: Arc<[String]>,
}

impl Header {
    pub fn width(&self) -> usize {
        self.samples.len() + 1
    }
}

/// One data row as it appeared in the source, values still unparsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRow {
    pub gene: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub index: usize,
    /// 0-based index of `rows[0]` among all data rows.
    pub first_row: u64,
    pub rows: Vec<RawRow>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MissingKind {
    /// A recognised NA spelling such as `NA` or an empty cell.
    NaToken,
    /// Anything else that failed to parse as a finite number.
    Unparseable,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Cell {
    Numeric(f64),
    Missing(MissingKind),
}

impl Cell {
    pub fn value(self) -> Option<f64> {
        match self {
            Cell::Numeric(v) => Some(v),
            Cell::Missing(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NumericRow {
    pub gene: String,
    pub cells: Vec<Cell>,
}

/// A summary statistic that may be undefined.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stat {
    Value(f64),
    /// Every sample value was missing.
    NoData,
    /// Exactly one value was present; defined mean, undefined spread.
    SingleObservation,
}

impl Stat {
    pub fn value(self) -> Option<f64> {
        match self {
            Stat::Value(v) => Some(v),
            Stat::NoData | Stat::SingleObservation => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Stat::Value(_))
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stat::Value(v) => write!(f, "{:.4}", v),
            Stat::NoData => f.write_str("NA"),
            Stat::SingleObservation => f.write_str("NA (n=1)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeneStats {
    pub gene: String,
    /// Number of non-missing sample values the statistics were computed from.
    pub observed: usize,
    pub mean: Stat,
    pub median: Stat,
    pub variance: Stat,
}

/// Coercion outcomes that did not produce a number.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoercionTally {
    pub na_tokens: u64,
    pub unparseable: u64,
    pub first_unparseable: Option<String>,
}

impl CoercionTally {
    pub fn record(&mut self, kind: MissingKind, raw: &str) {
        match kind {
            MissingKind::NaToken => self.na_tokens += 1,
            MissingKind::Unparseable => {
                self.unparseable += 1;
                if self.first_unparseable.is_none() {
                    self.first_unparseable = Some(raw.to_string());
                }
            }
        }
    }

    pub fn merge(&mut self, other: &CoercionTally) {
        self.na_tokens += other.na_tokens;
        self.unparseable += other.unparseable;
        if self.first_unparseable.is_none() {
            self.first_unparseable = other.first_unparseable.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Stat::Value(4.0), "4.0000")]
    #[case(Stat::NoData, "NA")]
    #[case(Stat::SingleObservation, "NA (n=1)")]
    fn stat_display(#[case] stat: Stat, #[case] expected: &str) {
        assert_eq!(stat.to_string(), expected);
    }

    #[rstest]
    fn tally_keeps_first_unparseable_token() {
        let mut a = CoercionTally::default();
        a.record(MissingKind::NaToken, "NA");
        let mut b = CoercionTally::default();
        b.record(MissingKind::Unparseable, "bad");
        b.record(MissingKind::Unparseable, "worse");
        a.merge(&b);
        a.record(MissingKind::Unparseable, "later");
        assert_eq!(
            a,
            CoercionTally {
                na_tokens: 1,
                unparseable: 3,
                first_unparseable: Some("bad".to_string()),
            }
        );
    }
}
