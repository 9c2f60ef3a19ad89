use crate::core::model::{CoercionTally, GeneStats};
use crate::core::stats::ReducedBlock;

/// Per-gene statistics in source row order. Append-only while the input is
/// being consumed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatsTable {
    rows: Vec<GeneStats>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[GeneStats] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GeneStats> {
        self.rows.iter()
    }

    pub fn no_data_rows(&self) -> usize {
        self.rows.iter().filter(|g| !g.mean.is_defined()).count()
    }
}

impl<'a> IntoIterator for &'a StatsTable {
    type Item = &'a GeneStats;
    type IntoIter = std::slice::Iter<'a, GeneStats>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Concatenates reduced blocks in stream order.
#[derive(Debug, Default)]
pub struct Aggregator {
    table: StatsTable,
    coercions: CoercionTally,
    blocks: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one block. Blocks must arrive in the order the reader produced
    /// them; a block whose first row does not continue the table is a caller
    /// bug.
    pub fn push(&mut self, block: ReducedBlock) {
        debug_assert_eq!(block.index, self.blocks);
        debug_assert_eq!(block.first_row, self.table.len() as u64);
        self.table.rows.extend(block.stats);
        self.coercions.merge(&block.coercions);
        self.blocks += 1;
    }

    pub fn rows(&self) -> usize {
        self.table.len()
    }

    pub fn finish(self) -> Aggregation {
        Aggregation {
            table: self.table,
            coercions: self.coercions,
            blocks: self.blocks,
        }
    }
}

#[derive(Debug)]
pub struct Aggregation {
    pub table: StatsTable,
    pub coercions: CoercionTally,
    pub blocks: usize,
}
