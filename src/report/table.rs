use crate::core::model::GeneStats;
use crate::report::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

pub const COLUMNS: [&str; 4] = ["genes", "mean_expr", "median_expr", "var_expr"];

/// One exported row. Undefined statistics serialize as empty fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub genes: String,
    pub mean_expr: Option<f64>,
    pub median_expr: Option<f64>,
    pub var_expr: Option<f64>,
}

impl From<&GeneStats> for GeneRecord {
    fn from(g: &GeneStats) -> Self {
        Self {
            genes: g.gene.clone(),
            mean_expr: g.mean.value(),
            median_expr: g.median.value(),
            var_expr: g.variance.value(),
        }
    }
}

pub fn write_records<'a, W, I>(out: W, rows: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a GeneStats>,
{
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    w.write_record(COLUMNS)?;
    for g in rows {
        w.serialize(GeneRecord::from(g))
            .with_context(|| format!("failed to serialize gene {}", g.gene))?;
    }
    w.flush()?;
    Ok(())
}

/// Writes `rows` as `genes,mean_expr,median_expr,var_expr`, atomically.
/// Returns the number of data rows written.
pub fn write<'a, I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a GeneStats>,
{
    let mut count = 0usize;
    write_atomic(path, |w| {
        write_records(w, rows.into_iter().inspect(|_| count += 1))
    })
    .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(count)
}
