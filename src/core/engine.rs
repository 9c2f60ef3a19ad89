use crate::core::aggregate::{Aggregation, Aggregator, StatsTable};
use crate::core::error::Result as AnalysisResult;
use crate::core::io::{InputKind, open_input};
use crate::core::model::{CoercionTally, Header};
use crate::core::reader::BlockReader;
use crate::core::stats::reduce_block;
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct RunConfig {
    pub input: PathBuf,
    pub delimiter: u8,
    pub chunk_size: usize,
}

pub struct RunOutput {
    pub header: Header,
    pub table: StatsTable,
    pub coercions: CoercionTally,
    pub blocks: usize,
    pub input_kind: InputKind,
}

pub fn run(cfg: &RunConfig) -> Result<RunOutput> {
    let t_open = Instant::now();
    let (input, input_kind) = open_input(&cfg.input)?;
    log::debug!("engine.input_open time={}", fmt_dur(t_open.elapsed()));
    log::info!("reading {} ({:?})", cfg.input.display(), input_kind);

    let (header, agg) = aggregate(input, cfg.delimiter, cfg.chunk_size)
        .with_context(|| format!("failed to process {}", cfg.input.display()))?;

    Ok(RunOutput {
        header,
        table: agg.table,
        coercions: agg.coercions,
        blocks: agg.blocks,
        input_kind,
    })
}

/// Reads `input` once, block by block, and folds every block into a single
/// table. Only one block is held in memory at a time.
pub fn aggregate<R: BufRead>(
    input: R,
    delimiter: u8,
    chunk_size: usize,
) -> AnalysisResult<(Header, Aggregation)> {
    let t_total = Instant::now();
    let mut reader = BlockReader::new(input, delimiter, chunk_size)?;
    let header = reader.header().clone();
    log_header(&header);

    let mut agg = Aggregator::new();
    let mut reduce_time = Duration::ZERO;
    for block in &mut reader {
        let block = block?;
        let t_reduce = Instant::now();
        let reduced = reduce_block(&block);
        reduce_time += t_reduce.elapsed();
        log::debug!(
            "processed block {}: {} rows (rows {}..{})",
            block.index,
            block.rows.len(),
            block.first_row,
            block.first_row + block.rows.len() as u64
        );
        agg.push(reduced);
    }
    debug_assert_eq!(reader.rows_read(), agg.rows() as u64);

    let agg = agg.finish();
    log::debug!(
        "engine.aggregate blocks={} reduce={} total={}",
        agg.blocks,
        fmt_dur(reduce_time),
        fmt_dur(t_total.elapsed())
    );
    Ok((header, agg))
}

fn log_header(header: &Header) {
    let first: Vec<&str> = std::iter::once(header.id_column.as_str())
        .chain(header.samples.iter().map(String::as_str))
        .take(10)
        .collect();
    let more = if header.width() > first.len() { " ..." } else { "" };
    log::info!("columns (first 10): {:?}{}", first, more);
    if header.samples.is_empty() {
        log::warn!("header has no sample columns; every statistic will be undefined");
    }
}

pub fn fmt_dur(d: Duration) -> String {
    if d.as_secs_f64() < 1.0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}
