use crate::cli::args::{Cli, Commands, PlotFormatArg, RunArgs};
use crate::core::engine::{self, RunConfig, RunOutput, fmt_dur};
use crate::core::io::is_stdin;
use crate::core::model::GeneStats;
use crate::core::rank;
use crate::report::{archive, histogram, table};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const STDIN_NAME: &str = "expression";
const TOP_PREVIEW: usize = 10;

pub fn entry() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
    }
}

struct OutputPaths {
    summary: PathBuf,
    top: PathBuf,
    svg: PathBuf,
    pdf: PathBuf,
}

impl OutputPaths {
    fn new(out: &Path, name: &str) -> Self {
        Self {
            summary: out.join(format!("{}_expression_summary.csv", name)),
            top: out.join(format!("{}_top_expressed_genes.csv", name)),
            svg: out.join(format!("{}_expression_histogram.svg", name)),
            pdf: out.join(format!("{}_expression_histogram.pdf", name)),
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    let t0 = Instant::now();

    stage("preflight", || {
        if !is_stdin(&args.input) && !args.input.is_file() {
            bail!("input file not found: {}", args.input.display());
        }
        if args.chunk_size == 0 {
            bail!("--chunk-size must be >= 1");
        }
        if args.top_k == 0 {
            bail!("--top-k must be >= 1");
        }
        if args.bins == 0 {
            bail!("--bins must be >= 1");
        }
        if args.hist_sample == 0 {
            bail!("--hist-sample must be >= 1");
        }
        Ok(())
    })?;

    let name = match &args.name {
        Some(s) => s.clone(),
        None => default_name(&args.input)
            .context("failed to determine output name from input file; pass --name")?,
    };

    let t_out = Instant::now();
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output dir {}", args.out.display()))?;
    stage_done("mkdir", t_out);

    let config = RunConfig {
        input: args.input.clone(),
        delimiter: args.delimiter.byte(),
        chunk_size: args.chunk_size,
    };

    let t_engine = Instant::now();
    let output = engine::run(&config)?;
    stage_done("engine", t_engine);
    log_dataset(&output);

    let paths = OutputPaths::new(&args.out, &name);
    let mut written = Vec::new();

    let t_summary = Instant::now();
    let rows = table::write(&paths.summary, &output.table)?;
    log::info!("wrote {} ({} genes)", paths.summary.display(), rows);
    written.push(paths.summary.clone());
    stage_done("summary", t_summary);

    let t_top = Instant::now();
    let top = rank::top_k(&output.table, args.top_k).with_context(|| {
        format!(
            "top-{} selection failed; {} was still written",
            args.top_k,
            paths.summary.display()
        )
    })?;
    table::write(&paths.top, top.iter().copied())?;
    log::info!("wrote {} ({} genes)", paths.top.display(), top.len());
    log_top(&top);
    written.push(paths.top.clone());
    stage_done("top-k", t_top);

    let t_hist = Instant::now();
    let marker = top.first().and_then(|g| g.mean.value());
    written.extend(write_histogram(&args, &output, marker, &paths)?);
    stage_done("histogram", t_hist);

    if !args.no_zip {
        let t_zip = Instant::now();
        let zip_path = archive::write_zip(&args.out, &name, &written)
            .with_context(|| "failed to create zip output")?;
        log::info!("wrote {}", zip_path.display());
        stage_done("zip", t_zip);
    }

    log::debug!("total time={}", fmt_dur(t0.elapsed()));
    Ok(())
}

fn write_histogram(
    args: &RunArgs,
    output: &RunOutput,
    marker: Option<f64>,
    paths: &OutputPaths,
) -> Result<Vec<PathBuf>> {
    let mut rng = histogram::rng(args.seed);
    let sample = histogram::sample_means(&output.table, args.hist_sample, &mut rng);
    let Some(hist) = histogram::Histogram::build(&sample, args.bins) else {
        log::warn!("no defined means in the histogram sample; skipping histogram");
        return Ok(Vec::new());
    };
    let kde = histogram::kde_curve(&sample, sample.len() as f64 * hist.bin_width());
    let svg = histogram::render_svg(&histogram::Plot {
        hist: &hist,
        kde: kde.as_deref(),
        marker,
    })?;

    let mut files = Vec::new();
    histogram::write_svg(&paths.svg, &svg)?;
    log::info!(
        "wrote {} ({} sampled genes, {} bins)",
        paths.svg.display(),
        hist.total(),
        hist.counts.len()
    );
    files.push(paths.svg.clone());

    if args.plot_format == PlotFormatArg::Pdf {
        histogram::write_pdf(&paths.pdf, &svg)?;
        log::info!("wrote {}", paths.pdf.display());
        files.push(paths.pdf.clone());
    }
    Ok(files)
}

/// Output prefix derived from the input path: `liver.tsv.gz` -> `liver`.
fn default_name(input: &Path) -> Option<String> {
    if is_stdin(input) {
        return Some(STDIN_NAME.to_string());
    }
    let mut name = input.file_name()?.to_str()?;
    if let Some(s) = name.strip_suffix(".gz") {
        name = s;
    }
    for ext in [".tsv", ".txt", ".csv", ".tab"] {
        if let Some(s) = name.strip_suffix(ext) {
            name = s;
            break;
        }
    }
    (!name.is_empty()).then(|| name.to_string())
}

fn log_dataset(output: &RunOutput) {
    if output.table.is_empty() {
        log::warn!("input has a header but no data rows");
    }
    log::info!(
        "dataset shape: ({}, {}) in {} blocks",
        output.table.len(),
        output.header.width(),
        output.blocks
    );
    let c = &output.coercions;
    if c.na_tokens > 0 {
        log::info!("{} sample values were NA and treated as missing", c.na_tokens);
    }
    if c.unparseable > 0 {
        log::warn!(
            "{} sample values could not be parsed as numbers and were treated as missing (first: {:?})",
            c.unparseable,
            c.first_unparseable.as_deref().unwrap_or_default()
        );
    }
    let no_data = output.table.no_data_rows();
    if no_data > 0 {
        log::warn!("{} genes have no numeric sample values", no_data);
    }
}

fn log_top(top: &[&GeneStats]) {
    log::info!(
        "top {} highly expressed genes (first {}):",
        top.len(),
        TOP_PREVIEW.min(top.len())
    );
    for (i, g) in top.iter().take(TOP_PREVIEW).enumerate() {
        log::info!(
            "{:>4}  {}  mean={}  median={}  var={}",
            i + 1,
            g.gene,
            g.mean,
            g.median,
            g.variance
        );
    }
}

fn stage<F>(name: &str, f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let t = Instant::now();
    let res = f();
    stage_done(name, t);
    res
}

fn stage_done(name: &str, t: Instant) {
    log::debug!("stage={} time={}", name, fmt_dur(t.elapsed()));
}
