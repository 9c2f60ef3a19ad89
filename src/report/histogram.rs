use crate::core::aggregate::StatsTable;
use crate::report::write_atomic;
use anyhow::{Context, Result, anyhow};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::path::Path;
use svg2pdf::usvg;
use svg2pdf::{ConversionOptions, PageOptions};

pub const DEFAULT_BINS: usize = 50;
pub const DEFAULT_SAMPLE: usize = 5000;

const KDE_POINTS: usize = 200;
const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 480.0;
const BAR_FILL: &str = "#87ceeb";
const KDE_STROKE: &str = "#2b7bb9";
const MARKER_STROKE: &str = "#d62728";

const TITLE: &str = "Distribution of Mean Gene Expression";
const X_LABEL: &str = "Mean Expression Level";
const Y_LABEL: &str = "Number of Genes";
const MARKER_LABEL: &str = "Top Expressed Gene";

pub fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

/// Draws `min(sample_size, table.len())` rows without replacement and keeps
/// the defined means among them.
pub fn sample_means<R: Rng + ?Sized>(
    table: &StatsTable,
    sample_size: usize,
    rng: &mut R,
) -> Vec<f64> {
    let amount = sample_size.min(table.len());
    index::sample(rng, table.len(), amount)
        .iter()
        .filter_map(|i| table.rows()[i].mean.value())
        .collect()
}

/// Equal-width bins over the value range; the last bin is closed on the right.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn build(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 {
            return None;
        }
        let (mut lo, mut hi) = min_max(values);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0u64; bins];
        for &v in values {
            let i = (((v - lo) / width) as usize).min(bins - 1);
            counts[i] += 1;
        }
        Some(Self { lo, hi, counts })
    }

    pub fn bin_width(&self) -> f64 {
        (self.hi - self.lo) / self.counts.len() as f64
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Gaussian KDE with Scott's bandwidth, evaluated over the data range and
/// scaled by `scale` (sample count times bin width gives a count axis).
/// `None` when fewer than two values or zero spread.
pub fn kde_curve(values: &[f64], scale: f64) -> Option<Vec<(f64, f64)>> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
    let bw = var.sqrt() * (n as f64).powf(-0.2);
    if bw.is_nan() || bw <= 0.0 {
        return None;
    }
    let norm = scale / (n as f64 * bw * (2.0 * PI).sqrt());
    let (lo, hi) = min_max(values);
    let step = (hi - lo) / (KDE_POINTS - 1) as f64;
    let curve = (0..KDE_POINTS)
        .map(|i| {
            let x = lo + step * i as f64;
            let density: f64 = values
                .iter()
                .map(|v| {
                    let z = (x - v) / bw;
                    (-0.5 * z * z).exp()
                })
                .sum();
            (x, density * norm)
        })
        .collect();
    Some(curve)
}

pub struct Plot<'a> {
    pub hist: &'a Histogram,
    pub kde: Option<&'a [(f64, f64)]>,
    pub marker: Option<f64>,
}

pub fn render_svg(plot: &Plot<'_>) -> Result<String> {
    let (w, h) = (WIDTH, HEIGHT);
    let left = 64.0;
    let right = 20.0;
    let top = 40.0;
    let bottom = 44.0;
    let plot_w = w - left - right;
    let plot_h = h - top - bottom;

    let hist = plot.hist;
    let mut x_min = hist.lo;
    let mut x_max = hist.hi;
    if let Some(m) = plot.marker {
        x_min = x_min.min(m);
        x_max = x_max.max(m);
    }
    let kde_peak = plot
        .kde
        .map(|c| c.iter().map(|(_, y)| *y).fold(0.0, f64::max))
        .unwrap_or(0.0);
    let count_peak = hist.counts.iter().copied().max().unwrap_or(0) as f64;
    let y_max = (count_peak.max(kde_peak) * 1.05).max(1.0);
    let sx = |v: f64| left + (v - x_min) / (x_max - x_min).max(1e-12) * plot_w;
    let sy = |v: f64| top + plot_h - v / y_max * plot_h;

    let mut out = String::new();
    writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">",
        w, h, w, h
    )?;
    writeln!(
        out,
        "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"#fff\"/>",
        w, h
    )?;
    writeln!(
        out,
        "<text x=\"{}\" y=\"24\" font-size=\"15\" fill=\"#222\" text-anchor=\"middle\">{}</text>",
        left + plot_w / 2.0,
        TITLE
    )?;
    writeln!(
        out,
        "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"#fff\" stroke=\"#ddd\"/>",
        left, top, plot_w, plot_h
    )?;
    draw_y_axis_ticks(&mut out, left, top, plot_w, plot_h, y_max, 5)?;
    draw_x_axis_ticks(&mut out, left, top, plot_w, plot_h, x_min, x_max, 6)?;
    draw_axis_labels(&mut out, left, top, plot_w, plot_h, X_LABEL, Y_LABEL)?;

    let bin_w = hist.bin_width();
    for (i, &count) in hist.counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let x0 = sx(hist.lo + bin_w * i as f64);
        let x1 = sx(hist.lo + bin_w * (i + 1) as f64);
        let y0 = sy(count as f64);
        writeln!(
            out,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" fill-opacity=\"0.7\" stroke=\"#fff\" stroke-width=\"0.5\"/>",
            x0,
            y0,
            (x1 - x0).max(0.5),
            top + plot_h - y0,
            BAR_FILL
        )?;
    }

    if let Some(curve) = plot.kde {
        let mut path = String::new();
        for (i, (xv, yv)) in curve.iter().enumerate() {
            let cmd = if i == 0 { "M" } else { " L" };
            write!(path, "{} {:.2} {:.2}", cmd, sx(*xv), sy(*yv))?;
        }
        writeln!(
            out,
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.5\"/>",
            path, KDE_STROKE
        )?;
    }

    if let Some(m) = plot.marker {
        let x = sx(m);
        writeln!(
            out,
            "<line x1=\"{:.2}\" y1=\"{}\" x2=\"{:.2}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"1.5\" stroke-dasharray=\"6 4\"/>",
            x,
            top,
            x,
            top + plot_h,
            MARKER_STROKE
        )?;
        let lx = left + plot_w - 150.0;
        let ly = top + 14.0;
        writeln!(
            out,
            "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"1.5\" stroke-dasharray=\"6 4\"/>",
            lx,
            ly,
            lx + 24.0,
            ly,
            MARKER_STROKE
        )?;
        writeln!(
            out,
            "<text x=\"{}\" y=\"{}\" font-size=\"11\" fill=\"#444\" dominant-baseline=\"middle\">{}</text>",
            lx + 30.0,
            ly,
            MARKER_LABEL
        )?;
    }

    writeln!(out, "</svg>")?;
    Ok(out)
}

fn draw_y_axis_ticks(
    out: &mut String,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
    max_y: f64,
    ticks: usize,
) -> Result<()> {
    let (start, step, count) = nice_ticks(0.0, max_y, ticks);
    for i in 0..count {
        let v = start + step * i as f64;
        if v > max_y {
            break;
        }
        let y = top + plot_h - (v / max_y) * plot_h;
        writeln!(
            out,
            "<line x1=\"{}\" y1=\"{:.2}\" x2=\"{}\" y2=\"{:.2}\" stroke=\"#eee\"/>",
            left,
            y,
            left + plot_w,
            y
        )?;
        writeln!(
            out,
            "<text x=\"{}\" y=\"{:.2}\" font-size=\"10\" fill=\"#666\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>",
            left - 4.0,
            y,
            fmt_tick(v)
        )?;
    }
    Ok(())
}

fn draw_x_axis_ticks(
    out: &mut String,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
    min_x: f64,
    max_x: f64,
    ticks: usize,
) -> Result<()> {
    if ticks < 2 || (max_x - min_x).abs() < 1e-9 {
        return Ok(());
    }
    let (start, step, count) = nice_ticks(min_x, max_x, ticks);
    for i in 0..count {
        let v = start + step * i as f64;
        if v < min_x || v > max_x {
            continue;
        }
        let x = left + ((v - min_x) / (max_x - min_x)) * plot_w;
        writeln!(
            out,
            "<line x1=\"{:.2}\" y1=\"{}\" x2=\"{:.2}\" y2=\"{}\" stroke=\"#ccc\"/>",
            x,
            top + plot_h,
            x,
            top + plot_h + 4.0
        )?;
        writeln!(
            out,
            "<text x=\"{:.2}\" y=\"{}\" font-size=\"10\" fill=\"#666\" text-anchor=\"middle\" dominant-baseline=\"hanging\">{}</text>",
            x,
            top + plot_h + 6.0,
            fmt_tick(v)
        )?;
    }
    Ok(())
}

fn draw_axis_labels(
    out: &mut String,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
    x_label: &str,
    y_label: &str,
) -> Result<()> {
    let x = left + plot_w / 2.0;
    let y = top + plot_h + 34.0;
    writeln!(
        out,
        "<text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"#444\" text-anchor=\"middle\">{}</text>",
        x, y, x_label
    )?;
    let yx = left - 44.0;
    let yy = top + plot_h / 2.0;
    writeln!(
        out,
        "<text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"#444\" text-anchor=\"middle\" transform=\"rotate(-90 {} {})\">{}</text>",
        yx, yy, yx, yy, y_label
    )?;
    Ok(())
}

fn fmt_tick(v: f64) -> String {
    if (v - v.round()).abs() < 0.001 {
        format!("{}", v.round() as i64)
    } else if v.abs() < 10.0 {
        format!("{:.2}", v)
    } else {
        format!("{:.1}", v)
    }
}

fn nice_ticks(min: f64, max: f64, ticks: usize) -> (f64, f64, usize) {
    let range = (max - min).abs().max(1e-9);
    let rough = range / (ticks as f64 - 1.0);
    let mag = 10f64.powf(rough.abs().log10().floor());
    let norm = rough / mag;
    let step = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    } * mag;
    let start = (min / step).floor() * step;
    let end = (max / step).ceil() * step;
    let count = ((end - start) / step).round() as usize + 1;
    (start, step, count)
}

pub fn svg_to_pdf(svg: &str) -> Result<Vec<u8>> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_str(svg, &opt).map_err(|e| anyhow!("usvg parse failed: {e}"))?;
    let pdf = svg2pdf::to_pdf(&tree, ConversionOptions::default(), PageOptions::default())
        .map_err(|e| anyhow!("svg2pdf conversion failed: {e}"))?;
    Ok(pdf)
}

pub fn write_svg(path: &Path, svg: &str) -> Result<()> {
    write_atomic(path, |w| {
        w.write_all(svg.as_bytes())?;
        Ok(())
    })
    .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_pdf(path: &Path, svg: &str) -> Result<()> {
    let pdf = svg_to_pdf(svg).with_context(|| "failed to convert histogram to PDF")?;
    write_atomic(path, |w| {
        w.write_all(&pdf)?;
        Ok(())
    })
    .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::Aggregator;
    use crate::core::model::{CoercionTally, GeneStats, Stat};
    use crate::core::stats::ReducedBlock;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn table(means: &[Option<f64>]) -> StatsTable {
        let stats = means
            .iter()
            .enumerate()
            .map(|(i, m)| GeneStats {
                gene: format!("G{i}"),
                observed: 2,
                mean: m.map_or(Stat::NoData, Stat::Value),
                median: Stat::NoData,
                variance: Stat::NoData,
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

    #[rstest]
    fn bins_cover_range_and_count_everything() {
        let h = Histogram::build(&[0.0, 1.0, 2.0, 3.0, 4.0], 4).unwrap();
        assert_eq!(h.lo, 0.0);
        assert_eq!(h.hi, 4.0);
        assert_eq!(h.counts, vec![1, 1, 1, 2]);
        assert_eq!(h.total(), 5);
        assert_eq!(h.bin_width(), 1.0);
    }

    #[rstest]
    fn constant_values_widen_the_range() {
        let h = Histogram::build(&[3.0, 3.0], 2).unwrap();
        assert_eq!((h.lo, h.hi), (2.5, 3.5));
        assert_eq!(h.counts, vec![0, 2]);
    }

    #[rstest]
    #[case(&[], 10)]
    #[case(&[1.0], 0)]
    fn nothing_to_bin(#[case] values: &[f64], #[case] bins: usize) {
        assert!(Histogram::build(values, bins).is_none());
    }

    #[rstest]
    fn sample_is_bounded_and_skips_undefined() {
        let t = table(&[Some(1.0), None, Some(3.0), None, Some(5.0)]);
        let mut r = rng(Some(7));
        let all = sample_means(&t, 5000, &mut r);
        let mut sorted = all.clone();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(sorted, vec![1.0, 3.0, 5.0]);

        let some = sample_means(&t, 2, &mut rng(Some(7)));
        assert!(some.len() <= 2);
        assert_eq!(sample_means(&t, 2, &mut rng(Some(7))), some);
    }

    #[rstest]
    fn kde_integrates_to_scale() {
        let values: Vec<f64> = (0..200).map(|i| f64::from(i % 20)).collect();
        let curve = kde_curve(&values, 1.0).unwrap();
        assert_eq!(curve.len(), KDE_POINTS);
        assert_eq!(curve.first().map(|p| p.0), Some(0.0));
        assert!(curve.last().is_some_and(|p| (p.0 - 19.0).abs() < 1e-9));
        let step = curve[1].0 - curve[0].0;
        let area: f64 = curve.iter().map(|(_, y)| y * step).sum();
        assert!(area > 0.8 && area < 1.0, "area {area}");
    }

    #[rstest]
    fn kde_needs_spread() {
        assert!(kde_curve(&[2.0], 1.0).is_none());
        assert!(kde_curve(&[2.0, 2.0, 2.0], 1.0).is_none());
    }

    #[rstest]
    fn svg_has_bars_curve_and_marker() {
        let values = [1.0, 2.0, 2.5, 3.0, 8.0];
        let hist = Histogram::build(&values, 5).unwrap();
        let kde = kde_curve(&values, values.len() as f64 * hist.bin_width()).unwrap();
        let svg = render_svg(&Plot {
            hist: &hist,
            kde: Some(&kde),
            marker: Some(8.0),
        })
        .unwrap();
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains(TITLE));
        assert!(svg.contains(MARKER_LABEL));
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains("<path d=\"M "));
        assert_eq!(svg.matches(BAR_FILL).count(), 3);
    }

    #[rstest]
    fn svg_without_marker_or_curve() {
        let hist = Histogram::build(&[4.0], 3).unwrap();
        let svg = render_svg(&Plot {
            hist: &hist,
            kde: None,
            marker: None,
        })
        .unwrap();
        assert!(!svg.contains(MARKER_LABEL));
        assert!(!svg.contains("<path"));
    }

    #[rstest]
    fn svg_is_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.svg");
        write_svg(&path, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<svg xmlns=\"http://www.w3.org/2000/svg\"/>"
        );
    }
}
