use crate::stats::{Metric, Series, Stats, StatsError, XAxis};
use plotters::{drawing::DrawingAreaErrorKind, prelude::*};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PlotError {
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("Failed to draw chart")]
    Drawing(#[from] DrawingAreaErrorKind<std::io::Error>),
    #[error("Drawn chart is not a valid SVG document")]
    Svg(#[from] usvg::Error),
    #[error("Failed to convert chart to PDF: {0}")]
    Pdf(String),
    #[error("Failed to write {path:?}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One output file
#[derive(Debug, Clone, Copy)]
pub struct Chart {
    pub suffix: &'static str,
    pub y_label: &'static str,
    pub metrics: &'static [Metric],
    /// overlay a first order convergence line
    pub reference: bool,
}

pub const CHARTS: [Chart; 5] = [
    Chart {
        suffix: "error",
        y_label: "relative-l2 error mapping to mesh B",
        metrics: &[Metric::Column("relative-l2")],
        reference: true,
    },
    Chart {
        suffix: "peakMemB",
        y_label: "peak memory of participant B [Kbytes]",
        metrics: &[Metric::Column("peakMemB")],
        reference: false,
    },
    Chart {
        suffix: "computet",
        y_label: "time to compute mapping [us]",
        metrics: &[Metric::Column("computeMappingTime")],
        reference: false,
    },
    Chart {
        suffix: "mapt",
        y_label: "time to map Data [us]",
        metrics: &[
            Metric::Column("mapDataTime"),
            Metric::Column("evaluateCacheTime"),
            Metric::Column("updateCacheTime"),
        ],
        reference: false,
    },
    Chart {
        suffix: "summed-times",
        y_label: "Summed Time [us]",
        metrics: &[
            Metric::Sum(&["computeMappingTime", "mapDataTime"]),
            Metric::Sum(&["computeMappingTime", "evaluateCacheTime", "updateCacheTime"]),
        ],
        reference: false,
    },
];

// colorblind palette
const COLOURS: [RGBColor; 10] = [
    RGBColor(0x01, 0x73, 0xb2),
    RGBColor(0xde, 0x8f, 0x05),
    RGBColor(0x02, 0x9e, 0x73),
    RGBColor(0xd5, 0x5e, 0x00),
    RGBColor(0xcc, 0x78, 0xbc),
    RGBColor(0xca, 0x91, 0x61),
    RGBColor(0xfb, 0xaf, 0xe4),
    RGBColor(0x94, 0x94, 0x94),
    RGBColor(0xec, 0xe1, 0x33),
    RGBColor(0x56, 0xb4, 0xe9),
];

const REFERENCE: RGBColor = RGBColor(0xd3, 0xd3, 0xd3);

/// geometric mean, the visual center of a log axis
fn log_average(values: &[f64]) -> f64 {
    (values.iter().map(|value| value.ln()).sum::<f64>() / values.len() as f64).exp()
}

/// positive bounds of `values`, padded if degenerate
fn log_bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|value| *value > 0.0)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(value), max.max(value))
        });

    if !min.is_finite() {
        None
    } else if min == max {
        Some((min / 2.0, max * 2.0))
    } else {
        Some((min, max))
    }
}

/// `(xmin, ymax)` to `(xmax, ymax * xmax / xmin)`, none if the x range is a single point
fn reference_line(series: &[(usize, Series)]) -> Option<[(f64, f64); 2]> {
    let points = series.iter().flat_map(|(_, series)| series.points.iter());
    let (xmin, xmax) = points
        .clone()
        .map(|(x, _)| *x)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), x| {
            (min.min(x), max.max(x))
        });
    let ymax = points.map(|(_, y)| *y).fold(f64::NEG_INFINITY, f64::max);

    if xmin.is_finite() && xmin > 0.0 && xmin != xmax && ymax > 0.0 {
        Some([(xmin, ymax), (xmax, ymax * (xmax / xmin))])
    } else {
        None
    }
}

/// Draw one chart as SVG into `buffer`, returns the number of drawn series
fn draw(stats: &Stats, axis: XAxis, chart: &Chart, buffer: &mut String) -> Result<usize, PlotError> {
    // (metric index, series)
    let series: Vec<(usize, Series)> = chart
        .metrics
        .iter()
        .enumerate()
        .flat_map(|(index, metric)| {
            stats
                .series(axis, metric)
                .into_iter()
                .map(move |series| (index, series))
        })
        .map(|(index, mut series)| {
            // log axes cannot show non-positive values
            series.points.retain(|(x, y)| *x > 0.0 && *y > 0.0);
            (index, series)
        })
        .filter(|(_, series)| !series.points.is_empty())
        .collect();

    let reference = if chart.reference {
        reference_line(&series)
    } else {
        None
    };

    let all_points = || {
        series
            .iter()
            .flat_map(|(_, series)| series.points.iter().copied())
            .chain(reference.iter().flatten().copied())
    };
    let (x_range, y_range) = match (
        log_bounds(all_points().map(|(x, _)| x)),
        log_bounds(all_points().map(|(_, y)| y)),
    ) {
        (Some(x_range), Some(y_range)) => (x_range, y_range),
        _ => {
            warn!("No positive values for {}, writing an empty chart", chart.suffix);
            ((1.0, 10.0), (1.0, 10.0))
        }
    };

    let root = SVGBackend::with_string(buffer, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut context = ChartBuilder::on(&root)
        .margin(20)
        .set_label_area_size(LabelAreaPosition::Left, 80)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(
            (x_range.0..x_range.1).log_scale(),
            (y_range.0..y_range.1).log_scale(),
        )?;

    context
        .configure_mesh()
        .x_desc(axis.label())
        .y_desc(chart.y_label)
        .draw()?;

    for (index, series) in series.iter() {
        let colour = COLOURS[series.group % COLOURS.len()];
        let label = if chart.metrics.len() > 1 {
            format!("{} ({})", series.name, chart.metrics[*index].name())
        } else {
            series.name.clone()
        };

        context
            .draw_series(LineSeries::new(
                series.points.iter().copied(),
                colour.stroke_width(2),
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], colour));

        // one marker shape per metric
        let points = series.points.iter().copied();
        match index % 3 {
            0 => context.draw_series(points.map(|point| Circle::new(point, 4, colour.filled())))?,
            1 => context.draw_series(points.map(|point| Cross::new(point, 4, colour.stroke_width(2))))?,
            _ => context.draw_series(
                points.map(|point| TriangleMarker::new(point, 5, colour.filled())),
            )?,
        };
    }

    if let Some(line) = reference {
        context.draw_series(LineSeries::new(line, REFERENCE.stroke_width(1)))?;
        let label_at = (
            log_average(&[line[0].0, line[1].0]),
            log_average(&[line[0].1, line[1].1]),
        );
        context.draw_series(std::iter::once(Text::new(
            "1st order",
            label_at,
            ("sans-serif", 14).into_font().color(&RGBColor(0x80, 0x80, 0x80)),
        )))?;
    }

    if !series.is_empty() {
        context
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;

    Ok(series.len())
}

fn to_pdf(svg: &str) -> Result<Vec<u8>, PlotError> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &options)?;
    svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|error| PlotError::Pdf(error.to_string()))
}

/// Render one chart as PDF, returns the number of drawn series
pub fn render(stats: &Stats, axis: XAxis, chart: &Chart, path: &Path) -> Result<usize, PlotError> {
    let mut svg = String::new();
    let drawn = draw(stats, axis, chart, &mut svg)?;

    fs::write(path, to_pdf(&svg)?).map_err(|source| PlotError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {path:?}");

    Ok(drawn)
}

/// `<prefix>-<suffix>.pdf`
pub fn chart_path(prefix: &str, chart: &Chart) -> PathBuf {
    PathBuf::from(format!("{prefix}-{}.pdf", chart.suffix))
}

/// render every chart for the statistics in `stats`
pub fn render_all(stats: &Stats, prefix: &str) -> Result<Vec<PathBuf>, PlotError> {
    let axis = stats.x_axis();
    info!("Plotting over {}", axis.label());

    CHARTS
        .iter()
        .map(|chart| {
            let path = chart_path(prefix, chart);
            render(stats, axis, chart, &path)?;
            Ok(path)
        })
        .collect()
}
