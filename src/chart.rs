use std::path::{Path, PathBuf};

use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ChartError;
use crate::metrics::MetricsReport;

/// One point on the TPS/latency timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub time_elapsed: f64,
    pub tps: f64,
    pub p95_latency: f64,
    pub p99_latency: f64,
}

impl From<&MetricsReport> for SeriesRow {
    fn from(report: &MetricsReport) -> Self {
        Self {
            time_elapsed: report.cumulative.elapsed_secs,
            tps: report.interval.tps,
            p95_latency: report.interval.latency.p95,
            p99_latency: report.interval.latency.p99,
        }
    }
}

/// Upper bounds for the two y axes. Both axes start at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    pub tps_top: f64,
    pub latency_top: f64,
    pub time_top: f64,
}

impl AxisBounds {
    /// TPS gets `max + 10`, latency gets `max × 1.2`. An all-zero series
    /// falls back to 10 TPS / 100 ms so the chart keeps its shape.
    pub fn from_rows(rows: &[SeriesRow]) -> Self {
        let max = |f: fn(&SeriesRow) -> f64| rows.iter().map(f).fold(0.0_f64, f64::max);

        let tps_max = max(|r| r.tps);
        let lat_max = max(|r| r.p95_latency).max(max(|r| r.p99_latency));
        let time_max = max(|r| r.time_elapsed);

        Self {
            tps_top: if tps_max > 0.0 { tps_max + 10.0 } else { 10.0 },
            latency_top: if lat_max > 0.0 { lat_max * 1.2 } else { 100.0 },
            time_top: if time_max > 0.0 { time_max } else { 1.0 },
        }
    }
}

pub fn read_rows(path: &Path) -> Result<Vec<SeriesRow>, ChartError> {
    let input_err = |source| ChartError::Input {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(input_err)?;
    let rows = reader
        .deserialize::<SeriesRow>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(input_err)?;

    if rows.is_empty() {
        return Err(ChartError::Empty(path.display().to_string()));
    }
    Ok(rows)
}

/// `run.csv` → `run.svg`
pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("svg")
}

/// Dual-axis line chart: TPS on the left, p95/p99 latency on the right.
pub fn render(rows: &[SeriesRow], title: &str, out: &Path) -> Result<AxisBounds, ChartError> {
    let bounds = AxisBounds::from_rows(rows);
    draw(rows, title, out, bounds).map_err(|e| ChartError::Render(e.to_string()))?;
    Ok(bounds)
}

fn draw(
    rows: &[SeriesRow],
    title: &str,
    out: &Path,
    bounds: AxisBounds,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = SVGBackend::new(out, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("CockroachDB System Study: {title}"), ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(0f64..bounds.time_top, 0f64..bounds.tps_top)?
        .set_secondary_coord(0f64..bounds.time_top, 0f64..bounds.latency_top);

    chart
        .configure_mesh()
        .x_desc("Time (seconds)")
        .y_desc("TPS (Transactions/Sec)")
        .draw()?;
    chart
        .configure_secondary_axes()
        .y_desc("Latency (ms)")
        .draw()?;

    let tps_style = BLUE.stroke_width(2);
    let p99_style = RED.stroke_width(1);
    let p95_style = RGBColor(255, 165, 0).stroke_width(1);

    chart
        .draw_series(LineSeries::new(
            rows.iter().map(|r| (r.time_elapsed, r.tps)),
            tps_style,
        ))?
        .label("TPS")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], tps_style));

    chart
        .draw_secondary_series(LineSeries::new(
            rows.iter().map(|r| (r.time_elapsed, r.p99_latency)),
            p99_style,
        ))?
        .label("p99 Latency")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], p99_style));

    chart
        .draw_secondary_series(LineSeries::new(
            rows.iter().map(|r| (r.time_elapsed, r.p95_latency)),
            p95_style,
        ))?
        .label("p95 Latency")
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], p95_style));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(t: f64, tps: f64, p95: f64, p99: f64) -> SeriesRow {
        SeriesRow {
            time_elapsed: t,
            tps,
            p95_latency: p95,
            p99_latency: p99,
        }
    }

    #[test]
    fn bounds_pad_the_observed_maximum() {
        let b = AxisBounds::from_rows(&[row(10.0, 50.0, 12.0, 20.0), row(20.0, 80.0, 30.0, 25.0)]);
        assert_eq!(b.tps_top, 90.0);
        assert!((b.latency_top - 36.0).abs() < 1e-9);
        assert_eq!(b.time_top, 20.0);
    }

    #[test]
    fn all_zero_series_uses_safe_defaults() {
        let b = AxisBounds::from_rows(&[row(0.0, 0.0, 0.0, 0.0)]);
        assert_eq!(b.tps_top, 10.0);
        assert_eq!(b.latency_top, 100.0);
        assert_eq!(b.time_top, 1.0);
    }

    #[test]
    fn output_swaps_extension() {
        assert_eq!(
            default_output(Path::new("out/baseline.csv")),
            PathBuf::from("out/baseline.svg")
        );
    }

    #[test]
    fn missing_csv_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_rows(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, ChartError::Input { .. }));
    }

    #[test]
    fn header_only_csv_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "time_elapsed,tps,p95_latency,p99_latency\n").unwrap();
        assert!(matches!(read_rows(&path), Err(ChartError::Empty(_))));
    }

    #[test]
    fn malformed_csv_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "time_elapsed,tps,p95_latency,p99_latency\n1,abc,2,3\n").unwrap();
        assert!(matches!(read_rows(&path), Err(ChartError::Input { .. })));
    }

    #[test]
    fn renders_svg_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("baseline.csv");
        std::fs::write(
            &input,
            "time_elapsed,tps,p95_latency,p99_latency\n10,120.5,8.2,11.0\n20,118.0,9.1,14.3\n",
        )
        .unwrap();

        let rows = read_rows(&input).unwrap();
        let out = default_output(&input);
        let bounds = render(&rows, "Baseline", &out).unwrap();

        assert_eq!(bounds.tps_top, 130.5);
        let svg = std::fs::read_to_string(&out).unwrap();
        assert!(svg.contains("<svg"));
    }
}
