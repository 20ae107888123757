use std::{ops::Range, path::Path};

use anyhow::{anyhow, Result};
use chrono::DateTime;
use plotters::{coord::Shift, prelude::*};

use crate::field_spec::Axis;

pub const PLOT_WIDTH: u32 = 1200;
pub const PLOT_HEIGHT: u32 = 600;
const LINE_WIDTH: u32 = 2;
const LEGEND_LINE_LENGTH: i32 = 20;
const FONT_SIZE_TITLE: i32 = 22;
const FONT_SIZE_LABEL: i32 = 14;

/// Fixed palette, handed out round-robin across fields and files.
pub const PALETTE: [RGBColor; 7] = [
    RGBColor(255, 0, 0),     // red
    RGBColor(0, 128, 0),     // green
    RGBColor(0, 0, 255),     // blue
    RGBColor(255, 165, 0),   // orange
    RGBColor(128, 128, 0),   // olive
    RGBColor(0, 0, 0),       // black
    RGBColor(128, 128, 128), // grey
];

pub fn palette_color(index: usize) -> RGBColor {
    PALETTE[index % PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ImageFormat {
    #[default]
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }
}

/// What the x values of a chart mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeAxis {
    /// Seconds since boot, plus the offset to unix time.
    Utc(f64),
    BootSeconds,
    SampleIndex,
}

impl TimeAxis {
    fn description(self) -> &'static str {
        match self {
            TimeAxis::Utc(_) => "Time (UTC)",
            TimeAxis::BootSeconds => "Time since boot (s)",
            TimeAxis::SampleIndex => "Sample",
        }
    }

    pub fn format(self, x: f64) -> String {
        match self {
            TimeAxis::Utc(offset) => {
                let millis = ((x + offset) * 1000.0).round() as i64;
                DateTime::from_timestamp_millis(millis)
                    .map(|t| t.format("%H:%M:%S").to_string())
                    .unwrap_or_default()
            }
            TimeAxis::BootSeconds => format!("{:.1}", x),
            TimeAxis::SampleIndex => format!("{:.0}", x),
        }
    }
}

/// One line on the chart. Points are borrowed from the accumulator.
pub struct PlotSeries<'a> {
    pub label: &'a str,
    pub axis: Axis,
    pub color: RGBColor,
    pub points: &'a [(f64, f64)],
}

pub struct PlotRequest<'a> {
    pub title: String,
    pub time_axis: TimeAxis,
    pub size: (u32, u32),
    /// In legend order.
    pub series: Vec<PlotSeries<'a>>,
}

/// Calculate plot range with padding.
/// Adds 15% padding, or a fixed padding for very small ranges.
pub fn calculate_range(min_val: f64, max_val: f64) -> (f64, f64) {
    let (min, max) = if min_val <= max_val {
        (min_val, max_val)
    } else {
        (max_val, min_val)
    };
    let range = (max - min).abs();
    let padding = if range < 1e-6 { 0.5 } else { range * 0.15 };
    (min - padding, max + padding)
}

fn bounds<'a>(
    series: impl Iterator<Item = &'a PlotSeries<'a>>,
    pick: fn(&(f64, f64)) -> f64,
) -> Option<(f64, f64)> {
    series
        .flat_map(|s| s.points.iter())
        .map(pick)
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn y_range<'a>(series: impl Iterator<Item = &'a PlotSeries<'a>>) -> Option<Range<f64>> {
    bounds(series, |p| p.1).map(|(lo, hi)| {
        let (lo, hi) = calculate_range(lo, hi);
        lo..hi
    })
}

fn on_axis<'a>(
    request: &'a PlotRequest<'a>,
    axis: Axis,
) -> impl Iterator<Item = &'a PlotSeries<'a>> {
    request.series.iter().filter(move |s| s.axis == axis)
}

pub fn render(path: &Path, format: ImageFormat, request: &PlotRequest) -> Result<()> {
    match format {
        ImageFormat::Png => draw_chart(
            BitMapBackend::new(path, request.size).into_drawing_area(),
            request,
        ),
        ImageFormat::Svg => draw_chart(
            SVGBackend::new(path, request.size).into_drawing_area(),
            request,
        ),
    }
}

fn draw_chart<DB>(root: DrawingArea<DB, Shift>, request: &PlotRequest) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_lo, x_hi) =
        bounds(request.series.iter(), |p| p.0).ok_or_else(|| anyhow!("nothing to plot"))?;
    let x_range = if x_hi > x_lo { x_lo..x_hi } else { x_lo - 0.5..x_hi + 0.5 };

    let has_secondary = on_axis(request, Axis::Secondary).next().is_some();
    let y2_range = y_range(on_axis(request, Axis::Secondary));
    let y1_range = y_range(on_axis(request, Axis::Primary))
        .or_else(|| y2_range.clone())
        .ok_or_else(|| anyhow!("nothing to plot"))?;
    let y2_range = y2_range.unwrap_or_else(|| y1_range.clone());

    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&request.title, ("sans-serif", FONT_SIZE_TITLE))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(60)
        .right_y_label_area_size(if has_secondary { 60 } else { 0 })
        .build_cartesian_2d(x_range.clone(), y1_range)?
        .set_secondary_coord(x_range, y2_range);

    let time_axis = request.time_axis;
    let x_formatter = |x: &f64| time_axis.format(*x);

    chart
        .configure_mesh()
        .x_desc(time_axis.description())
        .x_labels(10)
        .y_labels(10)
        .x_label_formatter(&x_formatter)
        .label_style(("sans-serif", FONT_SIZE_LABEL))
        .draw()?;

    if has_secondary {
        chart
            .configure_secondary_axes()
            .y_labels(10)
            .label_style(("sans-serif", FONT_SIZE_LABEL))
            .draw()?;
    }

    for series in &request.series {
        let color = series.color;
        let line = LineSeries::new(series.points.iter().copied(), color.stroke_width(LINE_WIDTH));

        let anno = match series.axis {
            Axis::Primary => chart.draw_series(line)?,
            Axis::Secondary => chart.draw_secondary_series(line)?,
        };
        anno.label(series.label).legend(move |(x, y)| {
            PathElement::new(
                vec![(x, y), (x + LEGEND_LINE_LENGTH, y)],
                color.stroke_width(LINE_WIDTH),
            )
        });
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .label_font(("sans-serif", FONT_SIZE_LABEL))
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_palette_wraps() {
        assert_eq!(palette_color(0), RGBColor(255, 0, 0));
        assert_eq!(palette_color(7), palette_color(0));
        assert_eq!(palette_color(10), RGBColor(255, 165, 0));
    }

    #[test]
    fn test_calculate_range() {
        let (lo, hi) = calculate_range(0.0, 10.0);
        assert_relative_eq!(lo, -1.5);
        assert_relative_eq!(hi, 11.5);

        // flat data still gets a visible band
        assert_eq!(calculate_range(3.0, 3.0), (2.5, 3.5));
        // swapped input
        assert_eq!(calculate_range(10.0, 0.0), calculate_range(0.0, 10.0));
    }

    fn two_axis_request<'a>(a: &'a [(f64, f64)], b: &'a [(f64, f64)]) -> PlotRequest<'a> {
        PlotRequest {
            title: "flight.bin".to_string(),
            time_axis: TimeAxis::BootSeconds,
            size: (640, 480),
            series: vec![
                PlotSeries {
                    label: "ATT.Roll",
                    axis: Axis::Primary,
                    color: palette_color(0),
                    points: a,
                },
                PlotSeries {
                    label: "GPS.Alt:2",
                    axis: Axis::Secondary,
                    color: palette_color(1),
                    points: b,
                },
            ],
        }
    }

    #[test]
    fn test_bounds_per_axis() {
        let a = [(0.0, 1.0), (5.0, -2.0)];
        let b = [(2.0, 100.0), (8.0, f64::NAN)];
        let request = two_axis_request(&a, &b);

        assert_eq!(bounds(request.series.iter(), |p| p.0), Some((0.0, 8.0)));
        assert_eq!(
            bounds(on_axis(&request, Axis::Primary), |p| p.1),
            Some((-2.0, 1.0))
        );
        assert_eq!(
            bounds(on_axis(&request, Axis::Secondary), |p| p.1),
            Some((100.0, 100.0))
        );
    }

    #[test]
    fn test_render_png_with_secondary_axis() {
        let a = [(0.0, 1.0), (1.0, -2.0), (2.0, 0.5)];
        let b = [(0.5, 100.0), (1.5, 140.0)];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flight.png");

        render(&path, ImageFormat::Png, &two_axis_request(&a, &b)).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_render_svg_draws_legend() {
        let a = [(0.0, 1.0), (1.0, -2.0)];
        let b = [(0.0, 100.0), (1.0, 140.0)];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flight.svg");

        render(&path, ImageFormat::Svg, &two_axis_request(&a, &b)).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("ATT.Roll"));
        assert!(svg.contains("GPS.Alt:2"));
    }

    #[test]
    fn test_render_single_point_primary_only() {
        let a = [(3.0, 7.0)];
        let mut request = two_axis_request(&a, &[]);
        request.series.truncate(1);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flight.svg");

        render(&path, ImageFormat::Svg, &request).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_render_nothing_is_an_error() {
        let mut request = two_axis_request(&[], &[]);
        request.series.clear();
        let dir = tempfile::tempdir().unwrap();

        let err = render(&dir.path().join("empty.svg"), ImageFormat::Svg, &request).unwrap_err();
        assert_eq!(err.to_string(), "nothing to plot");
    }

    #[test]
    fn test_time_axis_labels() {
        // 2024-01-01T12:30:15Z
        let offset = 1_704_112_215.0 - 60.0;
        assert_eq!(TimeAxis::Utc(offset).format(60.0), "12:30:15");
        assert_eq!(TimeAxis::BootSeconds.format(12.345), "12.3");
        assert_eq!(TimeAxis::SampleIndex.format(42.0), "42");
    }
}
