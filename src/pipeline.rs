use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    plot::{
        palette_color, render, ImageFormat, PlotRequest, PlotSeries, TimeAxis, PLOT_HEIGHT,
        PLOT_WIDTH,
    },
    reader::{open_log, ReadOptions},
    series::{Series, SeriesAccumulator},
};

/// Output settings for one run.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    pub read: ReadOptions,
    /// Write outputs here instead of next to each log.
    pub output_dir: Option<PathBuf>,
    pub format: ImageFormat,
    pub size: (u32, u32),
    pub json: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            output_dir: None,
            format: ImageFormat::Png,
            size: (PLOT_WIDTH, PLOT_HEIGHT),
            json: false,
        }
    }
}

/// What one pass over a log produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub messages: usize,
    pub utc_offset: Option<f64>,
}

fn with_extension(log: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let mut p = match (output_dir, log.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => log.to_path_buf(),
    };
    p.set_extension(extension);
    p
}

/// Reads every matching message of one log into the accumulator.
pub fn accumulate_file(
    filename: &Path,
    options: &ReadOptions,
    accumulator: &mut SeriesAccumulator,
) -> Result<FileSummary> {
    let mut stream = open_log(filename, options)?;
    let types = accumulator.message_types();
    let mut messages = 0;

    while let Some(message) = stream.read_match(&types)? {
        accumulator
            .accept(message.timestamp(), &message)
            .with_context(|| format!("reading {}", filename.display()))?;
        messages += 1;
    }

    Ok(FileSummary {
        messages,
        utc_offset: stream.utc_offset(),
    })
}

/// Builds the chart input for one file. Empty series are left out with a warning.
pub fn plot_request<'a>(
    title: String,
    accumulator: &'a SeriesAccumulator,
    time_axis: TimeAxis,
    size: (u32, u32),
    file_index: usize,
) -> PlotRequest<'a> {
    let color_base = file_index * accumulator.labels().len();

    let series = accumulator
        .iter()
        .enumerate()
        .filter_map(|(i, s)| {
            if s.is_empty() {
                log::warn!("Failed to find any values for field {}", s.spec);
                return None;
            }
            Some(PlotSeries {
                label: s.spec.label(),
                axis: s.spec.axis,
                color: palette_color(color_base + i),
                points: &s.points,
            })
        })
        .collect();

    PlotRequest {
        title,
        time_axis,
        size,
        series,
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    log: String,
    utc_offset: Option<f64>,
    series: Vec<&'a Series>,
}

pub fn export_json(
    path: &Path,
    log: &Path,
    summary: &FileSummary,
    accumulator: &SeriesAccumulator,
) -> Result<()> {
    let export = JsonExport {
        log: log.display().to_string(),
        utc_offset: summary.utc_offset,
        series: accumulator.iter().collect(),
    };

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &export)?;
    Ok(())
}

/// Graphs one log file: read, render, export, then clear the accumulator for the next file.
pub fn process_log_file(
    filename: &Path,
    file_index: usize,
    options: &GraphOptions,
    accumulator: &mut SeriesAccumulator,
) -> Result<()> {
    log::info!("Processing {}", filename.display());

    let summary = accumulate_file(filename, &options.read, accumulator)?;
    log::debug!(
        "{}: {} matching messages, {} points",
        filename.display(),
        summary.messages,
        accumulator.total_points()
    );

    let time_axis = match (options.read.no_timestamps, summary.utc_offset) {
        (true, _) => TimeAxis::SampleIndex,
        (false, Some(offset)) => TimeAxis::Utc(offset),
        (false, None) => TimeAxis::BootSeconds,
    };

    let output_dir = options.output_dir.as_deref();
    let title = filename
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let request = plot_request(title, accumulator, time_axis, options.size, file_index);

    if request.series.is_empty() {
        log::warn!("Nothing to plot for {}", filename.display());
    } else {
        let image = with_extension(filename, output_dir, options.format.extension());
        render(&image, options.format, &request)
            .with_context(|| format!("rendering {}", image.display()))?;
        log::info!("Wrote {}", image.display());
    }

    if options.json {
        let json = with_extension(filename, output_dir, "json");
        export_json(&json, filename, &summary, accumulator)?;
        log::info!("Wrote {}", json.display());
    }

    accumulator.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field_spec::FieldSpec,
        reader::dataflash::tests::{att, att_log, refs},
    };

    fn accumulator(tokens: &[&str]) -> SeriesAccumulator {
        SeriesAccumulator::new(tokens.iter().map(|t| FieldSpec::parse(t).unwrap()))
    }

    #[test]
    fn test_output_paths() {
        assert_eq!(
            with_extension(Path::new("logs/00000042.BIN"), None, "png"),
            PathBuf::from("logs/00000042.png")
        );
        assert_eq!(
            with_extension(Path::new("logs/flight.log"), Some(Path::new("out")), "json"),
            PathBuf::from("out/flight.json")
        );
    }

    #[test]
    fn test_accumulate_file() {
        let log = att_log()
            .msg(10, &refs(&att(1_000_000, 0.1, 0.2)))
            .msg(10, &refs(&att(2_000_000, 0.3, 0.4)))
            .write();

        let mut acc = accumulator(&["ATT.Pitch", "ATT.Roll:degrees,2"]);
        let summary = accumulate_file(log.path(), &ReadOptions::default(), &mut acc).unwrap();

        assert_eq!(summary.messages, 2);
        assert_eq!(summary.utc_offset, None);
        let times: Vec<f64> = acc.get("ATT.Pitch").unwrap().points.iter().map(|p| p.0).collect();
        assert_eq!(times, vec![1.0, 2.0]);
        assert_eq!(acc.get("ATT.Roll:degrees,2").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_field_stops_the_run() {
        let log = att_log().msg(10, &refs(&att(1_000_000, 0.1, 0.2))).write();
        let mut acc = accumulator(&["ATT.Yaw"]);

        let err = accumulate_file(log.path(), &ReadOptions::default(), &mut acc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::GraphError>(),
            Some(crate::GraphError::MissingField { .. })
        ));
    }

    #[test]
    fn test_plot_request_skips_empty_and_rotates_colors() {
        let log = att_log().msg(10, &refs(&att(1_000_000, 0.1, 0.2))).write();
        let mut acc = accumulator(&["ATT.Roll", "GPS.Alt:2", "ATT.Pitch:2"]);
        accumulate_file(log.path(), &ReadOptions::default(), &mut acc).unwrap();

        let request = plot_request("t".into(), &acc, TimeAxis::BootSeconds, (10, 10), 1);
        let labels: Vec<&str> = request.series.iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["ATT.Roll", "ATT.Pitch:2"]);

        // second file, three fields: palette starts at index 3
        assert_eq!(request.series[0].color, palette_color(3));
        assert_eq!(request.series[1].color, palette_color(5));
        assert_eq!(request.series[1].axis, crate::field_spec::Axis::Secondary);
    }

    #[test]
    fn test_export_json() {
        let log = att_log().msg(10, &refs(&att(1_500_000, 0.5, 0.25))).write();
        let mut acc = accumulator(&["ATT.Pitch:2"]);
        let summary = accumulate_file(log.path(), &ReadOptions::default(), &mut acc).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("flight.json");
        export_json(&out, log.path(), &summary, &acc).unwrap();

        let value: serde_json::Value =
            serde_json::from_reader(File::open(&out).unwrap()).unwrap();
        let series = &value["series"][0];
        assert_eq!(series["label"], "ATT.Pitch:2");
        assert_eq!(series["field_name"], "Pitch");
        assert_eq!(series["axis"], "secondary");
        assert_eq!(series["points"], serde_json::json!([[1.5, 0.25]]));
        assert!(value["utc_offset"].is_null());
    }

    #[test]
    fn test_process_log_file_renders_image() {
        let log = att_log()
            .msg(10, &refs(&att(1_000_000, 0.1, 0.2)))
            .msg(10, &refs(&att(2_000_000, 0.3, 0.4)))
            .msg(10, &refs(&att(3_000_000, 0.2, 0.6)))
            .write();
        let out = tempfile::tempdir().unwrap();
        let stem = log.path().file_stem().unwrap().to_string_lossy().into_owned();

        let mut acc = accumulator(&["ATT.Roll", "ATT.Pitch:2"]);
        for format in [ImageFormat::Png, ImageFormat::Svg] {
            let options = GraphOptions {
                output_dir: Some(out.path().to_path_buf()),
                format,
                ..Default::default()
            };
            process_log_file(log.path(), 0, &options, &mut acc).unwrap();

            let image = out.path().join(format!("{stem}.{}", format.extension()));
            assert!(std::fs::metadata(&image).unwrap().len() > 0, "{}", image.display());
            assert_eq!(acc.total_points(), 0);
        }
        assert!(!out.path().join(format!("{stem}.json")).exists());
    }
}
