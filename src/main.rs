use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, ValueHint};

use ardugraph::{
    pipeline::process_log_file,
    plot::{ImageFormat, PLOT_HEIGHT, PLOT_WIDTH},
    reader::{ModeFilter, ReadOptions},
    FieldSpec, GraphError, GraphOptions, SeriesAccumulator,
};

/// Graph fields of ArduPilot Dataflash logs
#[derive(Parser, Debug)]
#[command(name = "ardugraph", version, about, long_about = None)]
#[command(after_help = "Fields are given as MSGNAME.fieldname[:degrees,2], for example ATT.Roll:degrees \
    or GPS.Alt:2 to plot against the right-hand axis.")]
struct Cli {
    /// Log files and field specifiers, in any order
    #[arg(value_name = "LOGFILES... FIELDS...", value_hint = ValueHint::AnyPath)]
    args: Vec<String>,

    /// Log doesn't have timestamps, plot against the record index
    #[arg(long, action = ArgAction::SetTrue)]
    no_timestamps: bool,

    /// Use planner file format (Mission Planner text logs)
    #[arg(long, action = ArgAction::SetTrue)]
    planner: bool,

    /// Select messages by flight mode (comma separated names or numbers)
    #[arg(long, value_name = "MODES")]
    mode: Option<ModeFilter>,

    /// Directory for the generated files (defaults to next to each log)
    #[arg(short, long, value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,

    /// Image format
    #[arg(long, value_enum, default_value_t = ImageFormat::Png)]
    format: ImageFormat,

    /// Image width in pixels
    #[arg(long, default_value_t = PLOT_WIDTH)]
    width: u32,

    /// Image height in pixels
    #[arg(long, default_value_t = PLOT_HEIGHT)]
    height: u32,

    /// Also write the graphed series as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // anything that is not an existing path is a field specifier
    let (files, fields): (Vec<&String>, Vec<&String>) = cli
        .args
        .iter()
        .partition(|a| PathBuf::from(a.as_str()).exists());

    if files.is_empty() || fields.is_empty() {
        let usage = Cli::command().render_usage().to_string();
        return Err(GraphError::Usage(usage).into());
    }

    let specs = fields
        .iter()
        .map(|f| FieldSpec::parse(f))
        .collect::<Result<Vec<_>, _>>()?;
    let mut accumulator = SeriesAccumulator::new(specs);

    let options = GraphOptions {
        read: ReadOptions {
            no_timestamps: cli.no_timestamps,
            planner: cli.planner,
            mode: cli.mode.clone(),
        },
        output_dir: cli.output_dir.clone(),
        format: cli.format,
        size: (cli.width, cli.height),
        json: cli.json,
    };

    if let Some(dir) = &options.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    for (index, filename) in files.iter().enumerate() {
        process_log_file(
            PathBuf::from(filename.as_str()).as_path(),
            index,
            &options,
            &mut accumulator,
        )?;
    }

    Ok(())
}
