use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use staffcut::{
    BatchDriver, BatchOptions, ExportOptions, PageExporter, PageSegmenter, SegmentationMode,
    SegmenterConfig, VisualizationConfig,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    /// Detect staves, remove their lines, then cut symbols per staff
    Staff,
    /// Cut symbols from the whole page with an adaptive threshold
    Direct,
}

impl From<ModeArg> for SegmentationMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Staff => SegmentationMode::Staff,
            ModeArg::Direct => SegmentationMode::Direct,
        }
    }
}

#[derive(Parser)]
#[command(name = "staffcut")]
#[command(about = "Cut sheet-music scans into labeled symbol fragments")]
struct Cli {
    /// Folder with the source images
    #[arg(long, value_name = "DIR", default_value = "input")]
    input: PathBuf,

    /// Folder for fragments, annotations and debug images
    #[arg(long, value_name = "DIR", default_value = "output/parts")]
    output: PathBuf,

    /// Prefix for fragment file names
    #[arg(long, default_value = "")]
    prefix: String,

    /// JSON file overriding the default thresholds and rule table
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Segmentation mode (overrides the config file)
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Also save every staff region to {output}/staffs
    #[arg(long)]
    save_staffs: bool,

    /// Save per-step debug images to directory (one subfolder per page)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Number of pages processed in parallel
    #[arg(long, short)]
    jobs: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    staffcut::init_tracing(if args.verbose { "debug" } else { "info" });

    let mut config = match &args.config {
        Some(path) => SegmenterConfig::from_json_file(path)?,
        None => SegmenterConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }

    let segmenter = PageSegmenter::new(config)?.with_verbose(args.verbose);

    let export = ExportOptions {
        output_dir: args.output.clone(),
        prefix: args.prefix.clone(),
        save_staffs: args.save_staffs,
    };
    let exporter = PageExporter::new(export, VisualizationConfig::with_system_font());

    let driver = BatchDriver::new(
        segmenter,
        exporter,
        BatchOptions {
            input_dir: args.input.clone(),
            debug_dir: args.debug_out.clone(),
            jobs: args.jobs,
        },
    );

    let summary = driver.run()?;

    match &summary.manifest {
        Some(path) => println!(
            "Done: {} page(s), {} fragment(s). Annotations saved to {}",
            summary.processed(),
            summary.records,
            path.display()
        ),
        None => println!("No images in {}", args.input.display()),
    }
    if summary.failed() > 0 {
        println!("{} file(s) could not be processed", summary.failed());
    }

    Ok(())
}
