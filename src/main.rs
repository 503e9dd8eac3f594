//! rtlpdf - Main Application Entrypoint
//!
//! This file is responsible for parsing command-line arguments, initializing
//! the application environment (like logging), and dispatching the core
//! processing logic.

use clap::Parser;
use log::{error, info};
use rtlpdf::{Config, Error, FontSize, Layout, RenderSettings, run};
use std::path::PathBuf;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Makes scanned right-to-left PDFs searchable and copyable in logical reading order.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scanned input PDF
    input: PathBuf,

    /// Output path (defaults to <input-stem>-readable.<ext> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// OCR language (e.g., "ara" for Arabic, "fas" for Persian)
    #[arg(short, long, default_value_t = String::from("ara"))]
    lang: String,

    /// OCR program to invoke
    #[arg(long, default_value = "ocrmypdf")]
    ocr_program: PathBuf,

    /// Font size of the invisible text, in points
    #[arg(long, default_value_t = 1.0)]
    font_size: f32,

    /// Size the invisible text from each word's box height instead
    #[arg(long)]
    font_size_from_box: bool,

    /// Stretch each word horizontally to its box width
    #[arg(long)]
    fit_width: bool,

    /// Resolution the scanned pages are rendered at
    #[arg(long, default_value_t = 300.0)]
    dpi: f32,

    /// JPEG quality of the re-encoded page images (1 to 100)
    #[arg(long, default_value_t = 85)]
    jpeg_quality: u8,

    /// Keep Arabic diacritics in the text layer
    #[arg(long)]
    keep_harakat: bool,

    /// Generate an optional JSON index file with metadata
    #[arg(long)]
    index: bool,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting rtlpdf...");

    // 2. Create a configuration object from arguments
    let config = Config {
        input_file: args.input,
        output_file: args.output,
        lang: args.lang,
        ocr_program: args.ocr_program,
        layout: Layout {
            font_size: if args.font_size_from_box {
                FontSize::BoxHeight
            } else {
                FontSize::Fixed(args.font_size)
            },
            fit_width: args.fit_width,
            jpeg_quality: args.jpeg_quality,
        },
        render: RenderSettings {
            dpi: args.dpi,
            ..RenderSettings::default()
        },
        keep_harakat: args.keep_harakat,
        generate_index: args.index,
        show_progress: !matches!(args.log_level, LogLevel::Error),
    };

    // 3. Run the main application logic
    let code = match run(config) {
        Ok(summary) => {
            info!("Processing completed successfully.");
            println!("Saved readable PDF to {}", summary.output.display());
            0
        }
        Err(e) => {
            error!("Application failed: {:#}", e);
            e.downcast_ref::<Error>().map_or(1, Error::exit_code)
        }
    };

    #[cfg(feature = "dhat-heap")]
    drop(profiler);

    std::process::exit(code);
}
