use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lapsecam::{
    capture::{CaptureRequest, IntervalUnit},
    config::Quality,
    encoder::{
        find_preset, MusicTrack, OverlayImage, TimelapseInput, TimelapseOptions, VideoEffect,
        VideoFormat, EXPORT_PRESETS,
    },
    schedule::should_capture_be_active,
    settings::{SettingsStore, TomlSettingsStore},
    storage::StorageManager,
    EventBus, LapseConfig, LapseService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "lapsecam")]
#[command(about = "Timelapse camera with scheduling, motion gating and video assembly")]
#[command(version)]
#[command(long_about = "Captures stills from a camera on a fixed interval, honours capture \
schedules and motion detection, assembles the stills into videos with ffmpeg and \
optionally uploads results over FTP or SFTP.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lapsecam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Initialize the service but don't start it
    #[arg(long, help = "Initialize components but don't start them")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service with its schedulers (default)
    Run {
        /// Begin capturing immediately
        #[arg(long)]
        start: bool,

        /// Capture interval overriding camera.default_interval
        #[arg(long)]
        interval: Option<u64>,

        /// Unit of --interval: seconds, minutes or hours
        #[arg(long, default_value = "seconds", value_parser = parse_unit)]
        unit: IntervalUnit,
    },

    /// Assemble one timelapse video and exit
    Timelapse {
        /// Directory of captured images
        input: PathBuf,

        #[arg(long, default_value = "timelapse")]
        name: String,

        /// Output file; defaults to <storage>/videos/<name>.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export preset key (see `presets`)
        #[arg(long)]
        preset: Option<String>,

        #[arg(long)]
        fps: Option<u32>,

        /// low, medium, high or ultra
        #[arg(long)]
        quality: Option<Quality>,

        /// mp4, mp4_h265 or webm
        #[arg(long)]
        format: Option<VideoFormat>,

        /// none, fade, zoom or pan
        #[arg(long, default_value = "none")]
        effect: VideoEffect,

        #[arg(long)]
        deflicker: bool,

        #[arg(long)]
        preserve_aspect_ratio: bool,

        /// Image composited onto every frame
        #[arg(long)]
        overlay: Option<PathBuf>,

        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        overlay_x: i32,

        #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
        overlay_y: i32,

        /// Audio track muxed into the video
        #[arg(long)]
        music: Option<PathBuf>,

        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(0..=100))]
        music_volume: u8,
    },

    /// Print whether capture is inside the schedule right now
    Schedule,

    /// Print storage usage
    Storage {
        /// Delete images older than storage.cleanup_days
        #[arg(long)]
        cleanup: bool,
    },

    /// List the export presets
    Presets,
}

fn parse_unit(s: &str) -> std::result::Result<IntervalUnit, String> {
    match s.to_ascii_lowercase().as_str() {
        "s" | "sec" | "seconds" => Ok(IntervalUnit::Seconds),
        "m" | "min" | "minutes" => Ok(IntervalUnit::Minutes),
        "h" | "hours" => Ok(IntervalUnit::Hours),
        other => Err(format!("unknown interval unit '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting lapsecam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let settings = match TomlSettingsStore::open(&args.config) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            if args.validate_config {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            return Err(e.into());
        }
    };

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    match args.command {
        Some(Command::Presets) => {
            print_presets();
            Ok(())
        }
        Some(Command::Schedule) => {
            let config = settings.snapshot();
            let now = config.scheduling.local_now();
            let active = should_capture_be_active(&config.scheduling, now);
            println!(
                "{}: capture is {}",
                now.format("%Y-%m-%d %H:%M"),
                if active { "active" } else { "inactive" }
            );
            Ok(())
        }
        Some(Command::Storage { cleanup }) => {
            let config = settings.snapshot();
            let storage = StorageManager::new(
                settings,
                Arc::new(EventBus::new(config.system.event_bus_capacity)),
            );
            if cleanup {
                let result = storage
                    .cleanup_old_images(config.storage.cleanup_days)
                    .await?;
                println!(
                    "Deleted {} images ({} bytes)",
                    result.deleted_count, result.deleted_size
                );
                for failure in &result.errors {
                    eprintln!("  {}", failure);
                }
            }
            let info = storage.storage_info().await?;
            println!("Location: {}", info.location.display());
            println!("Images:   {}", info.image_count);
            println!("Videos:   {}", info.video_count);
            println!("Used:     {:.2} GB", bytes_to_gb(info.total_size));
            println!("Limit:    {:.2} GB", bytes_to_gb(info.limit));
            Ok(())
        }
        Some(Command::Timelapse {
            input,
            name,
            output,
            preset,
            fps,
            quality,
            format,
            effect,
            deflicker,
            preserve_aspect_ratio,
            overlay,
            overlay_x,
            overlay_y,
            music,
            music_volume,
        }) => {
            let video = settings.snapshot().video;
            let input = TimelapseInput::Directory(input);
            let mut options = match preset {
                Some(key) => {
                    let preset = find_preset(&key)
                        .with_context(|| format!("unknown export preset '{}'", key))?;
                    TimelapseOptions::from_preset(name, input, preset, &video)
                }
                None => TimelapseOptions::new(name, input, &video),
            };
            if let Some(fps) = fps {
                options.fps = fps;
            }
            if let Some(quality) = quality {
                options.quality = quality;
            }
            if let Some(format) = format {
                options.format = format;
            }
            options.output = output;
            options.effect = effect;
            options.deflicker |= deflicker;
            options.preserve_aspect_ratio |= preserve_aspect_ratio;
            options.overlay = overlay.map(|path| OverlayImage {
                path,
                x: overlay_x,
                y: overlay_y,
            });
            options.music = music.map(|path| MusicTrack {
                path,
                volume: music_volume,
            });

            let service = LapseService::new(settings).await;
            let result = service.assembler().assemble(options).await?;
            println!(
                "✓ {} ({} frames)",
                result.output_path.display(),
                result.frame_count
            );
            Ok(())
        }
        Some(Command::Run {
            start,
            interval,
            unit,
        }) => run_service(settings, args.dry_run, start, interval, unit).await,
        None => run_service(settings, args.dry_run, false, None, IntervalUnit::Seconds).await,
    }
}

async fn run_service(
    settings: Arc<TomlSettingsStore>,
    dry_run: bool,
    start_capture: bool,
    interval: Option<u64>,
    unit: IntervalUnit,
) -> Result<()> {
    let mut service = LapseService::new(settings.clone()).await;

    service.initialize().await.map_err(|e| {
        error!("Failed to initialize service: {}", e);
        e
    })?;

    if dry_run {
        info!("Dry run mode - components initialized but not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    match interval {
        Some(interval) if start_capture => {
            service.start(false).await?;
            service
                .capture()
                .start(CaptureRequest {
                    interval,
                    unit,
                    bypass_scheduling: false,
                })
                .await?;
        }
        _ => service.start(start_capture).await?,
    }

    let exit_code = service.run().await.map_err(|e| {
        error!("Service error during execution: {}", e);
        e
    })?;

    info!("lapsecam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lapsecam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "lapsecam.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# lapsecam configuration file");
    println!("# Every key is optional; missing keys take the values shown here.");
    println!("# Environment overrides use LAPSECAM__SECTION__KEY.");
    println!();
    print!("{}", LapseConfig::default().to_toml()?);
    Ok(())
}

fn print_presets() {
    for preset in EXPORT_PRESETS {
        println!(
            "{:<18} {:>4}x{:<4} {:>3} fps  {:<8} {:>6} kbps  {}",
            preset.key,
            preset.resolution.0,
            preset.resolution.1,
            preset.fps,
            preset.format.extension(),
            preset.bitrate_kbps,
            preset.description
        );
    }
}

fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}
