use crate::cli::{Cli, Commands, TuningArgs};
use anyhow::{Context, Result};
use hdr2sdr::config::Config;
use hdr2sdr::engine::{
    self, CapabilityWarning, CommandBuilder, ConversionObserver, ConversionRequest, FfprobeProbe,
    FilterKind, FramePreviewPipeline, JobId, MediaProbe, Platform, ProcessSupervisor,
    SupervisorState, SystemLauncher, TerminalState,
};
use image::RgbImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

const DISPATCH_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(cli: Cli) {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: {:#}; using built-in defaults", e);
        Config::default()
    });

    match cli.command {
        Commands::Convert {
            input,
            output,
            tuning,
            force,
            codec,
            gpu,
            cpu,
            dry_run,
        } => {
            let output = output.unwrap_or_else(|| engine::default_output_path(&input));
            let mut request = config.defaults.request(input, output);
            apply_tuning(&mut request, &tuning);
            if let Some(codec) = codec {
                request.codec = codec;
            }
            if gpu {
                request.use_gpu = true;
            } else if cpu {
                request.use_gpu = false;
            }
            engine::downgrade_unavailable_gpu(&mut request, &config.tools.tool_paths());

            if dry_run {
                handle_dry_run(&config, request)
            } else {
                if let Err(e) = engine::check_overwrite(&request.output_path, force) {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
                handle_convert(&config, request)
            }
        }
        Commands::Probe { file, json } => handle_probe(&config, &file, json),
        Commands::Preview {
            input,
            output,
            converted,
            compare,
            tuning,
            timestamp,
            frame,
        } => {
            let mode = if compare {
                PreviewMode::Compare
            } else if converted {
                PreviewMode::Converted
            } else {
                PreviewMode::Original
            };
            handle_preview(&config, &input, &output, mode, &tuning, timestamp, frame)
        }
        Commands::CheckGpu => handle_check_gpu(&config),
        Commands::CheckFfmpeg => handle_check_ffmpeg(&config),
        Commands::InitConfig => handle_init_config(),
    }
}

fn apply_tuning(request: &mut ConversionRequest, tuning: &TuningArgs) {
    if let Some(gamma) = tuning.gamma {
        request.gamma = gamma;
    }
    if let Some(filter) = tuning.filter {
        request.filter_kind = filter;
    }
    if let Some(tonemap) = tuning.tonemap {
        request.tonemap = tonemap;
    }
}

/// Prints progress on one rewritten line and remembers the outcome
#[derive(Default)]
struct ConsoleObserver {
    last_percent: Option<u32>,
    outcome: Option<TerminalState>,
}

impl ConversionObserver for ConsoleObserver {
    fn on_progress(&mut self, _job: JobId, percent: f64) {
        let shown = percent.clamp(0.0, 100.0).floor() as u32;
        if self.last_percent != Some(shown) {
            self.last_percent = Some(shown);
            eprint!("\rConverting... {:>3}%", shown);
            let _ = std::io::stderr().flush();
        }
    }

    fn on_terminal(&mut self, _job: JobId, state: TerminalState) {
        if self.last_percent.take().is_some() {
            eprintln!();
        }
        match &state {
            TerminalState::Completed { output } => {
                println!("Conversion complete! Output saved to: {}", output.display());
            }
            TerminalState::Failed { code, diagnostics } => {
                eprintln!("Conversion failed with code {:?}", code);
                for line in diagnostics.iter().rev().take(10).rev() {
                    eprintln!("  {}", line);
                }
            }
            TerminalState::Cancelled => eprintln!("Video conversion has been cancelled."),
            TerminalState::Retrying { .. } => {
                eprintln!("GPU encoding failed. Retrying with CPU encoding...");
            }
        }
        self.outcome = Some(state);
    }

    fn on_warning(&mut self, _job: JobId, warning: CapabilityWarning) {
        eprintln!("Warning: {}", warning);
    }
}

fn handle_convert(config: &Config, request: ConversionRequest) {
    let tools = config.tools.tool_paths();
    let mut supervisor = ProcessSupervisor::new(
        FfprobeProbe::new(&tools.ffprobe),
        CommandBuilder::new(&tools.ffmpeg, Platform::current()),
        SystemLauncher,
    )
    .with_transcript_log(true);

    let mut observer = ConsoleObserver::default();

    // Ctrl-C only raises the flag; cancelling happens on this thread
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    if let Err(e) = supervisor.start(request) {
        // Spawn failures were queued as Failed; flush so the message prints once
        supervisor.dispatch_pending(&mut observer);
        if observer.outcome.is_none() {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }

    supervisor.drive_until_settled(&mut observer, DISPATCH_INTERVAL, &interrupt);

    match supervisor.state() {
        SupervisorState::Completed => process::exit(0),
        SupervisorState::Cancelled => process::exit(130),
        _ => process::exit(1),
    }
}

fn handle_dry_run(config: &Config, request: ConversionRequest) {
    match build_dry_run(config, &request) {
        Ok(cmd) => {
            for warning in &cmd.warnings {
                eprintln!("Warning: {}", warning);
            }
            println!("{}", cmd.to_shell_string());
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn build_dry_run(config: &Config, request: &ConversionRequest) -> Result<engine::BuiltCommand> {
    let tools = config.tools.tool_paths();
    let request = engine::validate_request(request)?;
    let probe = FfprobeProbe::new(&tools.ffprobe);

    let mut props = probe
        .probe(&request.input_path)
        .context("Failed to retrieve video properties")?;
    if request.filter_kind == FilterKind::Dynamic {
        props.max_frame_average_light = probe.max_frame_average_light(&request.input_path);
    }

    Ok(CommandBuilder::new(&tools.ffmpeg, Platform::current()).build(&request, &props))
}

fn handle_probe(config: &Config, file: &Path, json: bool) {
    let probe = FfprobeProbe::new(&config.tools.ffprobe);
    match probe.probe(file) {
        Ok(props) if json => match serde_json::to_string_pretty(&props) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        Ok(props) => {
            println!("Resolution: {}x{}", props.width, props.height);
            println!("Video codec: {}", props.codec_name);
            println!("Video bitrate: {} b/s", props.bit_rate);
            println!("Frame rate: {:.3} fps", props.frame_rate);
            println!("Duration: {:.2} seconds", props.duration);
            if props.has_audio() {
                println!(
                    "Audio: {} @ {} b/s",
                    props.audio_codec, props.audio_bit_rate
                );
            } else {
                println!("Audio: none");
            }
            for sub in &props.subtitle_streams {
                println!(
                    "Subtitle #{}: {} ({})",
                    sub.index,
                    sub.codec_name,
                    sub.language.as_deref().unwrap_or("und")
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewMode {
    Original,
    Converted,
    /// Original and converted side by side
    Compare,
}

fn handle_preview(
    config: &Config,
    input: &Path,
    output: &Path,
    mode: PreviewMode,
    tuning: &TuningArgs,
    timestamp: Option<f64>,
    frame: Option<usize>,
) {
    match render_preview(config, input, mode, tuning, timestamp, frame)
        .and_then(|img| save_png(&img, output))
    {
        Ok(()) => println!("Preview saved to {}", output.display()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn render_preview(
    config: &Config,
    input: &Path,
    mode: PreviewMode,
    tuning: &TuningArgs,
    timestamp: Option<f64>,
    frame: Option<usize>,
) -> Result<RgbImage> {
    let pipeline = FramePreviewPipeline::new(
        &config.tools.ffmpeg,
        FfprobeProbe::new(&config.tools.ffprobe),
    );
    let defaults = &config.defaults;
    let gamma = tuning.gamma.unwrap_or(defaults.gamma);
    let kind = tuning.filter.unwrap_or(defaults.filter);
    let tonemap = tuning.tonemap.unwrap_or(defaults.tonemap);
    engine::validate::validate_gamma(gamma)?;

    let timestamp = match frame {
        Some(index) => {
            let total = defaults.preview_frames;
            if index == 0 || index > total {
                anyhow::bail!("--frame must be between 1 and {}", total);
            }
            let props = pipeline.probe_with_duration(input)?;
            Some(engine::frame_position(index, total, props.duration))
        }
        None => timestamp,
    };

    match mode {
        PreviewMode::Original => Ok(pipeline.extract_frame(input, timestamp)?),
        PreviewMode::Converted => Ok(pipeline
            .extract_frame_with_conversion(input, gamma, kind, tonemap, timestamp)?),
        PreviewMode::Compare => {
            // Converted at neutral gamma, then adjusted locally like the slider
            let pair = pipeline.preview_pair(input, kind, tonemap, timestamp)?;
            let converted = engine::gamma_adjust(&pair.converted, gamma);
            Ok(side_by_side(&pair.original, &converted))
        }
    }
}

fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let width = left.width() + right.width();
    let height = left.height().max(right.height());
    let mut canvas = RgbImage::new(width, height);
    image::imageops::replace(&mut canvas, left, 0, 0);
    image::imageops::replace(&mut canvas, right, i64::from(left.width()), 0);
    canvas
}

fn save_png(img: &RgbImage, output: &Path) -> Result<()> {
    img.save_with_format(output, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", output.display()))
}

fn handle_check_gpu(config: &Config) {
    let report = engine::gpu_report(&config.tools.tool_paths());
    println!("=== NVENC Hardware Encoding ===");
    println!(
        "   {}: {}",
        config.tools.gpu_query.display(),
        if report.gpu_tool_ok { "OK" } else { "FAIL" }
    );
    if let Some(ref model) = report.gpu_model {
        println!("   GPU model: {}", model);
    }
    println!(
        "   FFmpeg {}: {}",
        engine::hardware::GPU_ENCODER,
        if report.encoder_ok { "OK" } else { "FAIL" }
    );

    match report.error_message {
        None => {
            println!("GPU encoding available");
            process::exit(0);
        }
        Some(msg) => {
            println!("GPU encoding unavailable: {}", msg);
            process::exit(1);
        }
    }
}

fn handle_check_ffmpeg(config: &Config) {
    match engine::ffmpeg_version(&config.tools.ffmpeg) {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match engine::ffprobe_version(&config.tools.ffprobe) {
                Ok(probe_version) => {
                    println!("ffprobe found: {}", probe_version);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_init_config() {
    let path: Option<PathBuf> = Config::config_path().ok();
    if Config::exists() {
        match Config::load() {
            Ok(cfg) => {
                if let Some(path) = &path {
                    println!("Config loaded successfully from {}", path.display());
                }
                println!("{:#?}", cfg);
            }
            Err(e) => {
                eprintln!("Config invalid: {:#}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Creating default config...");
    if let Err(err) = Config::ensure_default() {
        eprintln!("Failed to save default config: {:#}", err);
        process::exit(1);
    }
    match path {
        Some(path) => println!("Default config saved to {}", path.display()),
        None => println!("Default config saved (path unknown)"),
    }
}
