use argh::FromArgs;
use rtsp_viewer::config::{DecoderBackend, DisplayBackend, ViewerConfig};
use rtsp_viewer::display::open_display;
use rtsp_viewer::pipeline::{PipelineSpec, RtspPipeline};
use rtsp_viewer::session::{PollOptions, Session};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(FromArgs)]
/// Show an H264 RTSP stream in a window until end of stream, error, or 'q'
struct Args {
    /// RTSP URL, e.g. rtsp://192.168.144.25:8554/main.264
    #[argh(positional)]
    url: String,

    /// path to a YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// source latency in milliseconds (default 0)
    #[argh(option)]
    latency: Option<u32>,

    /// decoder backend: software or nvidia
    #[argh(option)]
    decoder: Option<DecoderBackend>,

    /// window title
    #[argh(option)]
    title: Option<String>,

    /// decode without opening a window
    #[argh(switch)]
    headless: bool,
}

fn main() {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> rtsp_viewer::Result<ViewerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = ViewerConfig::from_file(path)?;
            log::info!("Loaded configuration from '{}'", path);
            config
        }
        None => ViewerConfig::default(),
    };

    if let Some(latency) = args.latency {
        config.source.latency = latency;
    }
    if let Some(decoder) = args.decoder {
        config.decoder = decoder;
    }
    if let Some(title) = &args.title {
        config.display.window_title = title.clone();
    }
    if args.headless {
        config.display.backend = DisplayBackend::Headless;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> rtsp_viewer::Result<i32> {
    let config = load_config(&args)?;

    let spec = PipelineSpec::rtsp(&args.url, &config)?;
    log::info!("Opening {} ({})", args.url, spec.describe());

    let mut display = open_display(&config.display)?;

    // Set up Ctrl+C handler
    let interrupt = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let interrupt = interrupt.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            interrupt.store(true, Ordering::Relaxed);
        }
    })?;

    let pipeline = RtspPipeline::launch(&spec)?;

    let report = Session::new(pipeline, PollOptions::from(&config.poll))
        .with_interrupt(interrupt)
        .run(display.as_mut());

    if report.reason.is_error() {
        log::error!("Viewer stopped: {}", report.reason);
    } else {
        log::info!("Viewer stopped: {}", report.reason);
    }

    Ok(report.reason.exit_code())
}
