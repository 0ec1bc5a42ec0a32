use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use tioga::core::backend::HeadlessBackend;
use tioga::core::errors::ServerError;
use tioga::core::render::headless::{HeadlessGpu, HeadlessSwapchain};
use tioga::core::render::{GpuContext, Swapchain};
use tioga::core::types::Extent;
use tioga::{run, Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "tioga", version = tioga::version::VERSION, about = "Wayland compositor")]
struct Args {
    /// Socket name under $XDG_RUNTIME_DIR
    #[arg(long, default_value = "wayland-1")]
    socket: String,

    /// Log verbosity
    #[arg(long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: String,

    /// Log destination instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    if let Err(err) = tioga::util::logging::init(level, args.log_file.as_deref()) {
        eprintln!("tioga: {err:#}");
        return ExitCode::from(1);
    }

    tracing::info!("tioga {} starting", tioga::version::VERSION);
    if let Ok(wallpaper) = std::env::var("WALLPAPER") {
        // Decoding is delegated to the image-loading collaborator;
        // without one the background colour is used.
        tracing::warn!("WALLPAPER={} set but no image decoder is wired in", wallpaper);
    }

    let config = ServerConfig { socket_name: args.socket };
    let server = Server::new(
        config,
        Box::new(HeadlessBackend::new()),
        Box::new(HeadlessGpu::new()),
        Box::new(|gpu: &mut dyn GpuContext, extent: Extent| {
            HeadlessSwapchain::new(gpu, extent).map(|chain| Box::new(chain) as Box<dyn Swapchain>)
        }),
    );

    let server = match server {
        Ok(server) => server,
        Err(err @ ServerError::GpuFeatureMissing(_)) => {
            eprintln!("tioga: {err}");
            return ExitCode::from(2);
        }
        Err(err) => {
            eprintln!("tioga: {err}");
            return ExitCode::from(1);
        }
    };

    match run(server) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tioga: {err}");
            ExitCode::from(1)
        }
    }
}
