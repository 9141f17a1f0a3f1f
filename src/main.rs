// =============================================================================
// TRIANGLE BRING-UP - Minimal Vulkan presentation pipeline
// =============================================================================
//
// Draws one hardcoded, vertex-colored triangle every frame to prove the
// whole pipeline is wired: instance -> device -> swapchain -> pipeline ->
// command buffer -> submit -> present.
//
// FRAME FLOW (one frame in flight):
// 1. Wait for the previous frame's fence, reset it
// 2. Acquire a swapchain image
// 3. Re-record the command buffer for that image
// 4. Submit, waiting on image-available, signaling render-finished + fence
// 5. Present, waiting on render-finished
//
// =============================================================================

mod backend;
mod config;
mod error;
mod frame_loop;
mod renderer;
mod window;

use anyhow::{Context, Result};
use config::Config;
use renderer::Renderer;
use std::process::ExitCode;
use window::AppWindow;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    let (config, source) = Config::load();

    init_logging(&config);
    source.report();
    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    match run(&config) {
        Ok(frames) => {
            log::info!("Exiting cleanly after {} frames", frames);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!(target: FATAL_TARGET, "{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log target of the one message that ends the process with a failure.
const FATAL_TARGET: &str = "fatal";

/// `[LEVEL]` tag of a log line; the fatal error gets its own.
fn level_tag(level: log::Level, target: &str) -> String {
    if target == FATAL_TARGET {
        "[FATAL ERROR]".to_string()
    } else {
        format!("[{}]", level)
    }
}

/// Initialize logging as `[LEVEL]: message`. The level comes from the
/// config; `RUST_LOG` overrides it.
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}: {}",
                level_tag(record.level(), record.target()),
                record.args()
            )
        });
    builder.init();
}

/// Bring the pipeline up, draw until the window closes and tear down.
///
/// `renderer` is declared after `window` so it drops first: the surface must
/// be destroyed while the native window still exists.
fn run(config: &Config) -> Result<u64> {
    let mut window = AppWindow::new(&config.window).context("Failed to create the window")?;
    let mut renderer = Renderer::new(config, &window)?;

    window.show();

    let sync = renderer.sync;
    let frames = frame_loop::run(&mut window, &mut renderer, &sync)?;

    Ok(frames)
}
