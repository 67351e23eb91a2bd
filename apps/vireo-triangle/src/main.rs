//! Vireo triangle demo
//!
//! Draws a single vertex-colored triangle through the full frame loop:
//! swapchain acquire, render pass, present, and rebuilds on resize.
//!
//! ## Usage
//!
//! Compile the shaders in `shaders/` to SPIR-V first (see its README), then:
//!
//! ```bash
//! cargo run -p vireo-triangle -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--no-vsync`: Prefer mailbox presentation when available
//! - `--fullscreen`: Start in borderless fullscreen
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set console log level (e.g., info, debug, trace)

mod app;

use vireo_app::{run_app, AppConfig, FullscreenState};
use vireo_core::Version;

use crate::app::TriangleApp;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let fullscreen = if args.iter().any(|arg| arg == "--fullscreen") {
        FullscreenState::Borderless
    } else {
        FullscreenState::Normal
    };

    run_app::<TriangleApp>(
        AppConfig::new("Vireo Triangle")
            .with_version(Version::new(0, 1, 0))
            .with_size(WIDTH, HEIGHT)
            .with_vsync(!args.iter().any(|arg| arg == "--no-vsync"))
            .with_fullscreen(fullscreen),
    )
}

fn print_help() {
    println!(
        "Vireo Triangle

USAGE:
    vireo-triangle [OPTIONS]

OPTIONS:
    --no-vsync      Prefer mailbox presentation when available
    --fullscreen    Start in borderless fullscreen
    -h, --help      Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG        Set console log level (e.g., info, debug, trace)"
    );
}
