//! Headless frame runner.
//!
//! Usage: `headless [CONFIG.json | -] [FRAMES] [SNAPSHOT_OUT.json]`
//!
//! Prints one JSON line of frame statistics per frame. `-` (or no argument)
//! runs the default scene. Set `RUST_LOG=debug` for per-frame solver logs.

use std::path::Path;

use flip3d::{FluidSolver, SimConfig};

const DEFAULT_FRAMES: u64 = 60;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);

    let config = match args.next() {
        Some(path) if path != "-" => {
            log::info!("Loading config from {}", path);
            SimConfig::load_json(Path::new(&path))?
        }
        _ => SimConfig::default(),
    };
    let frames = match args.next() {
        Some(n) => n.parse::<u64>()?,
        None => DEFAULT_FRAMES,
    };
    let snapshot_path = args.next();

    let mut solver = FluidSolver::new(config)?;

    for _ in 0..frames {
        let stats = solver.step_frame();
        println!("{}", serde_json::to_string(&stats)?);
    }

    if let Some(path) = snapshot_path {
        let json = serde_json::to_string(&solver.snapshot())?;
        std::fs::write(&path, json)?;
        log::info!(
            "Wrote snapshot of {} particles to {}",
            solver.particle_count(),
            path
        );
    }

    Ok(())
}
