pub mod admin;
pub mod config;
pub mod entities;
pub mod persistence;
pub mod scripting;
pub mod tasks;
pub mod telemetry;
pub mod world;

use crate::persistence::store::YamlStore;
use crate::tasks::TaskStream;
use crate::telemetry::logging::{log_error, log_game};
use std::io::BufReader;
use std::sync::mpsc;
use std::time::Duration;

pub fn run(args: &[String]) -> Result<(), String> {
    let app = config::AppConfig::from_args(args).map_err(|err| err.to_string())?;
    let config = app.engine_config().map_err(|err| err.to_string())?;
    telemetry::logging::init(&app.root, &config.log_level)?;

    let mut world = world::loader::load_world(&app.root, config.clone()).map_err(|err| err.to_string())?;
    world.set_store(Box::new(YamlStore::from_root(&app.root)));
    if let Err(err) = world.load_globals() {
        log_error(&format!("global values not loaded: {err}"));
    }
    world.defer(Duration::from_millis(config.decay_interval_ms), |world| world.decay_tick());
    world.defer(Duration::ZERO, |world| world.think_tick());
    world.start_autosave();

    println!("tibia: world loaded");
    println!("- root: {}", app.root.display());
    println!("- map: {} ({} tiles)", world.map().name, world.map().tile_count());
    println!("- item types: {}", world.catalog().len());
    log_game(&format!("world {} started", world.map().name));

    let stream = TaskStream::start(world, Duration::from_millis(config.lag_threshold_ms));
    let (stop_tx, stop_rx) = mpsc::channel();
    let console = admin::console::spawn(BufReader::new(std::io::stdin()), stream.handle(), stop_tx);
    if stop_rx.recv().is_err() {
        log_error("console exited without a shutdown signal");
    }

    let mut world = stream.shutdown()?;
    let report = world.global_save();
    if !report.is_clean() {
        for err in &report.player_errors {
            log_error(&format!("final save: {err}"));
        }
        if let Some(err) = &report.globals_error {
            log_error(&format!("final save of global values: {err}"));
        }
    }
    log_game(&format!("shutdown complete, {} players saved", report.saved_players));
    if console.join().is_err() {
        log_error("console thread panicked");
    }
    println!("tibia: shutdown complete");
    Ok(())
}
