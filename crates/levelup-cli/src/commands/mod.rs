pub mod award;
pub mod config;
pub mod expertise;
pub mod habit;
pub mod history;
pub mod suggestion;

use serde::Serialize;
use std::error::Error;
use std::sync::Arc;

use levelup_core::{LevelingConfig, LevelingDb, LevelingEngine};

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Open the database and build an engine from the on-disk config.
pub fn open_engine() -> Result<(Arc<LevelingDb>, LevelingEngine), Box<dyn Error>> {
    let config = LevelingConfig::load()?;
    let db = Arc::new(LevelingDb::open()?);
    let engine = LevelingEngine::with_database(db.clone(), config);
    Ok((db, engine))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
