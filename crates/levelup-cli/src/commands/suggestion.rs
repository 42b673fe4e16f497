use clap::ValueEnum;
use levelup_core::Response;

use super::{open_engine, print_json, CommandResult};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Decision {
    Accept,
    Dismiss,
}

impl From<Decision> for Response {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accept => Response::Accept,
            Decision::Dismiss => Response::Dismiss,
        }
    }
}

pub fn scan(user: &str) -> CommandResult {
    let (_db, engine) = open_engine()?;
    let created = engine.scan(user)?;
    print_json(&created)
}

pub fn list(user: &str) -> CommandResult {
    let (_db, engine) = open_engine()?;
    let pending = engine.pending_suggestions(user)?;
    print_json(&pending)
}

pub fn respond(id: &str, decision: Decision) -> CommandResult {
    let (_db, engine) = open_engine()?;
    let outcome = engine.respond(id, decision.into())?;
    for degradation in &outcome.degraded {
        tracing::warn!("respond degraded: {:?}", degradation);
    }
    print_json(&outcome)
}
