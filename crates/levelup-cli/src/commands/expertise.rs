use serde_json::json;

use super::{open_engine, print_json, CommandResult};

pub fn run(user: &str) -> CommandResult {
    let (_db, engine) = open_engine()?;

    let domains: Vec<_> = engine
        .expertise(user)?
        .into_iter()
        .map(|record| {
            let progress = record.progress();
            json!({
                "record": record,
                "progress": progress,
            })
        })
        .collect();

    print_json(&json!({
        "user_id": user,
        "total": engine.user_experience(user)?,
        "domains": domains,
    }))
}
