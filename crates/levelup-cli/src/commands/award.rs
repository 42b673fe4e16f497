use clap::Args;
use levelup_core::experience_points;
use levelup_core::storage::HabitStore;

use super::{open_engine, print_json, CommandResult};

#[derive(Args)]
pub struct AwardArgs {
    /// User id
    user: String,
    /// Habit id
    habit: String,
    /// Explicit amount (default: derived from the habit level and streak)
    #[arg(long, conflicts_with = "streak")]
    xp: Option<i64>,
    /// Current streak in days; adds a capped bonus
    #[arg(long, default_value_t = 0)]
    streak: u32,
    /// Domain code to credit (repeatable; default: the habit's domains)
    #[arg(long = "domain")]
    domains: Vec<String>,
}

pub fn run(args: AwardArgs) -> CommandResult {
    let (db, engine) = open_engine()?;

    // Unknown habits fall through to the engine, which rejects them.
    let habit = db.get_by_id(&args.habit)?;
    let domains = if args.domains.is_empty() {
        habit
            .as_ref()
            .map(|h| h.domain_codes.clone())
            .unwrap_or_default()
    } else {
        args.domains
    };
    let xp = args
        .xp
        .unwrap_or_else(|| experience_points(habit.as_ref().and_then(|h| h.level), args.streak));

    let outcome = engine.award(&args.user, &args.habit, &domains, xp)?;
    for degradation in &outcome.degraded {
        tracing::warn!("award degraded: {:?}", degradation);
    }
    print_json(&outcome)
}
