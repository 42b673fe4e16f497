use chrono::{Duration, Utc};
use clap::Args;
use levelup_core::history::domain_entity_id;
use levelup_core::{EntityType, HistoryQuery, ReasonCategory};

use super::{open_engine, print_json, CommandResult};

#[derive(Args)]
pub struct HistoryArgs {
    /// Only entries for this habit
    #[arg(long, conflicts_with = "domain")]
    habit: Option<String>,
    /// Only entries for this domain (requires --user)
    #[arg(long, requires = "user")]
    domain: Option<String>,
    /// User owning --domain
    #[arg(long)]
    user: Option<String>,
    /// level_up, level_down or re_assessment
    #[arg(long, value_parser = parse_category)]
    category: Option<ReasonCategory>,
    /// Only entries from the last N days
    #[arg(long)]
    days: Option<i64>,
    /// Maximum number of entries
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

fn parse_category(s: &str) -> Result<ReasonCategory, String> {
    ReasonCategory::parse(s)
        .ok_or_else(|| format!("unknown category '{s}' (expected level_up, level_down or re_assessment)"))
}

pub fn run(args: HistoryArgs) -> CommandResult {
    let (_db, engine) = open_engine()?;

    let mut query = match (&args.habit, &args.domain, &args.user) {
        (Some(habit), _, _) => HistoryQuery::for_entity(EntityType::Habit, habit.as_str()),
        (None, Some(domain), Some(user)) => {
            HistoryQuery::for_entity(EntityType::Domain, domain_entity_id(user, domain))
        }
        _ => HistoryQuery::default(),
    };
    if let Some(category) = args.category {
        query = query.in_category(category);
    }
    if let Some(days) = args.days {
        let now = Utc::now();
        query = query.between(now - Duration::days(days), now);
    }
    query = query.limit(args.limit);

    let entries = engine.history(&query)?;
    print_json(&entries)
}
