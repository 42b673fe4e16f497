//! # Levelup Core Library
//!
//! Adaptive leveling for habits and occupation-domain expertise. Habit
//! completions earn experience that is split across the habit's domains;
//! the engine watches completion rates and proposes making a habit harder
//! (level up) or breaking it into a smaller "baby step" (level down).
//! Every level change lands in an append-only history.
//!
//! ## Architecture
//!
//! - **Formulas**: pure experience and level math ([`formula`])
//! - **Expertise**: distribution, ledger and the award workflow ([`expertise`])
//! - **Suggestions**: detection, workload planning and the accept/dismiss
//!   lifecycle ([`suggestion`])
//! - **History**: the level-change audit trail ([`history`])
//! - **Storage**: collaborator traits, SQLite implementation and TOML
//!   configuration ([`storage`])
//!
//! ## Key Components
//!
//! - [`LevelingEngine`]: facade over all workflows
//! - [`LevelingDb`]: SQLite implementation of every store
//! - [`LevelingConfig`]: detection thresholds and retry settings

pub mod engine;
pub mod error;
pub mod expertise;
pub mod formula;
pub mod habit;
pub mod history;
pub mod locks;
pub mod storage;
pub mod suggestion;

pub use engine::{Collaborators, LevelingEngine};
pub use error::{ConfigError, CoreError, Degradation, StoreError, ValidationError};
pub use expertise::{AwardOutcome, DomainUpdate, ExpertiseRecord, LevelChange, UserExperience};
pub use formula::{experience_points, level_from_points, points_for_level, LevelTier};
pub use habit::{Frequency, Habit, HabitPatch};
pub use history::{EntityType, HistoryQuery, HistoryReason, LevelHistoryEntry, ReasonCategory};
pub use storage::{LevelingConfig, LevelingDb};
pub use suggestion::{
    AssessOutcome, LevelSuggestion, ProposedChanges, RespondOutcome, Response, SuggestionStatus,
    SuggestionType,
};
