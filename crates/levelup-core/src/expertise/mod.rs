//! Experience accrual per occupation domain.
//!
//! Completions earn experience points ([`crate::formula`]), which are split
//! across the habit's domains ([`distribution`]) and credited to the
//! per-user domain ledger ([`ledger`]). [`award`] ties the steps together.

pub mod award;
pub mod distribution;
pub mod ledger;

pub use award::{AwardCoordinator, AwardOutcome, DomainUpdate, LevelChange};
pub use distribution::{distribute, DomainShare, GENERAL_DOMAIN_CODE, GENERAL_DOMAIN_NAME};
pub use ledger::{
    AwardWrite, ExpertiseLedger, ExpertiseRecord, LedgerUpdate, LevelProgress, PointsCredit,
    UserExperience,
};
