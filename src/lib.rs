//! Rewards ledger for NeuroSync: points, avatar levels and badges earned
//! through mood logs, focus sessions, journaling, feedback and shared study
//! material.

pub mod activity;
pub mod api;
pub mod analytics;
pub mod config;
pub mod database;
pub mod error;
pub mod focus;
pub mod gamification;
pub mod ledger;
pub mod store;

pub use error::{LedgerError, StoreError};
pub use gamification::{Badge, BadgeType, RewardsRecord};
pub use ledger::{Award, RewardsLedger};
pub use store::{MemoryStore, RewardsStore};
