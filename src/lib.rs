//! Budgetpal: a personal finance monitoring daemon.
//!
//! Once a day the daemon fetches recent bank transactions from Plaid,
//! computes spending statistics, and delivers a formatted status message
//! over Twilio (WhatsApp first, SMS as fallback).
//!
//! # Architecture
//!
//! Three components, leaves first:
//! - **calculator**: pure spending math over a transaction list
//! - **notifier**: message formatting plus the address-variant and channel
//!   fallback delivery machine
//! - **scheduler**: the daily timer, the single in-flight guard, and the
//!   fetch → calculate → notify pipeline
//!
//! External collaborators (Plaid, Twilio) sit behind traits so the pipeline
//! is testable without network access. A small axum control surface exposes
//! liveness and a manual trigger.

pub mod calculator;
pub mod config;
pub mod error;
pub mod notifier;
pub mod plaid;
pub mod scheduler;
pub mod server;
pub mod twilio;

pub use calculator::{SpendingReport, Transaction};
pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use notifier::Notifier;
pub use scheduler::Scheduler;
