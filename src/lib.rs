//! Subscription Tracker Library
//!
//! Calendar and payment provider integrations. Re-exports modules for
//! integration testing and the server binary.

pub mod api;
pub mod config;
pub mod credential_store;
pub mod db;
pub mod domain;
mod error;
pub mod jobs;
pub mod oauth;
pub mod orchestrator;
pub mod payments;
pub mod providers;

pub use config::Config;
pub use domain::{
    IntegrationError, IntegrationFailure, IntegrationRequest, IntegrationResult, Money,
    OperationContext, ProviderKind,
};
pub use error::{AppError, AppResult};
