//! # photzp
//!
//! Photometric zeropoint calibration and long-term throughput trends for a
//! robotic telescope network.
//!
//! Each image's detections are cross-matched against a reference star
//! catalog and a zeropoint plus color term is fitted with iterative outlier
//! rejection. The stored zeropoints of a telescope are reduced to an upper
//! envelope that tracks mirror throughput, which is then split at mirror
//! maintenance events into linear decay segments.
//!
//! ## Architecture
//!
//! - [`models`]: Domain types (images, catalogs, calibrations, trends)
//! - [`algorithms`]: Cross-match, robust fit, envelope, segmentation
//! - [`collaborators`]: Traits for image access, reference catalog and photometry
//! - [`config`]: TOML configuration and the bundled network defaults
//! - [`db`]: Record store traits with local and Postgres backends
//! - [`services`]: Per-image pipeline, batch processing and trend rebuilds
//!
//! ## Example
//!
//! ```ignore
//! use photzp::{config::PhotzpConfig, context::PipelineContext, db::RepositoryFactory};
//!
//! let store = RepositoryFactory::from_env().await?;
//! let ctx = PipelineContext::new(store, PhotzpConfig::bundled()?);
//! let summary = photzp::services::process_batch(&ctx, &keys, collaborators, false, &cancel).await?;
//! let trend = photzp::services::rebuild_trend(&ctx, &telescope, "gp").await?;
//! ```

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::{ConfigError, PhotzpConfig};
pub use context::PipelineContext;
pub use error::{CalibrationStage, Rejection, RejectionReason};
