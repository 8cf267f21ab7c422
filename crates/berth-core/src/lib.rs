//! Berth Core - foundational types for the release reconciler
//!
//! This crate provides the pieces that never talk to a cluster:
//! - `ChartArtifact`: an in-memory chart loaded from a directory
//! - `DeploymentContext`: what the caller wants deployed, and where
//! - `Release`: the release descriptor exchanged with the release service
//! - `Workspace`: resolution of chart locations against a job workspace

pub mod chart;
pub mod context;
pub mod error;
pub mod release;
pub mod workspace;

pub use chart::{ChartArtifact, ChartFile, ChartMetadata, DirectoryChartLoader, Maintainer};
pub use context::DeploymentContext;
pub use error::{ChartError, CoreError, Result};
pub use release::{ACTIVE_STATUS_CODES, Release, StatusCode};
pub use workspace::Workspace;
