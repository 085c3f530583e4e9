//! Upgrader Runtime - Cluster access and reconciliation for UpGrade requests
//!
//! Discovery walks Deployment -> ReplicaSet -> Pod, the patcher rewrites
//! container images with one JSON-Patch per Pod, and the controller drives
//! each request through its status lifecycle.

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod api_client;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod patch;
pub mod strategy;

pub use api_client::ApiClient;
pub use cluster::ClusterClient;
pub use config::ClientConfig;
pub use controller::{ReconcileAction, UpgradeController, UpgradeControllerConfig};
pub use discovery::PodDiscovery;
pub use error::{ControllerError, Result};
pub use mock::{MockCluster, MockWrite};
pub use patch::{build_image_patch, ImagePatcher};
pub use strategy::{SequentialHaltOnFailure, StrategyOutcome, UpgradeStrategy};
