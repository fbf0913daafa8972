//! CRX component packager library.
//!
//! This crate packages browser components into signed CRX archives. Each
//! published identity gets a monotonically increasing version reserved in a
//! DynamoDB-compatible registry, a staged copy of its payload with that
//! version written into the manifest, and a signature from a Chromium-based
//! browser. It backs the `crx-package-component` and
//! `crx-package-model-parameters` binaries.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`component`] - Component types, identities and their resolution
//! - [`component_id`] - Component ids derived from public keys
//! - [`config`] - Run configuration assembled from CLI and environment
//! - [`error`] - Semantic error types
//! - [`manifest`] - Manifest templates and version substitution
//! - [`output`] - Run report formatting and exit codes
//! - [`packer`] - Archive signing through an external browser
//! - [`pipeline`] - Packaging pipeline orchestration
//! - [`registry`] - Version registry client and stores
//! - [`stager`] - Staging directory layout and payload copying
//! - [`version`] - Three-part component versions

pub mod cli;
pub mod component;
pub mod component_id;
pub mod config;
pub mod error;
pub mod manifest;
pub mod output;
pub mod packer;
pub mod pipeline;
pub mod registry;
pub mod stager;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
