//! Store Links Core Library
//!
//! This library resolves a Microsoft Store product identifier (or storefront
//! URL) into a set of downloadable package artifacts: APPX/MSIX packages via
//! the legacy Windows Update SOAP protocol, and EXE/MSI/MSIX installers via
//! the StoreEdgeFD package-manifest API.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`client`] - HTTP client construction and endpoint configuration
//! - [`soap`] - SOAP template rendering and transport
//! - [`query`] - The protocol operations (cookie, app info, file list,
//!   Appx correlation, non-Appx manifest resolution)
//! - [`resolve`] - High-level orchestration of a full resolution request
//! - [`format`] - Human-readable byte-size formatting
//!
//! The three SOAP body templates (cookie, file list, secured URL) are
//! collaborator-supplied: the surrounding system loads them from disk or a
//! remote cache and hands them in as strings.
//!
//! # Example
//!
//! ```no_run
//! use storelinks::{ClientConfig, ResolveRequest, StoreClient, Templates};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(templates: Templates) -> Result<(), Box<dyn std::error::Error>> {
//! let client = StoreClient::new(ClientConfig::default())?;
//!
//! let request = ResolveRequest::new("9WZDNCRFJBH4");
//! let outcome = storelinks::resolve_all(
//!     &client,
//!     &templates,
//!     &request,
//!     &CancellationToken::new(),
//! )
//! .await?;
//!
//! for item in &outcome.appx_packages {
//!     println!("{} ({}) -> {}", item.file_name, item.file_size, item.file_link);
//! }
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod format;
pub mod model;
pub mod query;
pub mod resolve;
pub mod soap;

// Re-export commonly used types
pub use client::{ClientConfig, Endpoints, StoreClient};
pub use error::QueryError;
pub use format::format_bytes;
pub use model::{AppInfo, DownloadItem, Templates};
pub use query::nonappx::ManifestDetails;
pub use resolve::{ResolveOutcome, ResolveRequest, parse_product_input, resolve_all};
pub use soap::render_template;
