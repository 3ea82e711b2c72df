//! # Reroller Registry
//!
//! Tag digest resolution for Docker Registry HTTP API V2 compatible hosts.
//!
//! Given a repository and a tag, this crate discovers every content digest
//! currently published under that tag. Rolling tags such as `latest` get
//! re-published over time; comparing the digest a workload runs against this
//! set tells whether the tag has moved.
//!
//! ## Features
//!
//! - **Token Auth**: Anonymous bearer-token negotiation from a
//!   `WWW-Authenticate` challenge
//! - **Schema Probing**: OCI image index, Docker manifest list and Docker
//!   manifest, in that order
//! - **Host Agnostic**: One client per base URL, Docker Hub and GHCR
//!   preconfigured
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reroller_registry::{RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RegistryClient::new(RegistryConfig::docker_hub())?;
//!
//!     let digests = client
//!         .resolve_digests("newrelic/infrastructure-bundle", "1.0.0")
//!         .await?;
//!
//!     for digest in &digests {
//!         println!("{digest}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RegistryClient                           │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌────────────────┐   │
//! │  │  auth       │  │  manifest       │  │  digest        │   │
//! │  │  (token)    │  │  (3 probes)     │  │  (aggregate)   │   │
//! │  └─────────────┘  └─────────────────┘  └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  V2 Registry                                │
//! │     (Docker Hub, GHCR, any Distribution-compatible host)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod auth;
mod client;
mod config;
mod digest;
mod error;
mod hosts;
mod manifest;
mod reference;

pub use auth::{AuthChallenge, BearerToken};
pub use client::{resolve_image_digests, RegistryClient};
pub use config::RegistryConfig;
pub use digest::{aggregate, Digest, DigestSet};
pub use error::RegistryError;
pub use hosts::Registries;
pub use manifest::{ImageIndex, IndexManifest, ManifestProbe, MediaType, Platform};
pub use reference::ImageReference;
