//! Shared types and models for the Vineyard Climate Platform
//!
//! This crate contains the canonical observation types, the vintage-year
//! calendar, and the agro-climatic index math shared between the ingestion
//! pipeline and other components of the system.

pub mod indices;
pub mod models;
pub mod types;
pub mod validation;
pub mod vintage;

pub use indices::*;
pub use models::*;
pub use types::*;
pub use validation::*;
pub use vintage::*;
