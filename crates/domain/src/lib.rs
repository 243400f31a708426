//! toot-mirror domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `normalize`: HTML to plain-text conversion of source posts
//! - `checkpoint`: Checkpoint derived from the target feed
//! - `usecases`: Composition and the mirror engine

pub mod checkpoint;
pub mod model;
pub mod normalize;
pub mod ports;
pub mod usecases;

pub use checkpoint::FeedIntrospectionCheckpoint;
pub use model::*;
pub use normalize::{ContentError, normalize};
pub use ports::*;
