//! Application use cases / business logic

pub mod compose;
pub mod mirror;

pub use compose::PostComposer;
pub use mirror::{EventOutcome, MirrorConfig, MirrorEngine, MirrorError, collect_pending};
