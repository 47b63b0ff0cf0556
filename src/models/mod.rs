//! Core data models for harvested author profiles.

mod author;

pub use author::{AuthorRecord, CoauthorRecord, PublicationBuilder, PublicationRecord};
