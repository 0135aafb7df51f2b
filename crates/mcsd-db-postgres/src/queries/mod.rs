//! Hand-written `sqlx-core` queries, organized by the table group they touch.

pub mod directory;
pub mod resource_map;
