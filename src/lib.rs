//! feature-lens: serializes a feature hierarchy into graph payloads for a
//! visualization, encodes feature history series, and applies validated
//! structural edits requested by that visualization.

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod metrics;
pub mod models;
pub mod protocol;
pub mod serializer;
