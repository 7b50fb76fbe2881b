//! Core data models for the file storage engine.
//!
//! `object` holds what providers exchange, `file` the metadata records kept
//! alongside, and `report` the results of maintenance workflows.

pub mod backend;
pub mod file;
pub mod object;
pub mod report;
