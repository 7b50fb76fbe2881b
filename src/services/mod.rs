//! Storage engine: providers, backend selection and the workflows built on
//! top of them.

pub mod database_provider;
pub mod error;
pub mod filesystem_provider;
pub mod locks;
mod maintenance;
mod migration;
pub mod orchestrator;
pub mod provider;
pub mod record_store;
pub mod upload_service;
