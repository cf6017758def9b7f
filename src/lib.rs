// ABOUTME: Library crate for table-syncer, file-to-PostgreSQL table synchronization
// ABOUTME: Exposes the config, loader, sync engine and multi-table orchestrator modules

pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod loader;
pub mod orchestrator;
pub mod record;
pub mod sync;
