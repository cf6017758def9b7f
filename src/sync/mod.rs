// ABOUTME: Single-table sync engine and its subsystems
// ABOUTME: Column reconciliation, primary-key validation, diffing, DML execution and planning

pub mod columns;
pub mod diff;
pub mod engine;
pub mod executor;
pub mod plan;
pub mod validator;

pub use columns::reconcile_columns;
pub use diff::{compute_diff, DiffSpec, TableDiff, UpdateOp};
pub use engine::{sync_table, PreparedTable, SyncContext};
pub use executor::DmlExecutor;
pub use plan::ExecutionPlan;
pub use validator::{
    check_primary_keys, validate_primary_keys, RejectReason, ValidationMode, ValidationReport,
};
