//! Repositories: one zero-sized struct per table with async functions that
//! take the pool explicitly.

pub mod decision_repo;
pub mod operation_repo;

pub use decision_repo::DecisionRecordRepo;
pub use operation_repo::OperationRepo;
