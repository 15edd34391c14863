//! Statement-level access to each table.
//!
//! Functions that run a single statement are generic over the executor, so
//! callers pass either the pool or `&mut *tx`. Functions that need several
//! statements take a connection directly.

pub mod audit;
pub mod passcodes;
pub mod roles;
pub mod sessions;
pub mod users;

pub use passcodes::NewPasscodeRecord;
pub use users::FailureState;
