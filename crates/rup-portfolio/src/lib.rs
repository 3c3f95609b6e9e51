//! rup-portfolio
//!
//! Responsibilities (pure, no IO, no store):
//! - Split one round-up amount across weighted ticker candidates with an
//!   exact-sum guarantee ([`allocator`]).
//! - Fold persisted holdings into a read-only portfolio view ([`holdings`]).
//!
//! Everything here is deterministic — two calls with the same inputs always
//! produce identical output.

pub mod allocator;
pub mod holdings;

pub use allocator::{allocate, Allocation, AllocationError, WeightedCandidate, MAX_ALLOCATION_TICKERS};
pub use holdings::PortfolioSnapshot;
