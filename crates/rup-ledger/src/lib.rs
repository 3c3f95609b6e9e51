//! rup-ledger
//!
//! Round-up math and the ledger/queue write path:
//! - `roundup`: round-up and platform-fee arithmetic on integer cents
//! - `state`: transaction status transitions with idempotent replay
//! - `manager`: ledger entries, queued orders, placeholders and back-fill
//!
//! Ledger writes are idempotent per transaction; queue writes tolerate
//! partial failure without rolling the ledger entry back.

pub mod manager;
pub mod roundup;
pub mod state;

pub use manager::{LedgerQueueManager, QueueWriteSummary};
pub use roundup::{breakdown, compute_round_up, RoundUpBreakdown};
pub use state::{apply, TransitionError, TxEvent};
