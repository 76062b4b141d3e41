//! Paper collaborators for the surge trading engine.
//!
//! Everything here stays in-process and makes zero network calls: orders
//! are recorded, market data is served from fixed seeds, and snapshots
//! live in a map. Used by the engine's integration tests and the CLI's
//! paper mode.

pub mod gateway;
pub mod market;

pub use gateway::{PaperGateway, PaperOrder};
pub use market::{MemorySnapshotStore, NullSubscriber, PaperMarket};
