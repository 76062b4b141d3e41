pub mod baseline;
pub mod decision;
pub mod engine;
pub mod persistence;
pub mod reconcile;
pub mod registry;
pub mod timeout;

pub use engine::{Collaborators, StrategyEngine};
pub use persistence::FileSnapshotStore;
pub use registry::InstrumentRegistry;
