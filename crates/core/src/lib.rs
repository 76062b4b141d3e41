pub mod clock;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod instrument;
pub mod rounding;
pub mod snapshot;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ProfileConfig, StrategyConfig};
pub use config_loader::ConfigLoader;
pub use error::ConfigError;
pub use events::{DailyBar, FillDirection, FillEvent, OrderStatus, OrderUpdate, TickEvent};
pub use instrument::{InstrumentState, OffsetState};
pub use rounding::round_to_step;
pub use snapshot::{snapshot_key, RegistrySnapshot, SNAPSHOT_VERSION};
pub use traits::{
    BarHistory, CatalogEntry, InstrumentCatalog, MarketSubscriber, OrderGateway, SnapshotStore,
};
