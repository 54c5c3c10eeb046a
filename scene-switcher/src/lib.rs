pub mod types;
pub mod config;
pub mod fetcher;
pub mod sources;
pub mod detectors;
pub mod detection;
pub mod source_pool;
pub mod aggregator;
pub mod arbitration;
pub mod controller;
pub mod pipeline;

pub use types::*;
pub use config::{AppConfig, DetectorSettings, ObsSettings};
pub use fetcher::{FetchConfig, Fetcher};
pub use sources::DefaultOpener;
pub use detection::DetectorAdapter;
pub use source_pool::SourcePool;
pub use aggregator::{CycleScore, OccupancyScorer};
pub use arbitration::{ArbitrationOutcome, ArbitrationScheduler, Phase};
pub use controller::{connect_obs, SwitchControllerAdapter};
pub use pipeline::SceneSwitcher;
