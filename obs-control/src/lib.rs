pub mod error;
pub mod obs_client;
pub mod protocol;

pub use error::{ObsError, Result};
pub use obs_client::{ObsClient, ObsConfig};
