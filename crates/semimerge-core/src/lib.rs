pub mod config;
pub mod files;
pub mod logging;
pub mod manifest;
pub mod printer;
pub mod scenario;
pub mod statistics;

pub use config::{FatalPolicy, Settings};
pub use files::{FileCache, FilesError, FilesTriple};
pub use manifest::{Manifest, ManifestError};
pub use scenario::{Scenario, ScenarioRunner};
pub use statistics::Statistics;
