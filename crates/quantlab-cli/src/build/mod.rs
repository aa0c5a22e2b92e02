pub mod executor;
pub mod lock;
pub mod manifest;
pub mod planner;
pub mod process;

pub use executor::{BuildExecutor, BuildOptions, BuildResult};
pub use lock::BuildLock;
pub use manifest::{BuildManifest, ManifestEntry, ManifestSource};
pub use planner::{BuildDecision, BuildPlanner};
pub use process::{CancelToken, OutputTail};
