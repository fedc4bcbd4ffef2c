//! Datasets: in-memory representation, CSV loading, and synthetic generation.

pub mod dataset;
pub mod loader;
pub mod synthetic;

pub use dataset::{Dataset, DatasetError};
pub use loader::{load_dataset, parse_dataset, write_dataset, DatasetMetadata, LoadError};
pub use synthetic::{generate, SyntheticConfig};
