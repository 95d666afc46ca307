pub mod batch;
pub mod loader;
pub mod split;

pub use batch::{Batch, Sample, IGNORE_LABEL};
pub use loader::{BatchSource, LoaderConfig, MiniBatchLoader};
pub use split::split_ranges;
