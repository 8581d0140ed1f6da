pub mod dataset;
pub mod decomposition;
pub mod grouping;
pub mod preparation;

pub use dataset::Dataset;
pub use decomposition::{ErrorStrategy, FitReport, TimeseriesDecomposition};
