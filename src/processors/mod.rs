// asset-squeeze/src/processors/mod.rs
pub mod batch;
pub mod compressor;
pub mod geometry;
pub mod loader;
pub mod quantizer;
pub mod sniffer;

pub use batch::{AutoConfirm, BatchPlan, BatchProcessor, Candidate, ConfirmationGate};
pub use compressor::Compressor;
pub use geometry::{CropBand, GeometryNormalizer, GeometryPlan};
pub use loader::{ImageAsset, Loader};
pub use quantizer::Quantizer;

pub mod prelude {
    pub use super::{BatchProcessor, Compressor, GeometryNormalizer, Loader, Quantizer};
}
