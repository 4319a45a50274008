//! Post-processing and inspection of extracted meshes.

pub mod geometric_analysis;
pub mod normals;
pub mod simplification;
pub mod smoothing;
pub mod topology;

pub use geometric_analysis::{FaceQuality, GeometricAnalysis, MeshQualityReport};
pub use simplification::{QuadricConfig, SimplifyBackend};
