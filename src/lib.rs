// src/lib.rs

// Top-level modules (each has its own mod.rs or file):
pub mod compression;
pub mod concatenation;
pub mod config;
pub mod error;
pub mod extraction;
pub mod mesh_analysis;
pub mod parser;
pub mod pipeline;
pub mod structs_and_impls;
pub mod volume;
pub mod writer;

pub use compression::CompressedMesh;
pub use concatenation::concatenate_meshes;
pub use config::MeshingConfig;
pub use error::{ConfigError, MeshError, ParseError, VolumeError, WriterError};
pub use mesh_analysis::{GeometricAnalysis, MeshQualityReport, QuadricConfig, SimplifyBackend};
pub use parser::{LabelStack, TiffStackParser};
pub use pipeline::{mesh_label_stack, process_stack_directory, process_stack_directory_with, BatchSummary, StackProgress};
pub use structs_and_impls::{BoundingBox, CompressionMethod, Mesh, MeshFormat};
pub use volume::{BinaryVolume, LabelData, LabelVolume, StackTags};
