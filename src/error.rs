use std::io;    // Import I/O module for error handling
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading meshes, volumes or configuration from bytes.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),                     // File I/O errors (e.g., file not found)

    #[error("Format error: {0}")]
    FormatError(String),                            // Malformed data, unexpected structure

    #[error("Number parse error: {0}")]
    NumberParseError(String),                       // Failed number conversions (invalid float/int strings)

    #[error("TIFF decoding error: {0}")]
    TiffError(#[from] tiff::TiffError),             // Label stacks that the TIFF decoder rejects
}

// Implement automatic conversion from float parsing errors
// This allows us to use ? when parsing vertex coordinates
impl From<std::num::ParseFloatError> for ParseError {
    fn from(err: std::num::ParseFloatError) -> Self {
        ParseError::NumberParseError(format!("Float parse error: {}", err))
    }
}

// Implement automatic conversion from integer parsing errors
// This allows us to use ? when parsing face indices
impl From<std::num::ParseIntError> for ParseError {
    fn from(err: std::num::ParseIntError) -> Self {
        ParseError::NumberParseError(format!("Int parse error: {}", err))
    }
}

impl From<std::num::TryFromIntError> for ParseError {
    fn from(err: std::num::TryFromIntError) -> Self {
        ParseError::NumberParseError(format!("Integer conversion error: {}", err))
    }
}

// Writer errors for output operations
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid mesh data: {0}")]
    InvalidData(String),

    #[error("VTK error: {0}")]
    VtkError(String),
}

impl From<vtkio::Error> for WriterError {
    fn from(err: vtkio::Error) -> Self {
        WriterError::VtkError(format!("{:?}", err))
    }
}

/// Volume construction and label-stack errors
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Volume shape {shape:?} needs {expected} voxels, got {actual}")]
    ShapeMismatch {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("Label stack {0} contains no pages")]
    EmptyStack(String),

    #[error("Page {page} has shape {actual:?}, expected {expected:?}")]
    PageShapeMismatch {
        page: usize,
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("Unsupported sample type in label stack: {0}")]
    UnsupportedSampleType(String),

    #[error("Downsample factor {0} must be a whole number of at least 1")]
    FractionalDownsample(f64),
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Top-level error type for mesh operations
#[derive(Debug, Error)]
pub enum MeshError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Mesh normals do not correspond to vertices: {mismatches} mismatches out of {meshes} meshes (first offending mesh: {first})")]
    NormalsMismatch {
        mismatches: usize,
        meshes: usize,
        first: usize,
    },

    #[error("Face {face} refers to vertex {index}, but the mesh has only {vertex_count} vertices")]
    FaceIndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    #[error("Simplification fraction must be in (0, 1], got {0}")]
    InvalidFraction(f64),

    #[error("Got {blocks} blocks but {boxes} bounding boxes")]
    BlockCountMismatch { blocks: usize, boxes: usize },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Simplification failed: {0}")]
    Simplify(String),
}

impl From<lz4_flex::block::DecompressError> for MeshError {
    fn from(err: lz4_flex::block::DecompressError) -> Self {
        MeshError::Compression(err.to_string())
    }
}

impl From<postcard::Error> for MeshError {
    fn from(err: postcard::Error) -> Self {
        MeshError::Compression(err.to_string())
    }
}
