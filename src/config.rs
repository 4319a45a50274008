use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mesh_analysis::SimplifyBackend;
use crate::structs_and_impls::MeshFormat;

/// Settings for batch meshing of label stacks.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshingConfig {
    pub smoothing_rounds: usize,            // Laplacian smoothing passes after marching
    pub simplify_ratio: Option<f64>,        // Fraction of faces to keep; None skips decimation
    pub step_size: usize,                   // Sample every n-th voxel during extraction
    pub output_format: MeshFormat,
    pub crop_to_content: bool,              // Mesh only the nonzero bounding box (plus a zero border)
    pub simplify_backend: SimplifyBackend,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            smoothing_rounds: 3,
            simplify_ratio: None,
            step_size: 1,
            output_format: MeshFormat::Obj,
            crop_to_content: true,
            simplify_backend: SimplifyBackend::default(),
        }
    }
}

impl MeshingConfig {
    /// Load and validate a config from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MeshingConfig = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_size == 0 {
            return Err(ConfigError::Invalid("step_size must be at least 1".to_string()));
        }
        if let Some(ratio) = self.simplify_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "simplify_ratio must be in (0, 1], got {}",
                    ratio
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_analysis::QuadricConfig;

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshing.toml");
        fs::write(&path, "").unwrap();
        assert_eq!(MeshingConfig::load_from_file(&path).unwrap(), MeshingConfig::default());
    }

    #[test]
    fn test_full_config_parses() {
        let config: MeshingConfig = toml::from_str(
            r#"
            smoothing_rounds = 0
            simplify_ratio = 0.2
            step_size = 2
            output_format = "ngmesh"
            crop_to_content = false

            [simplify_backend]
            kind = "quadric"
            aggressiveness = 6.0
            "#,
        )
        .unwrap();
        assert_eq!(config.smoothing_rounds, 0);
        assert_eq!(config.simplify_ratio, Some(0.2));
        assert_eq!(config.output_format, MeshFormat::Ngmesh);
        assert_eq!(
            config.simplify_backend,
            SimplifyBackend::Quadric(QuadricConfig {
                aggressiveness: 6.0,
                ..QuadricConfig::default()
            })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_and_bad_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshing.toml");

        fs::write(&path, "smoothing = 3\n").unwrap();
        assert!(matches!(MeshingConfig::load_from_file(&path), Err(ConfigError::Toml { .. })));

        fs::write(&path, "simplify_ratio = 1.5\n").unwrap();
        assert!(matches!(MeshingConfig::load_from_file(&path), Err(ConfigError::Invalid(_))));

        fs::write(&path, "step_size = 0\n").unwrap();
        assert!(matches!(MeshingConfig::load_from_file(&path), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            MeshingConfig::load_from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
