//! Batch meshing of TIFF label stacks.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::MeshingConfig;
use crate::error::{MeshError, ParseError, VolumeError};
use crate::parser::tiff_stack::{LabelStack, TiffStackParser};
use crate::structs_and_impls::{BoundingBox, Mesh};

/// Mesh the nonzero voxels of a label stack in full-resolution coordinates.
///
/// Vertices land at `(offset + voxel) * downsample_factor`, with the offset
/// and factor taken from the stack tags. The factor must be a whole number
/// of at least 1, since voxels map onto an integer full-res grid.
pub fn mesh_label_stack(stack: &LabelStack, config: &MeshingConfig) -> Result<Mesh, MeshError> {
    let factor = stack.tags.downsample_factor;
    if !(factor >= 1.0 && factor.fract() == 0.0) {
        return Err(VolumeError::FractionalDownsample(factor).into());
    }

    let Some(content) = stack.volume.nonzero_bounding_box() else {
        debug!("label stack has no foreground; nothing to mesh");
        return Ok(Mesh::empty());
    };

    // One voxel of zero padding closes the surface where content touches the crop edge
    let (mask, start, stop) = if config.crop_to_content {
        let mask = stack.volume.crop(&content).nonzero_mask().padded([1, 1, 1]);
        (mask, content.start.map(|s| s - 1), content.stop.map(|s| s + 1))
    } else {
        let shape = stack.volume.shape().map(|s| s as i32);
        (stack.volume.nonzero_mask(), [0; 3], shape)
    };

    let offset = stack.tags.offset_zyx();
    let to_fullres = |local: [i32; 3]| -> [i32; 3] {
        [0, 1, 2].map(|axis| ((offset[axis] + local[axis] as f64) * factor).round() as i32)
    };
    let fullres_box = BoundingBox::new(to_fullres(start), to_fullres(stop));
    debug!(
        "meshing mask {:?} into full-res box {:?} (factor {})",
        mask.shape(),
        fullres_box,
        factor
    );

    let mut mesh = Mesh::from_binary_vol(&mask, Some(fullres_box), config.step_size)?;
    mesh.laplacian_smooth(config.smoothing_rounds);
    mesh.simplify(config.simplify_ratio, &config.simplify_backend)?;
    Ok(mesh)
}

/// What happened to one stack in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StackOutcome {
    Written { path: PathBuf, faces: usize },
    Skipped { existing: PathBuf },
}

/// Tally of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn record(&mut self, stack_path: &Path, result: &Result<StackOutcome, MeshError>) {
        match result {
            Ok(StackOutcome::Written { .. }) => self.processed += 1,
            Ok(StackOutcome::Skipped { .. }) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                self.failures.push((stack_path.to_path_buf(), e.to_string()));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// All entries of `labels_dir` that are files, in sorted order.
pub fn list_label_stacks(labels_dir: &Path) -> Result<Vec<PathBuf>, MeshError> {
    let pattern = format!("{}/*", glob::Pattern::escape(&labels_dir.to_string_lossy()));
    let mut stacks = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| ParseError::FormatError(format!("bad pattern {}: {}", pattern, e)))? {
        let path = entry.map_err(|e| ParseError::IoError(e.into_error()))?;
        if path.is_file() {
            stacks.push(path);
        }
    }
    stacks.sort();
    Ok(stacks)
}

/// Output path for a stack: `<output_dir>/<stem>.<ext>`.
pub fn output_path_for(stack_path: &Path, output_dir: &Path, config: &MeshingConfig) -> PathBuf {
    let stem = stack_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    output_dir.join(format!("{}.{}", stem, config.output_format.extension()))
}

/// Mesh one stack and write it, unless its output already exists.
pub fn process_stack(stack_path: &Path, output_dir: &Path, config: &MeshingConfig) -> Result<StackOutcome, MeshError> {
    let output_path = output_path_for(stack_path, output_dir, config);
    if output_path.exists() {
        info!(
            "{} already exists; skipping (delete it to reprocess)",
            output_path.display()
        );
        return Ok(StackOutcome::Skipped { existing: output_path });
    }

    info!("Starting {}", stack_path.display());
    let stack = TiffStackParser::parse_file(stack_path)?;
    let mesh = mesh_label_stack(&stack, config)?;
    mesh.write_file(&output_path)?;
    info!(
        "Wrote {} ({} vertices, {} faces)",
        output_path.display(),
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(StackOutcome::Written {
        path: output_path,
        faces: mesh.face_count(),
    })
}

/// Progress report handed to the callback of [`process_stack_directory_with`]
/// after each stack.
#[derive(Debug)]
pub struct StackProgress<'a> {
    pub done: usize,
    pub total: usize,
    pub stack_path: &'a Path,
    pub result: &'a Result<StackOutcome, MeshError>,
}

/// Mesh every stack in `labels_dir` into `output_dir`.
///
/// A failing stack is logged and counted; it does not stop the batch.
pub fn process_stack_directory(
    labels_dir: &Path,
    output_dir: &Path,
    config: &MeshingConfig,
) -> Result<BatchSummary, MeshError> {
    process_stack_directory_with(labels_dir, output_dir, config, |_| {})
}

/// Like [`process_stack_directory`], calling `on_stack` after every stack.
pub fn process_stack_directory_with<F>(
    labels_dir: &Path,
    output_dir: &Path,
    config: &MeshingConfig,
    mut on_stack: F,
) -> Result<BatchSummary, MeshError>
where
    F: FnMut(StackProgress<'_>),
{
    fs::create_dir_all(output_dir)?;
    let stacks = list_label_stacks(labels_dir)?;
    info!("Found {} label stacks in {}", stacks.len(), labels_dir.display());

    let mut summary = BatchSummary::default();
    for (i, stack_path) in stacks.iter().enumerate() {
        let result = process_stack(stack_path, output_dir, config);
        if let Err(e) = &result {
            error!("Failed to mesh {}: {}", stack_path.display(), e);
        }
        summary.record(stack_path, &result);
        debug!("{}/{} stacks done", i + 1, stacks.len());
        on_stack(StackProgress {
            done: i + 1,
            total: stacks.len(),
            stack_path,
            result: &result,
        });
    }

    info!(
        "Batch finished: {} processed, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{LabelVolume, StackTags};

    fn cube_stack(tags: StackTags) -> LabelStack {
        let shape = [10, 10, 10];
        let mut data = vec![0u64; 1000];
        for z in 3..6 {
            for y in 3..6 {
                for x in 4..7 {
                    data[(z * 10 + y) * 10 + x] = 5;
                }
            }
        }
        LabelStack {
            volume: LabelVolume::new(shape, data).unwrap(),
            tags,
        }
    }

    fn no_smoothing() -> MeshingConfig {
        MeshingConfig {
            smoothing_rounds: 0,
            ..MeshingConfig::default()
        }
    }

    #[test]
    fn test_all_zero_stack_gives_empty_mesh() {
        let stack = LabelStack {
            volume: LabelVolume::new([3, 3, 3], vec![0u8; 27]).unwrap(),
            tags: StackTags::default(),
        };
        assert!(mesh_label_stack(&stack, &MeshingConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn test_cropped_mesh_sits_at_the_content() {
        let mesh = mesh_label_stack(&cube_stack(StackTags::default()), &no_smoothing()).unwrap();
        assert!(!mesh.is_empty());
        assert_eq!(mesh.bounding_box(), BoundingBox::new([2, 2, 3], [7, 7, 8]));
        for v in mesh.vertices_zyx() {
            assert!((2.0..=7.0).contains(&v[0]) && (3.0..=8.0).contains(&v[2]), "{:?}", v);
        }
    }

    #[test]
    fn test_crop_does_not_move_the_surface() {
        let cropped = mesh_label_stack(&cube_stack(StackTags::default()), &no_smoothing()).unwrap();
        let whole = mesh_label_stack(
            &cube_stack(StackTags::default()),
            &MeshingConfig {
                crop_to_content: false,
                ..no_smoothing()
            },
        )
        .unwrap();

        let centroid = |m: &Mesh| -> [f32; 3] {
            let n = m.vertex_count() as f32;
            let mut c = [0.0; 3];
            for v in m.vertices_zyx() {
                for axis in 0..3 {
                    c[axis] += v[axis] / n;
                }
            }
            c
        };
        let (a, b) = (centroid(&cropped), centroid(&whole));
        for axis in 0..3 {
            assert!((a[axis] - b[axis]).abs() < 1e-3, "{:?} vs {:?}", a, b);
        }
        assert_eq!(cropped.face_count(), whole.face_count());
    }

    #[test]
    fn test_tags_scale_and_offset_the_mesh() {
        let tags = StackTags {
            offset_xyz: [100.0, 0.0, 10.0],
            downsample_factor: 2.0,
        };
        let mesh = mesh_label_stack(&cube_stack(tags), &no_smoothing()).unwrap();
        // z: (10 + 2) * 2 .. (10 + 7) * 2, x: (100 + 3) * 2 .. (100 + 8) * 2
        assert_eq!(mesh.bounding_box(), BoundingBox::new([24, 4, 206], [34, 14, 216]));
        for v in mesh.vertices_zyx() {
            assert!((24.0..=34.0).contains(&v[0]), "{:?}", v);
            assert!((206.0..=216.0).contains(&v[2]), "{:?}", v);
        }
    }

    #[test]
    fn test_fractional_downsample_factor_is_rejected() {
        for factor in [1.5, 0.5, 0.0, f64::NAN] {
            let tags = StackTags {
                downsample_factor: factor,
                ..StackTags::default()
            };
            let err = mesh_label_stack(&cube_stack(tags), &no_smoothing()).unwrap_err();
            assert!(matches!(err, MeshError::Volume(VolumeError::FractionalDownsample(_))), "{}", factor);
        }
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = BatchSummary::default();
        let path = Path::new("a.tif");
        summary.record(path, &Ok(StackOutcome::Skipped { existing: PathBuf::from("a.obj") }));
        summary.record(
            path,
            &Ok(StackOutcome::Written {
                path: PathBuf::from("a.obj"),
                faces: 10,
            }),
        );
        summary.record(path, &Err(MeshError::UnsupportedFormat("x".to_string())));
        assert_eq!((summary.processed, summary.skipped, summary.failed), (1, 1, 1));
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failures[0].0, PathBuf::from("a.tif"));
    }

    #[test]
    fn test_output_path_uses_stem_and_format() {
        let config = MeshingConfig::default();
        assert_eq!(
            output_path_for(Path::new("/labels/stack-01.tif"), Path::new("/out"), &config),
            PathBuf::from("/out/stack-01.obj")
        );
    }

    #[test]
    fn test_callback_sees_every_stack_in_order() {
        let labels = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["b.tif", "a.tif"] {
            fs::write(labels.path().join(name), b"not a tiff").unwrap();
        }
        fs::write(out.path().join("b.obj"), b"").unwrap();

        let mut seen = Vec::new();
        let summary = process_stack_directory_with(labels.path(), out.path(), &MeshingConfig::default(), |p| {
            let name = p.stack_path.file_name().unwrap().to_string_lossy().into_owned();
            seen.push((p.done, p.total, name, p.result.is_ok()));
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![(1, 2, "a.tif".to_string(), false), (2, 2, "b.tif".to_string(), true)]
        );
        assert_eq!((summary.processed, summary.skipped, summary.failed), (0, 1, 1));
    }
}
