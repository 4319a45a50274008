//! Dense 3-D volumes in ZYX order (C layout: x varies fastest).

use std::ops::Range;

use crate::error::VolumeError;
use crate::structs_and_impls::BoundingBox;

/// Binary (foreground/background) volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryVolume {
    shape: [usize; 3],
    data: Vec<bool>,
}

impl BinaryVolume {
    pub fn new(shape: [usize; 3], data: Vec<bool>) -> Result<Self, VolumeError> {
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(VolumeError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: [usize; 3]) -> Self {
        Self {
            shape,
            data: vec![false; shape.iter().product()],
        }
    }

    /// Volume whose voxels are set by `f(z, y, x)`.
    pub fn from_fn(shape: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> bool) -> Self {
        let mut data = Vec::with_capacity(shape.iter().product());
        for z in 0..shape[0] {
            for y in 0..shape[1] {
                for x in 0..shape[2] {
                    data.push(f(z, y, x));
                }
            }
        }
        Self { shape, data }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &[bool] {
        &self.data
    }

    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.shape[1] + y) * self.shape[2] + x
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> bool {
        self.data[self.index(z, y, x)]
    }

    pub fn set(&mut self, z: usize, y: usize, x: usize, value: bool) {
        let i = self.index(z, y, x);
        self.data[i] = value;
    }

    pub fn is_full(&self) -> bool {
        self.data.iter().all(|&v| v)
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Pads with `false` voxels: `pad[axis]` on both sides of each axis.
    pub fn padded(&self, pad: [usize; 3]) -> BinaryVolume {
        let shape = [
            self.shape[0] + 2 * pad[0],
            self.shape[1] + 2 * pad[1],
            self.shape[2] + 2 * pad[2],
        ];
        let mut out = BinaryVolume::zeros(shape);
        for z in 0..self.shape[0] {
            for y in 0..self.shape[1] {
                let src = self.index(z, y, 0);
                let dst = out.index(z + pad[0], y + pad[1], pad[2]);
                out.data[dst..dst + self.shape[2]].copy_from_slice(&self.data[src..src + self.shape[2]]);
            }
        }
        out
    }
}

/// Label samples, kept at the width they were stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

// Runs `$body` with `$v` bound to the sample vector, whatever its width
macro_rules! with_samples {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            LabelData::U8($v) => $body,
            LabelData::U16($v) => $body,
            LabelData::U32($v) => $body,
            LabelData::U64($v) => $body,
        }
    };
}

impl LabelData {
    pub fn len(&self) -> usize {
        with_samples!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per voxel.
    pub fn sample_bytes(&self) -> usize {
        match self {
            LabelData::U8(_) => 1,
            LabelData::U16(_) => 2,
            LabelData::U32(_) => 4,
            LabelData::U64(_) => 8,
        }
    }

    #[inline]
    fn get(&self, i: usize) -> u64 {
        with_samples!(self, v => u64::from(v[i]))
    }

    fn to_mask(&self, keep: impl Fn(u64) -> bool) -> Vec<bool> {
        with_samples!(self, v => v.iter().map(|&s| keep(u64::from(s))).collect())
    }

    fn widened(self) -> Vec<u64> {
        match self {
            LabelData::U64(v) => v,
            other => with_samples!(&other, v => v.iter().map(|&s| u64::from(s)).collect()),
        }
    }

    /// Appends `more`, widening both to `u64` if their sample widths differ.
    pub fn append(&mut self, more: LabelData) {
        let more = match (&mut *self, more) {
            (LabelData::U8(a), LabelData::U8(b)) => return a.extend(b),
            (LabelData::U16(a), LabelData::U16(b)) => return a.extend(b),
            (LabelData::U32(a), LabelData::U32(b)) => return a.extend(b),
            (LabelData::U64(a), LabelData::U64(b)) => return a.extend(b),
            (_, more) => more,
        };
        let mut wide = std::mem::replace(self, LabelData::U64(Vec::new())).widened();
        wide.extend(more.widened());
        *self = LabelData::U64(wide);
    }

    fn gather(&self, rows: &[Range<usize>]) -> LabelData {
        fn pick<T: Copy>(v: &[T], rows: &[Range<usize>]) -> Vec<T> {
            let mut out = Vec::with_capacity(rows.iter().map(|r| r.len()).sum());
            for row in rows {
                out.extend_from_slice(&v[row.clone()]);
            }
            out
        }
        match self {
            LabelData::U8(v) => LabelData::U8(pick(v, rows)),
            LabelData::U16(v) => LabelData::U16(pick(v, rows)),
            LabelData::U32(v) => LabelData::U32(pick(v, rows)),
            LabelData::U64(v) => LabelData::U64(pick(v, rows)),
        }
    }
}

impl From<Vec<u8>> for LabelData {
    fn from(v: Vec<u8>) -> Self {
        LabelData::U8(v)
    }
}

impl From<Vec<u16>> for LabelData {
    fn from(v: Vec<u16>) -> Self {
        LabelData::U16(v)
    }
}

impl From<Vec<u32>> for LabelData {
    fn from(v: Vec<u32>) -> Self {
        LabelData::U32(v)
    }
}

impl From<Vec<u64>> for LabelData {
    fn from(v: Vec<u64>) -> Self {
        LabelData::U64(v)
    }
}

/// Integer label volume, e.g. a segmentation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVolume {
    shape: [usize; 3],
    data: LabelData,
}

impl LabelVolume {
    pub fn new(shape: [usize; 3], data: impl Into<LabelData>) -> Result<Self, VolumeError> {
        let data = data.into();
        let expected = shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(VolumeError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &LabelData {
        &self.data
    }

    #[inline]
    fn index(&self, z: usize, y: usize, x: usize) -> usize {
        (z * self.shape[1] + y) * self.shape[2] + x
    }

    pub fn get(&self, z: usize, y: usize, x: usize) -> u64 {
        self.data.get(self.index(z, y, x))
    }

    pub fn nonzero_mask(&self) -> BinaryVolume {
        BinaryVolume {
            shape: self.shape,
            data: self.data.to_mask(|v| v != 0),
        }
    }

    pub fn label_mask(&self, label: u64) -> BinaryVolume {
        BinaryVolume {
            shape: self.shape,
            data: self.data.to_mask(|v| v == label),
        }
    }

    /// Sorted distinct nonzero labels.
    pub fn labels(&self) -> Vec<u64> {
        let mut labels: Vec<u64> = with_samples!(&self.data, v => v
            .iter()
            .map(|&s| u64::from(s))
            .filter(|&s| s != 0)
            .collect());
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    /// `[start, stop)` box around the nonzero voxels, or `None` for an all-zero volume.
    pub fn nonzero_bounding_box(&self) -> Option<BoundingBox> {
        let mut start = [usize::MAX; 3];
        let mut stop = [0usize; 3];
        let mut found = false;
        for z in 0..self.shape[0] {
            for y in 0..self.shape[1] {
                for x in 0..self.shape[2] {
                    if self.get(z, y, x) == 0 {
                        continue;
                    }
                    found = true;
                    for (axis, coord) in [z, y, x].into_iter().enumerate() {
                        start[axis] = start[axis].min(coord);
                        stop[axis] = stop[axis].max(coord + 1);
                    }
                }
            }
        }
        found.then(|| BoundingBox::new(start.map(|v| v as i32), stop.map(|v| v as i32)))
    }

    /// Sub-volume inside `bounding_box`, clamped to the volume extents.
    pub fn crop(&self, bounding_box: &BoundingBox) -> LabelVolume {
        let mut start = [0usize; 3];
        let mut stop = [0usize; 3];
        for axis in 0..3 {
            start[axis] = (bounding_box.start[axis].max(0) as usize).min(self.shape[axis]);
            stop[axis] = (bounding_box.stop[axis].max(0) as usize).clamp(start[axis], self.shape[axis]);
        }
        let shape = [stop[0] - start[0], stop[1] - start[1], stop[2] - start[2]];

        let mut rows = Vec::with_capacity(shape[0] * shape[1]);
        for z in start[0]..stop[0] {
            for y in start[1]..stop[1] {
                let row = self.index(z, y, start[2]);
                rows.push(row..row + shape[2]);
            }
        }
        LabelVolume {
            shape,
            data: self.data.gather(&rows),
        }
    }
}

/// Placement of a label stack in the global volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackTags {
    pub offset_xyz: [f64; 3],   // Stack origin in downsampled voxels
    pub downsample_factor: f64, // Full-res voxels per stack voxel
}

impl Default for StackTags {
    fn default() -> Self {
        Self {
            offset_xyz: [0.0; 3],
            downsample_factor: 1.0,
        }
    }
}

impl StackTags {
    pub fn offset_zyx(&self) -> [f64; 3] {
        [self.offset_xyz[2], self.offset_xyz[1], self.offset_xyz[0]]
    }
}
