use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{MeshError, ParseError, VolumeError};
use crate::volume::{LabelData, LabelVolume, StackTags};

// Private DVID tags written alongside exported label stacks
const TAG_OFFSET_X: u16 = 31232;
const TAG_OFFSET_Y: u16 = 31233;
const TAG_OFFSET_Z: u16 = 31234;
const TAG_DOWNSAMPLE_INTERVAL: u16 = 31235;

/// A label volume together with its placement tags.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStack {
    pub volume: LabelVolume,
    pub tags: StackTags,
}

/// Multi-page TIFF label stack reader (one page per Z slice).
pub struct TiffStackParser;

impl TiffStackParser {
    pub fn parse_file(path: &Path) -> Result<LabelStack, MeshError> {
        let tiff_file = File::open(path).map_err(ParseError::from)?;
        let stack = Self::parse_stack(BufReader::new(tiff_file), &path.display().to_string())?;
        debug!(
            "read label stack {} with shape {:?} and tags {:?}",
            path.display(),
            stack.volume.shape(),
            stack.tags
        );
        Ok(stack)
    }

    /// Decode every page of the stack. `name` is only used in error messages.
    pub fn parse_stack<R: Read + Seek>(reader: R, name: &str) -> Result<LabelStack, MeshError> {
        let mut decoder = Decoder::new(reader).map_err(ParseError::from)?;
        let mut tags = StackTags::default();
        let mut page_shape: Option<[usize; 2]> = None;
        let mut data: Option<LabelData> = None;
        let mut page = 0usize;

        loop {
            // Tags may live on any page; later pages win
            Self::read_tags(&mut decoder, &mut tags)?;

            let (width, height) = decoder.dimensions().map_err(ParseError::from)?;
            let shape = [height as usize, width as usize];
            match page_shape {
                None => page_shape = Some(shape),
                Some(expected) if expected != shape => {
                    return Err(VolumeError::PageShapeMismatch {
                        page,
                        expected,
                        actual: shape,
                    }
                    .into())
                }
                Some(_) => {}
            }

            let samples = Self::page_samples(decoder.read_image().map_err(ParseError::from)?)?;
            data = Some(match data.take() {
                Some(mut pages) => {
                    pages.append(samples);
                    pages
                }
                None => samples,
            });
            page += 1;

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(ParseError::from)?;
        }

        let [height, width] = page_shape.ok_or_else(|| VolumeError::EmptyStack(name.to_string()))?;
        let data = data.unwrap_or(LabelData::U8(Vec::new()));
        let volume = LabelVolume::new([page, height, width], data)?;
        Ok(LabelStack { volume, tags })
    }

    fn read_tags<R: Read + Seek>(decoder: &mut Decoder<R>, tags: &mut StackTags) -> Result<(), ParseError> {
        for (axis, tag) in [TAG_OFFSET_X, TAG_OFFSET_Y, TAG_OFFSET_Z].into_iter().enumerate() {
            if let Some(value) = decoder.find_tag(Tag::Unknown(tag))? {
                tags.offset_xyz[axis] = Self::tag_number(value)?;
            }
        }
        if let Some(value) = decoder.find_tag(Tag::Unknown(TAG_DOWNSAMPLE_INTERVAL))? {
            // Stored as the interval between sampled voxels, so 0 means full resolution
            tags.downsample_factor = Self::tag_number(value)? + 1.0;
        }
        Ok(())
    }

    /// Tags may be stored as unsigned, signed or floating point values.
    fn tag_number(value: Value) -> Result<f64, ParseError> {
        if let Ok(v) = value.clone().into_u64() {
            return Ok(v as f64);
        }
        if let Ok(v) = value.clone().into_i64() {
            return Ok(v as f64);
        }
        if let Ok(v) = value.clone().into_f32() {
            return Ok(f64::from(v));
        }
        Ok(value.into_f64()?)
    }

    /// One page's samples at their stored width.
    fn page_samples(image: DecodingResult) -> Result<LabelData, VolumeError> {
        // Signed labels: anything negative is background
        let data = match image {
            DecodingResult::U8(v) => LabelData::U8(v),
            DecodingResult::U16(v) => LabelData::U16(v),
            DecodingResult::U32(v) => LabelData::U32(v),
            DecodingResult::U64(v) => LabelData::U64(v),
            DecodingResult::I8(v) => LabelData::U8(v.into_iter().map(|s| s.max(0) as u8).collect()),
            DecodingResult::I16(v) => LabelData::U16(v.into_iter().map(|s| s.max(0) as u16).collect()),
            DecodingResult::I32(v) => LabelData::U32(v.into_iter().map(|s| s.max(0) as u32).collect()),
            DecodingResult::I64(v) => LabelData::U64(v.into_iter().map(|s| s.max(0) as u64).collect()),
            _ => return Err(VolumeError::UnsupportedSampleType("floating point pages".to_string())),
        };
        Ok(data)
    }
}
