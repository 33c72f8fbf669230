use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::codec::CodecOptions;

use super::pixel_type::{PixelType, UnknownPixelType};

/// The schema release used when none is declared by a document
pub const DEFAULT_SCHEMA_VERSION: &str = "2016-06";

const BINARY_FILE_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/BinaryFile/";

/// The namespace `BinData` elements belong to for a given schema release
pub fn bin_data_namespace(schema_version: &str) -> String {
    format!("{BINARY_FILE_NAMESPACE}{schema_version}")
}

/// Interpret an OME boolean attribute, accepting a bare leading `t` or `f`
pub fn parse_ome_bool(value: &str) -> Option<bool> {
    match value.trim().as_bytes().first() {
        Some(b't' | b'T') => Some(true),
        Some(b'f' | b'F') => Some(false),
        _ => None,
    }
}

/// The order in which the Z, C and T axes of an image are rasterized into planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DimensionOrder {
    #[default]
    XYZCT,
    XYZTC,
    XYCTZ,
    XYCZT,
    XYTCZ,
    XYTZC,
}

impl DimensionOrder {
    pub const ALL: &[Self] = &[
        Self::XYZCT,
        Self::XYZTC,
        Self::XYCTZ,
        Self::XYCZT,
        Self::XYTCZ,
        Self::XYTZC,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::XYZCT => "XYZCT",
            Self::XYZTC => "XYZTC",
            Self::XYCTZ => "XYCTZ",
            Self::XYCZT => "XYCZT",
            Self::XYTCZ => "XYTCZ",
            Self::XYTZC => "XYTZC",
        }
    }
}

impl Display for DimensionOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DimensionOrder {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MetadataError::InvalidValue {
                element: "Pixels",
                attribute: "DimensionOrder",
                value: s.to_string(),
            })
    }
}

/// The dimensions and sample layout of one image's planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaneGeometry {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    pub pixel_type: PixelType,
    pub little_endian: bool,
    pub interleaved: bool,
    /// The number of channel samples stored together in one plane handed to a writer
    pub samples_per_pixel: usize,
    pub dimension_order: DimensionOrder,
}

impl Default for PlaneGeometry {
    fn default() -> Self {
        Self::new(0, 0, PixelType::default())
    }
}

impl PlaneGeometry {
    pub const fn new(size_x: usize, size_y: usize, pixel_type: PixelType) -> Self {
        Self {
            size_x,
            size_y,
            size_z: 1,
            size_c: 1,
            size_t: 1,
            pixel_type,
            little_endian: false,
            interleaved: false,
            samples_per_pixel: 1,
            dimension_order: DimensionOrder::XYZCT,
        }
    }

    pub const fn with_sizes(mut self, size_z: usize, size_c: usize, size_t: usize) -> Self {
        self.size_z = size_z;
        self.size_c = size_c;
        self.size_t = size_t;
        self
    }

    pub const fn with_little_endian(mut self, little_endian: bool) -> Self {
        self.little_endian = little_endian;
        self
    }

    pub const fn with_samples_per_pixel(mut self, samples_per_pixel: usize, interleaved: bool) -> Self {
        self.samples_per_pixel = samples_per_pixel;
        self.interleaved = interleaved;
        self
    }

    pub const fn bytes_per_pixel(&self) -> usize {
        self.pixel_type.bytes_per_pixel()
    }

    /// The byte size of one channel of one plane, `sizeX * sizeY * bytesPerPixel`.
    /// This is also the decoded size of a single `BinData` block.
    pub const fn plane_size(&self) -> usize {
        self.size_x
            .saturating_mul(self.size_y)
            .saturating_mul(self.bytes_per_pixel())
    }

    /// [`PlaneGeometry::frame_size`], or `None` if it does not fit in a `usize`
    pub fn checked_frame_size(&self) -> Option<usize> {
        self.size_x
            .checked_mul(self.size_y)?
            .checked_mul(self.bytes_per_pixel())?
            .checked_mul(self.samples_per_pixel.max(1))
    }

    /// [`PlaneGeometry::plane_count`], or `None` if it does not fit in a `usize`
    pub fn checked_plane_count(&self) -> Option<usize> {
        self.size_z.checked_mul(self.size_c)?.checked_mul(self.size_t)
    }

    /// The number of `BinData` blocks an image holds, one per (Z, C, T) coordinate
    pub const fn plane_count(&self) -> usize {
        self.size_z.saturating_mul(self.size_c).saturating_mul(self.size_t)
    }

    /// The number of channels once samples stored together are grouped
    pub const fn effective_size_c(&self) -> usize {
        let spp = if self.samples_per_pixel == 0 {
            1
        } else {
            self.samples_per_pixel
        };
        let c = self.size_c / spp;
        if c == 0 {
            1
        } else {
            c
        }
    }

    /// The number of planes a writer expects for this image, each carrying
    /// `samples_per_pixel` channels
    pub const fn frame_count(&self) -> usize {
        self.size_z
            .saturating_mul(self.effective_size_c())
            .saturating_mul(self.size_t)
    }

    /// The byte size of one plane handed to a writer
    pub const fn frame_size(&self) -> usize {
        self.plane_size().saturating_mul(self.samples_per_pixel)
    }

    /// Codec parameters for a single stored channel of a plane
    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions::new(self.size_x, self.size_y, self.pixel_type.bits_per_sample())
            .with_little_endian(self.little_endian)
            .with_signed(self.pixel_type.is_signed())
            .with_max_bytes(self.plane_size())
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to parse metadata document: {0}")]
    MalformedXml(String),
    #[error("{element} is missing required attribute {attribute}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("{element} attribute {attribute} has an invalid value {value:?}")]
    InvalidValue {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error(transparent)]
    UnknownPixelType(#[from] UnknownPixelType),
    #[error("Failed to serialize metadata document: {0}")]
    SerializationError(String),
    #[error("The metadata model is not available in this build")]
    Unavailable,
}

/// The narrow view of an OME metadata model the reader and writer rely on.
///
/// The reader builds one from the payload-free document text, and the writer
/// serializes one to obtain the document it interleaves pixel data into.
pub trait MetadataModel: Sized {
    /// Whether this model can actually be used at runtime
    fn is_available() -> bool {
        true
    }

    fn populate_from_document(xml: &str) -> Result<Self, MetadataError>;

    /// Produce a complete OME-XML document, starting with the XML declaration
    fn serialize_to_document(&self) -> Result<String, MetadataError>;

    fn image_count(&self) -> usize;

    fn plane_geometry(&self, image_index: usize) -> Option<PlaneGeometry>;

    /// The number of `Plate` elements, used to detect screen/plate/well documents
    fn plate_count(&self) -> usize {
        0
    }

    fn schema_version(&self) -> &str {
        DEFAULT_SCHEMA_VERSION
    }
}

/// A stand-in [`MetadataModel`] for builds without a real one. Every attempt to
/// construct or serialize it fails with [`MetadataError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableMetadata;

impl MetadataModel for UnavailableMetadata {
    fn is_available() -> bool {
        false
    }

    fn populate_from_document(_xml: &str) -> Result<Self, MetadataError> {
        Err(MetadataError::Unavailable)
    }

    fn serialize_to_document(&self) -> Result<String, MetadataError> {
        Err(MetadataError::Unavailable)
    }

    fn image_count(&self) -> usize {
        0
    }

    fn plane_geometry(&self, _image_index: usize) -> Option<PlaneGeometry> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_geometry_counts() {
        let geom = PlaneGeometry::new(10, 5, PixelType::Uint16).with_sizes(3, 2, 4);
        assert_eq!(geom.plane_size(), 100);
        assert_eq!(geom.plane_count(), 24);
        assert_eq!(geom.frame_count(), 24);
        assert_eq!(geom.frame_size(), 100);

        let rgb = PlaneGeometry::new(4, 4, PixelType::Uint8)
            .with_sizes(1, 3, 2)
            .with_samples_per_pixel(3, true);
        assert_eq!(rgb.plane_count(), 6);
        assert_eq!(rgb.effective_size_c(), 1);
        assert_eq!(rgb.frame_count(), 2);
        assert_eq!(rgb.frame_size(), 48);

        let opts = geom.codec_options();
        assert_eq!(opts.bits_per_sample, 16);
        assert_eq!(opts.max_bytes, Some(100));
        assert_eq!(opts.channels, 1);
    }

    #[test]
    fn test_dimension_order() {
        assert_eq!(
            "xyczt".parse::<DimensionOrder>().unwrap(),
            DimensionOrder::XYCZT
        );
        assert!("XYZ".parse::<DimensionOrder>().is_err());
    }

    #[test]
    fn test_ome_bool() {
        assert_eq!(parse_ome_bool("true"), Some(true));
        assert_eq!(parse_ome_bool("t"), Some(true));
        assert_eq!(parse_ome_bool(" F"), Some(false));
        assert_eq!(parse_ome_bool(""), None);
        assert_eq!(parse_ome_bool("1"), None);
    }

    #[test]
    fn test_unavailable() {
        assert!(!UnavailableMetadata::is_available());
        assert!(matches!(
            UnavailableMetadata::populate_from_document("<OME/>"),
            Err(MetadataError::Unavailable)
        ));
        assert_eq!(
            bin_data_namespace("2016-06"),
            "http://www.openmicroscopy.org/Schemas/BinaryFile/2016-06"
        );
    }
}
