use std::fs;
use std::io::{self, prelude::*, BufReader, SeekFrom};
use std::path::Path;

use log::{debug, info, warn};
use memchr::memchr;

use crate::codec::{Base64Codec, Bytes, CompressionType};
use crate::io::offset_index::{resolve_offsets, BinDataRecord, ByteOffsetTable};
use crate::io::traits::{PlaneSource, SeekRead};
use crate::meta::{DefaultMetadata, MetadataModel, PlaneGeometry};
use crate::plane::{extract_region, Plane, Region};

use super::reading_shared::{parse_document, OmeXmlParserError, OmeXmlParserState};

const BUFFER_SIZE: usize = 10000;

/// Where a plane's pixel data is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLocation {
    /// The position of the block in document order
    pub block_index: usize,
    /// The absolute byte offset of the first byte of the block's payload
    pub offset: u64,
    pub compression: CompressionType,
}

/// The most base64 characters, ignoring whitespace, that will be read looking
/// for the end of an encoded payload decoding to at most `plane_size` bytes
fn encoded_span_limit(compression: CompressionType, plane_size: usize) -> usize {
    let encoded = Base64Codec::encoded_length(plane_size);
    if compression.is_identity() {
        encoded
    } else {
        encoded.saturating_mul(2).saturating_add(65536)
    }
}

/**
An OME-XML reader that indexes every `BinData` payload up front and decodes
individual planes on demand.

Construction parses the whole document once to build the metadata-only XML and
the [`ByteOffsetTable`], after which any plane can be read with a single seek.
*/
#[derive(Debug)]
pub struct OmeXmlReaderType<R: SeekRead, M: MetadataModel = DefaultMetadata> {
    handle: BufReader<R>,
    /// The state the parser finished the document in
    pub state: OmeXmlParserState,
    start_offset: u64,
    omexml: String,
    records: Vec<BinDataRecord>,
    offsets: ByteOffsetTable,
    metadata: M,
}

impl<R: SeekRead, M: MetadataModel> OmeXmlReaderType<R, M> {
    /// Create a new [`OmeXmlReaderType`] instance, wrapping the [`io::Read`] handle
    /// provided with an [`io::BufReader`] and indexing the document from the
    /// handle's current position.
    pub fn new(file: R) -> Result<Self, OmeXmlParserError> {
        Self::with_buffer_capacity(file, BUFFER_SIZE)
    }

    pub fn with_buffer_capacity(file: R, capacity: usize) -> Result<Self, OmeXmlParserError> {
        if !M::is_available() {
            return Err(OmeXmlParserError::UnavailableDependency);
        }
        let mut handle = BufReader::with_capacity(capacity, file);
        let start_offset = handle
            .stream_position()
            .map_err(|e| OmeXmlParserError::IOError(OmeXmlParserState::Start, e))?;

        let (omexml, records) = parse_document(&mut handle)?;

        handle
            .seek(SeekFrom::Start(start_offset))
            .map_err(|e| OmeXmlParserError::IOError(OmeXmlParserState::Done, e))?;
        let offsets = resolve_offsets(&mut handle, start_offset, &records)?;
        let metadata = M::populate_from_document(&omexml)?;

        info!(
            "Indexed {} BinData blocks across {} images",
            records.len(),
            metadata.image_count()
        );

        Ok(Self {
            handle,
            state: OmeXmlParserState::Done,
            start_offset,
            omexml,
            records,
            offsets,
            metadata,
        })
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut M {
        &mut self.metadata
    }

    /// The document text with every `BinData` payload removed
    pub fn omexml(&self) -> &str {
        &self.omexml
    }

    pub fn bin_data_records(&self) -> &[BinDataRecord] {
        &self.records
    }

    pub fn offsets(&self) -> &ByteOffsetTable {
        &self.offsets
    }

    /// The stream position the document started at
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn block_count(&self) -> usize {
        self.records.len()
    }

    pub fn image_count(&self) -> usize {
        self.metadata.image_count()
    }

    pub fn plane_geometry(&self, image_index: usize) -> Option<PlaneGeometry> {
        self.metadata.plane_geometry(image_index)
    }

    /// The number of blocks stored for `image_index`, one per (Z, C, T) coordinate
    pub fn plane_count(&self, image_index: usize) -> usize {
        self.plane_geometry(image_index)
            .map(|g| g.plane_count())
            .unwrap_or_default()
    }

    /// Whether the document describes a screen/plate/well experiment
    pub fn is_spw(&self) -> bool {
        self.metadata.plate_count() > 0
    }

    fn checked_geometry(&self, image_index: usize) -> Result<PlaneGeometry, OmeXmlParserError> {
        self.plane_geometry(image_index)
            .ok_or(OmeXmlParserError::ImageOutOfRange {
                image_index,
                image_count: self.image_count(),
            })
    }

    /// Map an image and plane index pair to the index of its block in document order.
    ///
    /// Documents that store fewer blocks than their metadata promises are tolerated
    /// by reusing the last stored block.
    pub fn global_index(
        &self,
        image_index: usize,
        plane_index: usize,
    ) -> Result<usize, OmeXmlParserError> {
        let geometry = self.checked_geometry(image_index)?;
        let plane_count = geometry.plane_count();
        if plane_index >= plane_count {
            return Err(OmeXmlParserError::PlaneOutOfRange {
                image_index,
                plane_index,
                plane_count,
            });
        }
        let preceding = (0..image_index)
            .map(|i| self.plane_count(i))
            .fold(0usize, usize::saturating_add);
        let index = preceding.saturating_add(plane_index);
        let last = self.offsets.len().saturating_sub(1);
        if index > last {
            warn!(
                "Plane {plane_index} of image {image_index} maps to block {index} but only {} blocks are stored, reading block {last} instead",
                self.offsets.len()
            );
            Ok(last)
        } else {
            Ok(index)
        }
    }

    pub fn locate_plane(
        &self,
        image_index: usize,
        plane_index: usize,
    ) -> Result<PlaneLocation, OmeXmlParserError> {
        let block_index = self.global_index(image_index, plane_index)?;
        match (self.offsets.get(block_index), self.records.get(block_index)) {
            (Some(offset), Some(record)) => Ok(PlaneLocation {
                block_index,
                offset,
                compression: record.compression,
            }),
            _ => Err(OmeXmlParserError::NoPixelDataFound),
        }
    }

    /// Read the encoded payload starting at `offset`, up to the next `<` or until
    /// `limit` non-whitespace bytes have been read
    fn read_encoded_span(&mut self, offset: u64, limit: usize) -> io::Result<Bytes> {
        self.handle.seek(SeekFrom::Start(offset))?;
        let mut buffer = Bytes::new();
        let mut significant = 0usize;
        loop {
            let chunk = self.handle.fill_buf()?;
            if chunk.is_empty() {
                break;
            }
            let end = memchr(b'<', chunk);
            let scan = &chunk[..end.unwrap_or(chunk.len())];
            let mut taken = scan.len();
            for (i, b) in scan.iter().enumerate() {
                if !b.is_ascii_whitespace() {
                    if significant == limit {
                        taken = i;
                        break;
                    }
                    significant += 1;
                }
            }
            buffer.extend_from_slice(&scan[..taken]);
            let finished = end.is_some() || taken < scan.len();
            self.handle.consume(taken);
            if finished {
                break;
            }
        }
        Ok(buffer)
    }

    /// Read `region` of plane `plane_index` of image `image_index`.
    ///
    /// A plane whose block holds no data is returned as [`Plane::Blank`].
    pub fn read_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
        region: &Region,
    ) -> Result<Plane, OmeXmlParserError> {
        let geometry = self.checked_geometry(image_index)?;
        if !region.fits_within(geometry.size_x, geometry.size_y) {
            return Err(OmeXmlParserError::RegionOutOfBounds {
                region: *region,
                size_x: geometry.size_x,
                size_y: geometry.size_y,
            });
        }
        let location = self.locate_plane(image_index, plane_index)?;
        let plane_size = geometry.plane_size();
        let bytes_per_pixel = geometry.bytes_per_pixel();

        let span = self
            .read_encoded_span(
                location.offset,
                encoded_span_limit(location.compression, plane_size),
            )
            .map_err(|e| OmeXmlParserError::IOError(self.state, e))?;

        let max_encoded = if location.compression.is_identity() {
            Some(plane_size)
        } else {
            None
        };
        let raw = Base64Codec::decode(&span, max_encoded).map_err(|source| {
            OmeXmlParserError::CodecError {
                block_index: location.block_index,
                offset: location.offset,
                source,
            }
        })?;

        if raw.is_empty() {
            debug!(
                "Block {} for plane {plane_index} of image {image_index} is empty, returning a blank plane",
                location.block_index
            );
            return Ok(Plane::Blank(region.area() * bytes_per_pixel));
        }

        let decoded = location
            .compression
            .decompress(&raw, &geometry.codec_options())
            .map_err(|source| OmeXmlParserError::CodecError {
                block_index: location.block_index,
                offset: location.offset,
                source,
            })?;

        let mismatch = |actual: usize| OmeXmlParserError::PlaneSizeMismatch {
            block_index: location.block_index,
            offset: location.offset,
            expected: plane_size,
            actual,
        };
        if decoded.len() < plane_size {
            return Err(mismatch(decoded.len()));
        }
        extract_region(&decoded, geometry.size_x, bytes_per_pixel, region)
            .map(Plane::Data)
            .ok_or_else(|| mismatch(decoded.len()))
    }

    pub fn read_full_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
    ) -> Result<Plane, OmeXmlParserError> {
        let geometry = self.checked_geometry(image_index)?;
        self.read_plane(
            image_index,
            plane_index,
            &Region::full(geometry.size_x, geometry.size_y),
        )
    }

    pub fn into_inner(self) -> R {
        self.handle.into_inner()
    }
}

impl<M: MetadataModel> OmeXmlReaderType<fs::File, M> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let handle = fs::File::open(path)?;
        Ok(Self::new(handle)?)
    }
}

impl<R: SeekRead, M: MetadataModel> PlaneSource for OmeXmlReaderType<R, M> {
    fn image_count(&self) -> usize {
        self.metadata.image_count()
    }

    fn plane_count(&self, image_index: usize) -> usize {
        OmeXmlReaderType::plane_count(self, image_index)
    }

    fn plane_geometry(&self, image_index: usize) -> Option<PlaneGeometry> {
        self.metadata.plane_geometry(image_index)
    }

    fn read_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
        region: &Region,
    ) -> io::Result<Plane> {
        Ok(OmeXmlReaderType::read_plane(
            self,
            image_index,
            plane_index,
            region,
        )?)
    }
}

pub type OmeXmlReader<R> = OmeXmlReaderType<R, DefaultMetadata>;
