use std::fmt::Debug;
use std::io::{self, prelude::*, BufWriter};

use log::{debug, error, warn};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Error as XMLError, Writer};
use thiserror::Error;

use crate::codec::{Base64Codec, Bytes, CodecError, CompressionType};
use crate::io::traits::PlaneWriter;
use crate::meta::{bin_data_namespace, DefaultMetadata, MetadataError, MetadataModel, PixelType};
use crate::plane::{split_channel, Region};

use super::fragments::{split_fragments, FragmentSequence};
use super::reading_shared::OmeXmlParserError;

const BUFFER_SIZE: usize = 10000;

macro_rules! bstart {
    ($e:tt) => {
        BytesStart::from_content($e, $e.len())
    };
}

macro_rules! attrib {
    ($name:expr, $value:expr, $elt:ident) => {
        let value = $value.to_string();
        $elt.push_attribute(($name, value.as_str()));
    };
}

/**
The different states that [`OmeXmlWriterType`] can enter while writing an
OME-XML document.
*/
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub enum OmeXmlWriterState {
    /// Nothing has been written yet
    AwaitingHeader,
    /// The header fragment of the given image has been written and its planes
    /// are being written
    EmittingFragment(usize),
    /// The tail of the document has been written
    Closed,
}

#[derive(Debug, Error)]
pub enum OmeXmlWriterError {
    #[error("The metadata describes {image_count} images but serialized {fragment_count} Pixels elements")]
    FragmentMismatch {
        image_count: usize,
        fragment_count: usize,
    },
    #[error("Only whole planes can be written, {region:?} does not cover a {size_x}x{size_y} plane")]
    UnsupportedTileWrite {
        region: Region,
        size_x: usize,
        size_y: usize,
    },
    #[error("{compression} compression cannot store {pixel_type} pixels")]
    UnsupportedPixelType {
        compression: CompressionType,
        pixel_type: PixelType,
    },
    #[error("{0} compression cannot be written")]
    UnsupportedCompression(CompressionType),
    #[error("Image index {image_index} is out of range, there are {image_count} images")]
    ImageOutOfRange {
        image_index: usize,
        image_count: usize,
    },
    #[error("Plane index {plane_index} is out of range for image {image_index} with {plane_count} planes")]
    PlaneOutOfRange {
        image_index: usize,
        plane_index: usize,
        plane_count: usize,
    },
    #[error("Expected a buffer of at least {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Plane {plane_index} of image {image_index} cannot follow plane {last_plane} of image {last_image}")]
    OutOfOrder {
        image_index: usize,
        plane_index: usize,
        last_image: usize,
        last_plane: usize,
    },
    #[error("Cannot write in state {0:?}")]
    InvalidActionError(OmeXmlWriterState),
    #[error("Failed to serialize metadata: {0}")]
    MetadataError(#[from] MetadataError),
    #[error("Failed to split the serialized metadata: {0}")]
    FragmentError(#[from] OmeXmlParserError),
    #[error("Failed to encode plane: {0}")]
    CodecError(#[from] CodecError),
    #[error("An XML error occurred: {0}")]
    XMLError(#[from] XMLError),
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
}

impl From<OmeXmlWriterError> for io::Error {
    fn from(value: OmeXmlWriterError) -> Self {
        match value {
            OmeXmlWriterError::IOError(e) => e,
            OmeXmlWriterError::UnsupportedTileWrite { .. }
            | OmeXmlWriterError::UnsupportedPixelType { .. }
            | OmeXmlWriterError::UnsupportedCompression(_) => {
                io::Error::new(io::ErrorKind::Unsupported, value)
            }
            OmeXmlWriterError::ImageOutOfRange { .. }
            | OmeXmlWriterError::PlaneOutOfRange { .. }
            | OmeXmlWriterError::BufferTooSmall { .. }
            | OmeXmlWriterError::OutOfOrder { .. }
            | OmeXmlWriterError::InvalidActionError(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, value)
            }
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type WriterResult = Result<(), OmeXmlWriterError>;

struct InnerXMLWriter<W: io::Write> {
    pub handle: Writer<BufWriter<W>>,
}

impl<W: Write> Debug for InnerXMLWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerXMLWriter")
            .field("handle", &"...")
            .finish()
    }
}

impl<W: io::Write> InnerXMLWriter<W> {
    pub fn new(file: W) -> InnerXMLWriter<W> {
        let handle = BufWriter::with_capacity(BUFFER_SIZE, file);
        Self {
            handle: Writer::new(handle),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.get_mut().flush()
    }

    /// Write pre-serialized text as-is
    pub fn write_raw(&mut self, text: &[u8]) -> WriterResult {
        self.handle.get_mut().write_all(text)?;
        Ok(())
    }

    pub fn write_event(&mut self, event: Event) -> WriterResult {
        self.handle.write_event(event)?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        self.handle.get_ref().get_ref()
    }
}

/**
Writes an OME-XML document one plane at a time.

The metadata is serialized once up front and split into one header fragment
per image. Each image's header is written just before its first plane, and the
remaining headers and the document tail are written on [`OmeXmlWriterType::close`].
Planes must be written in image order, and in increasing plane order within an
image.
*/
#[derive(Debug)]
pub struct OmeXmlWriterType<W: Write, M: MetadataModel = DefaultMetadata> {
    pub state: OmeXmlWriterState,
    handle: InnerXMLWriter<W>,
    metadata: M,
    fragments: FragmentSequence,
    headers_written: usize,
    last_written: Option<(usize, usize)>,
    compression: CompressionType,
    interleaved: bool,
    namespace: String,
}

impl<W: Write, M: MetadataModel> OmeXmlWriterType<W, M> {
    /// Wrap a new [`std::io::Write`]-able type, constructing a new [`OmeXmlWriterType`]
    /// describing the images in `metadata`.
    pub fn new(file: W, metadata: M) -> Result<Self, OmeXmlWriterError> {
        let document = metadata.serialize_to_document()?;
        let fragments = split_fragments(&document)?;
        let image_count = metadata.image_count();
        if fragments.len() != image_count {
            return Err(OmeXmlWriterError::FragmentMismatch {
                image_count,
                fragment_count: fragments.len(),
            });
        }
        let namespace = bin_data_namespace(metadata.schema_version());
        Ok(Self {
            state: OmeXmlWriterState::AwaitingHeader,
            handle: InnerXMLWriter::new(file),
            metadata,
            fragments,
            headers_written: 0,
            last_written: None,
            compression: CompressionType::NoCompression,
            interleaved: false,
            namespace,
        })
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Set the compression applied to subsequent planes
    pub fn set_compression(&mut self, compression: CompressionType) -> WriterResult {
        if !compression.is_writable() {
            return Err(OmeXmlWriterError::UnsupportedCompression(compression));
        }
        self.compression = compression;
        Ok(())
    }

    pub fn interleaved(&self) -> bool {
        self.interleaved
    }

    /// Whether planes holding several samples per pixel are passed in
    /// pixel-interleaved order rather than one channel band after another
    pub fn set_interleaved(&mut self, interleaved: bool) {
        self.interleaved = interleaved;
    }

    pub fn can_do_stacks(&self) -> bool {
        true
    }

    /// The pixel types the current compression can store
    pub fn supported_pixel_types(&self) -> &'static [PixelType] {
        self.compression.supported_pixel_types()
    }

    pub fn get_ref(&self) -> &W {
        self.handle.get_ref()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.flush()
    }

    /// Write header fragments until every image before `end` has had its header written
    fn emit_headers_until(&mut self, end: usize) -> WriterResult {
        let end = end.min(self.fragments.len());
        while self.headers_written < end {
            let i = self.headers_written;
            self.handle.write_raw(self.fragments.headers[i].as_bytes())?;
            self.headers_written += 1;
            self.state = OmeXmlWriterState::EmittingFragment(i);
        }
        Ok(())
    }

    fn write_bin_data(&mut self, payload: &[u8], plane_size: usize, big_endian: bool) -> WriterResult {
        let mut elt = bstart!("BinData");
        attrib!("xmlns", self.namespace, elt);
        attrib!("Length", plane_size, elt);
        attrib!("BigEndian", big_endian, elt);
        if !self.compression.is_identity() {
            attrib!("Compression", self.compression, elt);
        }
        self.handle.write_event(Event::Start(elt))?;
        self.handle.write_raw(payload)?;
        self.handle.write_event(Event::End(BytesEnd::new("BinData")))?;
        Ok(())
    }

    /// Write one plane of image `image_index`. `data` holds every sample of the plane.
    ///
    /// All arguments are validated before anything is written, so a rejected
    /// plane leaves the output untouched.
    pub fn write_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
        data: &[u8],
        region: &Region,
    ) -> WriterResult {
        if self.state == OmeXmlWriterState::Closed {
            return Err(OmeXmlWriterError::InvalidActionError(self.state));
        }
        let geometry =
            self.metadata
                .plane_geometry(image_index)
                .ok_or(OmeXmlWriterError::ImageOutOfRange {
                    image_index,
                    image_count: self.metadata.image_count(),
                })?;
        let plane_count = geometry.frame_count();
        if plane_index >= plane_count {
            return Err(OmeXmlWriterError::PlaneOutOfRange {
                image_index,
                plane_index,
                plane_count,
            });
        }
        if !region.is_full_frame(geometry.size_x, geometry.size_y) {
            return Err(OmeXmlWriterError::UnsupportedTileWrite {
                region: *region,
                size_x: geometry.size_x,
                size_y: geometry.size_y,
            });
        }
        if !self.compression.supports_pixel_type(geometry.pixel_type) {
            return Err(OmeXmlWriterError::UnsupportedPixelType {
                compression: self.compression,
                pixel_type: geometry.pixel_type,
            });
        }
        let frame_size = geometry.frame_size();
        if data.len() < frame_size {
            return Err(OmeXmlWriterError::BufferTooSmall {
                expected: frame_size,
                actual: data.len(),
            });
        }
        if let Some((last_image, last_plane)) = self.last_written {
            if image_index < last_image || (image_index == last_image && plane_index <= last_plane)
            {
                return Err(OmeXmlWriterError::OutOfOrder {
                    image_index,
                    plane_index,
                    last_image,
                    last_plane,
                });
            }
            if image_index == last_image && plane_index != last_plane + 1 {
                warn!("Skipping from plane {last_plane} to {plane_index} of image {image_index}");
            }
        }

        // Encode everything before writing so a codec failure leaves no partial element
        let samples_per_pixel = geometry.samples_per_pixel.max(1);
        let options = geometry.codec_options();
        let mut payloads: Vec<Bytes> = Vec::with_capacity(samples_per_pixel);
        for channel in 0..samples_per_pixel {
            let samples = split_channel(
                &data[..frame_size],
                channel,
                samples_per_pixel,
                geometry.bytes_per_pixel(),
                self.interleaved,
            );
            let compressed = self.compression.compress(&samples, &options)?;
            payloads.push(Base64Codec::encode(&compressed));
        }

        self.emit_headers_until(image_index + 1)?;
        for payload in payloads.iter() {
            self.write_bin_data(payload, geometry.plane_size(), !geometry.little_endian)?;
        }
        debug!(
            "Wrote plane {plane_index} of image {image_index} as {samples_per_pixel} {} blocks",
            self.compression
        );
        self.last_written = Some((image_index, plane_index));
        Ok(())
    }

    /// Write the remaining header fragments and the document tail. Closing an
    /// already closed writer does nothing.
    pub fn close(&mut self) -> WriterResult {
        if self.state == OmeXmlWriterState::Closed {
            return Ok(());
        }
        self.emit_headers_until(self.fragments.len())?;
        self.handle.write_raw(self.fragments.tail.as_bytes())?;
        self.handle.flush()?;
        self.state = OmeXmlWriterState::Closed;
        Ok(())
    }
}

impl<W: Write, M: MetadataModel> Drop for OmeXmlWriterType<W, M> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close OME-XML writer: {e}");
        }
    }
}

impl<W: Write, M: MetadataModel> PlaneWriter for OmeXmlWriterType<W, M> {
    fn supported_pixel_types(&self) -> &'static [PixelType] {
        self.compression.supported_pixel_types()
    }

    fn write_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
        data: &[u8],
        region: &Region,
    ) -> io::Result<()> {
        Ok(OmeXmlWriterType::write_plane(
            self,
            image_index,
            plane_index,
            data,
            region,
        )?)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(OmeXmlWriterType::close(self)?)
    }
}

pub type OmeXmlWriter<W> = OmeXmlWriterType<W, DefaultMetadata>;

#[cfg(all(test, feature = "ome-model"))]
mod test {
    use super::*;
    use crate::io::ome_xml::{parse_document, OmeXmlReader};
    use crate::meta::{MetadataModel, OmeMetadata, PlaneGeometry};
    use crate::plane::Plane;
    use std::io::Cursor;

    fn plane_bytes(seed: u8, n: usize) -> Vec<u8> {
        (0..n).map(|i| seed.wrapping_add((i * 7) as u8)).collect()
    }

    fn two_images() -> OmeMetadata {
        let mut meta = OmeMetadata::new();
        meta.add_image(
            Some("stack".into()),
            PlaneGeometry::new(4, 3, PixelType::Uint8).with_sizes(2, 1, 1),
        );
        meta.add_image(
            Some("series".into()),
            PlaneGeometry::new(3, 2, PixelType::Uint16)
                .with_sizes(1, 1, 2)
                .with_little_endian(true),
        );
        meta
    }

    fn write_two_images(compression: CompressionType) -> Result<Vec<u8>, OmeXmlWriterError> {
        let mut buffer = Vec::new();
        {
            let mut writer = OmeXmlWriter::new(&mut buffer, two_images())?;
            writer.set_compression(compression)?;
            for p in 0..2 {
                writer.write_plane(0, p, &plane_bytes(p as u8, 12), &Region::full(4, 3))?;
            }
            for p in 0..2 {
                writer.write_plane(1, p, &plane_bytes(50 + p as u8, 12), &Region::full(3, 2))?;
            }
            writer.close()?;
        }
        Ok(buffer)
    }

    fn lossless_compressions() -> Vec<CompressionType> {
        CompressionType::WRITABLE_METHODS
            .iter()
            .copied()
            .filter(|c| c.supports_pixel_type(PixelType::Uint16))
            .collect()
    }

    #[test_log::test]
    fn test_round_trip() -> Result<(), OmeXmlWriterError> {
        for compression in lossless_compressions() {
            let buffer = write_two_images(compression)?;
            let mut reader = OmeXmlReader::new(Cursor::new(buffer))?;
            assert_eq!(reader.image_count(), 2);
            assert_eq!(reader.block_count(), 4);
            for p in 0..2 {
                assert_eq!(
                    reader.read_full_plane(0, p)?,
                    Plane::Data(plane_bytes(p as u8, 12)),
                    "{compression}"
                );
                assert_eq!(
                    reader.read_full_plane(1, p)?,
                    Plane::Data(plane_bytes(50 + p as u8, 12)),
                    "{compression}"
                );
            }
            let region = Region::new(1, 1, 2, 2);
            let expected = plane_bytes(1, 12);
            assert_eq!(
                reader.read_plane(0, 1, &region)?,
                Plane::Data(vec![expected[5], expected[6], expected[9], expected[10]])
            );
            assert!(reader.plane_geometry(1).unwrap().little_endian);
            assert_eq!(reader.bin_data_records()[3].compression, compression);
        }
        Ok(())
    }

    #[test_log::test]
    fn test_declared_length() -> Result<(), OmeXmlWriterError> {
        let buffer = write_two_images(CompressionType::Zlib)?;
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.matches("Length=\"12\"").count(), 4);
        assert_eq!(text.matches("Compression=\"zlib\"").count(), 4);
        assert_eq!(text.matches("BigEndian=\"false\"").count(), 3);
        assert!(text.contains(
            "<BinData xmlns=\"http://www.openmicroscopy.org/Schemas/BinaryFile/2016-06\""
        ));

        let buffer = write_two_images(CompressionType::NoCompression)?;
        let text = String::from_utf8(buffer).unwrap();
        assert!(!text.contains("Compression="));
        assert_eq!(text.matches("<?xml").count(), 1);
        Ok(())
    }

    #[test_log::test]
    fn test_partial_tile_rejected() -> Result<(), OmeXmlWriterError> {
        let mut writer = OmeXmlWriter::new(Vec::new(), two_images())?;
        let err = writer
            .write_plane(0, 0, &plane_bytes(0, 12), &Region::new(0, 0, 2, 2))
            .unwrap_err();
        assert!(matches!(err, OmeXmlWriterError::UnsupportedTileWrite { .. }));
        writer.flush()?;
        assert!(writer.get_ref().is_empty());
        assert_eq!(writer.state, OmeXmlWriterState::AwaitingHeader);
        Ok(())
    }

    #[cfg(feature = "jpeg")]
    #[test_log::test]
    fn test_unsupported_pixel_type() -> Result<(), OmeXmlWriterError> {
        let mut writer = OmeXmlWriter::new(Vec::new(), two_images())?;
        writer.set_compression(CompressionType::Jpeg)?;
        let err = writer
            .write_plane(1, 0, &plane_bytes(0, 12), &Region::full(3, 2))
            .unwrap_err();
        assert!(matches!(
            err,
            OmeXmlWriterError::UnsupportedPixelType {
                pixel_type: PixelType::Uint16,
                ..
            }
        ));
        writer.flush()?;
        assert!(writer.get_ref().is_empty());
        Ok(())
    }

    #[cfg(feature = "jpeg")]
    #[test_log::test]
    fn test_jpeg_round_trip() -> Result<(), OmeXmlWriterError> {
        let mut meta = OmeMetadata::new();
        meta.add_image(None, PlaneGeometry::new(16, 16, PixelType::Uint8));
        let data: Vec<u8> = (0..256).map(|i| ((i % 16) * 8 + 40) as u8).collect();
        let mut buffer = Vec::new();
        {
            let mut writer = OmeXmlWriter::new(&mut buffer, meta)?;
            writer.set_compression(CompressionType::Jpeg)?;
            writer.write_plane(0, 0, &data, &Region::full(16, 16))?;
            writer.close()?;
        }
        let mut reader = OmeXmlReader::new(Cursor::new(buffer))?;
        let plane = reader.read_full_plane(0, 0)?.into_bytes();
        assert_eq!(plane.len(), data.len());
        for (a, b) in plane.iter().zip(data.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 12, "{a} vs {b}");
        }
        Ok(())
    }

    #[test_log::test]
    fn test_invalid_compression() -> Result<(), OmeXmlWriterError> {
        let mut writer = OmeXmlWriter::new(Vec::new(), two_images())?;
        assert!(matches!(
            writer.set_compression(CompressionType::PackBits),
            Err(OmeXmlWriterError::UnsupportedCompression(CompressionType::PackBits))
        ));
        assert_eq!(writer.compression(), CompressionType::NoCompression);
        Ok(())
    }

    #[test_log::test]
    fn test_ordering_and_close() -> Result<(), OmeXmlWriterError> {
        let mut writer = OmeXmlWriter::new(Vec::new(), two_images())?;
        writer.write_plane(1, 0, &plane_bytes(0, 12), &Region::full(3, 2))?;
        assert_eq!(writer.state, OmeXmlWriterState::EmittingFragment(1));

        let err = writer
            .write_plane(0, 1, &plane_bytes(0, 12), &Region::full(4, 3))
            .unwrap_err();
        assert!(matches!(err, OmeXmlWriterError::OutOfOrder { .. }));

        let err = writer
            .write_plane(1, 0, &plane_bytes(0, 12), &Region::full(3, 2))
            .unwrap_err();
        assert!(matches!(err, OmeXmlWriterError::OutOfOrder { .. }));

        let err = writer
            .write_plane(1, 2, &plane_bytes(0, 12), &Region::full(3, 2))
            .unwrap_err();
        assert!(matches!(err, OmeXmlWriterError::PlaneOutOfRange { .. }));

        let err = writer
            .write_plane(2, 0, &plane_bytes(0, 12), &Region::full(3, 2))
            .unwrap_err();
        assert!(matches!(err, OmeXmlWriterError::ImageOutOfRange { .. }));

        let err = writer
            .write_plane(1, 1, &plane_bytes(0, 4), &Region::full(3, 2))
            .unwrap_err();
        assert!(matches!(
            err,
            OmeXmlWriterError::BufferTooSmall {
                expected: 12,
                actual: 4
            }
        ));

        writer.close()?;
        writer.close()?;
        assert!(matches!(
            writer.write_plane(1, 1, &plane_bytes(0, 12), &Region::full(3, 2)),
            Err(OmeXmlWriterError::InvalidActionError(OmeXmlWriterState::Closed))
        ));

        let text = std::str::from_utf8(writer.get_ref()).unwrap();
        assert_eq!(text.matches("<Pixels").count(), 2);
        assert_eq!(text.matches("</Pixels>").count(), 2);
        assert_eq!(text.matches("</BinData>").count(), 1);
        let image_1 = text.find("ID=\"Image:1\"").unwrap();
        assert!(text.find("<BinData").unwrap() > image_1);
        Ok(())
    }

    #[test_log::test]
    fn test_close_without_planes() -> Result<(), OmeXmlWriterError> {
        let mut buffer = Vec::new();
        {
            let mut writer = OmeXmlWriter::new(&mut buffer, two_images())?;
            writer.close()?;
        }
        assert!(matches!(
            parse_document(buffer.as_slice()),
            Err(OmeXmlParserError::NoPixelDataFound)
        ));
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.matches("</Pixels>").count(), 2);
        assert!(text.trim_end().ends_with("</OME>"));
        Ok(())
    }

    #[test_log::test]
    fn test_close_on_drop() -> Result<(), OmeXmlWriterError> {
        let mut buffer = Vec::new();
        {
            let mut writer = OmeXmlWriter::new(&mut buffer, two_images())?;
            writer.write_plane(0, 0, &plane_bytes(0, 12), &Region::full(4, 3))?;
        }
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.trim_end().ends_with("</OME>"));
        Ok(())
    }

    #[test_log::test]
    fn test_samples_per_pixel() -> Result<(), OmeXmlWriterError> {
        let mut meta = OmeMetadata::new();
        meta.add_image(
            None,
            PlaneGeometry::new(2, 2, PixelType::Uint8)
                .with_sizes(1, 3, 1)
                .with_samples_per_pixel(3, true),
        );
        // RGBRGB... with R = 10 + i, G = 20 + i, B = 30 + i
        let rgb: Vec<u8> = (0..4u8).flat_map(|i| [10 + i, 20 + i, 30 + i]).collect();
        let mut buffer = Vec::new();
        {
            let mut writer = OmeXmlWriter::new(&mut buffer, meta)?;
            writer.set_interleaved(true);
            writer.set_compression(CompressionType::Zlib)?;
            writer.write_plane(0, 0, &rgb, &Region::full(2, 2))?;
            writer.close()?;
        }
        let mut reader = OmeXmlReader::new(Cursor::new(buffer))?;
        assert_eq!(reader.plane_count(0), 3);
        assert_eq!(reader.metadata().plane_geometry(0).unwrap().samples_per_pixel, 3);
        for (c, base) in [10u8, 20, 30].into_iter().enumerate() {
            assert_eq!(
                reader.read_full_plane(0, c)?,
                Plane::Data((0..4).map(|i| base + i).collect())
            );
        }
        Ok(())
    }

    #[test_log::test]
    fn test_write_file() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("written.ome");
        {
            let file = std::fs::File::create(&path)?;
            let mut writer = OmeXmlWriter::new(file, two_images())?;
            PlaneWriter::write_plane(&mut writer, 0, 0, &plane_bytes(3, 12), &Region::full(4, 3))?;
            PlaneWriter::close(&mut writer)?;
        }
        let mut reader = OmeXmlReader::open_path(&path)?;
        assert_eq!(
            reader.read_full_plane(0, 0)?,
            Plane::Data(plane_bytes(3, 12))
        );
        Ok(())
    }
}
