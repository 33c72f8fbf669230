//! A lightweight OME metadata model covering the parts of the schema needed to
//! describe pixel data: `Image`, `Pixels`, `Channel` and `Plate`.
//!
//! A model populated from a document remembers the document text and serializes
//! back to it verbatim until it is modified. Freshly built or modified models
//! are serialized from their fields.
use std::io;

use log::{debug, trace};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::pixel_type::PixelType;
use super::traits::{
    parse_ome_bool, DimensionOrder, MetadataError, MetadataModel, PlaneGeometry,
    DEFAULT_SCHEMA_VERSION,
};

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

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

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OmeChannel {
    pub id: String,
    pub name: Option<String>,
    pub samples_per_pixel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OmeImage {
    pub id: String,
    pub name: Option<String>,
    pub pixels_id: String,
    pub geometry: PlaneGeometry,
    pub channels: Vec<OmeChannel>,
}

impl OmeImage {
    pub fn new(index: usize, name: Option<String>, geometry: PlaneGeometry) -> Self {
        let channels = (0..geometry.effective_size_c())
            .map(|c| OmeChannel {
                id: format!("Channel:{index}:{c}"),
                name: None,
                samples_per_pixel: geometry.samples_per_pixel,
            })
            .collect();
        Self {
            id: format!("Image:{index}"),
            name,
            pixels_id: format!("Pixels:{index}"),
            geometry,
            channels,
        }
    }
}

/// The built-in [`MetadataModel`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OmeMetadata {
    images: Vec<OmeImage>,
    plates: Vec<String>,
    schema_version: String,
    uuid: String,
    creator: Option<String>,
    source: Option<String>,
}

impl Default for OmeMetadata {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            plates: Vec::new(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            uuid: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            creator: Some(format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )),
            source: None,
        }
    }
}

/// The state of an `Image` element while it is being read
#[derive(Debug, Default)]
struct ImageBuilder {
    id: String,
    name: Option<String>,
    pixels_id: Option<String>,
    geometry: Option<PlaneGeometry>,
    pixels_big_endian: Option<bool>,
    bin_data_big_endian: Option<bool>,
    channels: Vec<OmeChannel>,
}

impl ImageBuilder {
    fn build(self, index: usize) -> Result<OmeImage, MetadataError> {
        let mut geometry = self.geometry.ok_or(MetadataError::MissingAttribute {
            element: "Image",
            attribute: "Pixels",
        })?;
        let big_endian = self
            .pixels_big_endian
            .or(self.bin_data_big_endian)
            .unwrap_or(true);
        geometry.little_endian = !big_endian;
        if let Some(channel) = self.channels.first() {
            geometry.samples_per_pixel = channel.samples_per_pixel.max(1);
            if geometry.checked_frame_size().is_none() {
                return Err(MetadataError::InvalidValue {
                    element: "Channel",
                    attribute: "SamplesPerPixel",
                    value: channel.samples_per_pixel.to_string(),
                });
            }
        }
        Ok(OmeImage {
            id: self.id,
            name: self.name,
            pixels_id: self.pixels_id.unwrap_or_else(|| format!("Pixels:{index}")),
            geometry,
            channels: self.channels,
        })
    }
}

fn attributes_of(elt: &BytesStart) -> Result<Vec<(String, String)>, MetadataError> {
    let mut pairs = Vec::new();
    for attr in elt.attributes() {
        let attr = attr.map_err(|e| MetadataError::MalformedXml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| MetadataError::MalformedXml(e.to_string()))?
            .to_string();
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn lookup<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn required_size(
    attrs: &[(String, String)],
    attribute: &'static str,
) -> Result<usize, MetadataError> {
    let value = lookup(attrs, attribute).ok_or(MetadataError::MissingAttribute {
        element: "Pixels",
        attribute,
    })?;
    value
        .trim()
        .parse()
        .map_err(|_| MetadataError::InvalidValue {
            element: "Pixels",
            attribute,
            value: value.to_string(),
        })
}

fn parse_pixels(attrs: &[(String, String)]) -> Result<PlaneGeometry, MetadataError> {
    let pixel_type: PixelType = lookup(attrs, "Type")
        .ok_or(MetadataError::MissingAttribute {
            element: "Pixels",
            attribute: "Type",
        })?
        .parse()?;
    let mut geometry = PlaneGeometry::new(
        required_size(attrs, "SizeX")?,
        required_size(attrs, "SizeY")?,
        pixel_type,
    )
    .with_sizes(
        required_size(attrs, "SizeZ")?,
        required_size(attrs, "SizeC")?,
        required_size(attrs, "SizeT")?,
    );
    if geometry.checked_frame_size().is_none() {
        return Err(MetadataError::InvalidValue {
            element: "Pixels",
            attribute: "SizeY",
            value: format!("{}x{}", geometry.size_x, geometry.size_y),
        });
    }
    if geometry.checked_plane_count().is_none() {
        return Err(MetadataError::InvalidValue {
            element: "Pixels",
            attribute: "SizeT",
            value: format!("{}x{}x{}", geometry.size_z, geometry.size_c, geometry.size_t),
        });
    }
    if let Some(order) = lookup(attrs, "DimensionOrder") {
        geometry.dimension_order = order.parse()?;
    }
    if let Some(interleaved) = lookup(attrs, "Interleaved") {
        geometry.interleaved = parse_ome_bool(interleaved).unwrap_or(false);
    }
    Ok(geometry)
}

impl OmeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &[OmeImage] {
        &self.images
    }

    pub fn image(&self, index: usize) -> Option<&OmeImage> {
        self.images.get(index)
    }

    /// Get mutable access to an image. The model will be regenerated from its
    /// fields the next time it is serialized.
    pub fn image_mut(&mut self, index: usize) -> Option<&mut OmeImage> {
        self.source = None;
        self.images.get_mut(index)
    }

    /// Add a new image described by `geometry`, returning its index
    pub fn add_image(&mut self, name: Option<String>, geometry: PlaneGeometry) -> usize {
        self.source = None;
        let index = self.images.len();
        self.images.push(OmeImage::new(index, name, geometry));
        index
    }

    pub fn add_plate(&mut self, name: impl Into<String>) -> usize {
        self.source = None;
        self.plates.push(name.into());
        self.plates.len() - 1
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// Whether this model will serialize to the document it was read from
    pub fn is_verbatim(&self) -> bool {
        self.source.is_some()
    }

    fn handle_start(
        &mut self,
        elt: &BytesStart,
        current: &mut Option<ImageBuilder>,
    ) -> Result<(), MetadataError> {
        match elt.local_name().as_ref() {
            b"OME" => {
                let attrs = attributes_of(elt)?;
                for (key, value) in attrs {
                    match key.as_str() {
                        "xmlns" | "OME" if value.starts_with(OME_NAMESPACE) => {
                            let version = value[OME_NAMESPACE.len()..].trim_end_matches('/');
                            if !version.is_empty() {
                                self.schema_version = version.to_string();
                            }
                        }
                        "UUID" => self.uuid = value,
                        "Creator" => self.creator = Some(value),
                        _ => {}
                    }
                }
            }
            b"Plate" => {
                let attrs = attributes_of(elt)?;
                let name = lookup(&attrs, "Name")
                    .or_else(|| lookup(&attrs, "ID"))
                    .unwrap_or_default();
                self.plates.push(name.to_string());
            }
            b"Image" => {
                let attrs = attributes_of(elt)?;
                *current = Some(ImageBuilder {
                    id: lookup(&attrs, "ID")
                        .map(String::from)
                        .unwrap_or_else(|| format!("Image:{}", self.images.len())),
                    name: lookup(&attrs, "Name").map(String::from),
                    ..Default::default()
                });
            }
            b"Pixels" => {
                if let Some(image) = current.as_mut() {
                    let attrs = attributes_of(elt)?;
                    image.geometry = Some(parse_pixels(&attrs)?);
                    image.pixels_id = lookup(&attrs, "ID").map(String::from);
                    image.pixels_big_endian = lookup(&attrs, "BigEndian").and_then(parse_ome_bool);
                }
            }
            b"Channel" => {
                if let Some(image) = current.as_mut() {
                    let attrs = attributes_of(elt)?;
                    let samples_per_pixel = lookup(&attrs, "SamplesPerPixel")
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(1);
                    let channel_index = image.channels.len();
                    let image_index = self.images.len();
                    image.channels.push(OmeChannel {
                        id: lookup(&attrs, "ID")
                            .map(String::from)
                            .unwrap_or_else(|| format!("Channel:{image_index}:{channel_index}")),
                        name: lookup(&attrs, "Name").map(String::from),
                        samples_per_pixel,
                    });
                }
            }
            b"BinData" => {
                if let Some(image) = current.as_mut() {
                    if image.bin_data_big_endian.is_none() {
                        let attrs = attributes_of(elt)?;
                        image.bin_data_big_endian =
                            lookup(&attrs, "BigEndian").and_then(parse_ome_bool);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_image(&mut self, current: &mut Option<ImageBuilder>) -> Result<(), MetadataError> {
        if let Some(builder) = current.take() {
            let index = self.images.len();
            let image = builder.build(index)?;
            trace!("Read image {} ({})", index, image.id);
            self.images.push(image);
        }
        Ok(())
    }

    fn write_document<W: io::Write>(&self, writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = bstart!("OME");
        attrib!("xmlns", format!("{OME_NAMESPACE}{}", self.schema_version), root);
        attrib!("xmlns:xsi", XSI_NAMESPACE, root);
        attrib!(
            "xsi:schemaLocation",
            format!(
                "{OME_NAMESPACE}{v} {OME_NAMESPACE}{v}/ome.xsd",
                v = self.schema_version
            ),
            root
        );
        attrib!("UUID", self.uuid, root);
        if let Some(creator) = self.creator.as_ref() {
            attrib!("Creator", creator, root);
        }
        writer.write_event(Event::Start(root.borrow()))?;

        for (i, name) in self.plates.iter().enumerate() {
            let mut plate = bstart!("Plate");
            attrib!("ID", format!("Plate:{i}"), plate);
            if !name.is_empty() {
                attrib!("Name", name, plate);
            }
            writer.write_event(Event::Empty(plate))?;
        }

        for image in self.images.iter() {
            let geometry = &image.geometry;
            let mut image_elt = bstart!("Image");
            attrib!("ID", image.id, image_elt);
            if let Some(name) = image.name.as_ref() {
                attrib!("Name", name, image_elt);
            }
            writer.write_event(Event::Start(image_elt.borrow()))?;

            let mut pixels = bstart!("Pixels");
            attrib!("ID", image.pixels_id, pixels);
            attrib!("DimensionOrder", geometry.dimension_order, pixels);
            attrib!("Type", geometry.pixel_type, pixels);
            attrib!("SignificantBits", geometry.pixel_type.bits_per_sample(), pixels);
            attrib!("Interleaved", geometry.interleaved, pixels);
            attrib!("BigEndian", !geometry.little_endian, pixels);
            attrib!("SizeX", geometry.size_x, pixels);
            attrib!("SizeY", geometry.size_y, pixels);
            attrib!("SizeZ", geometry.size_z, pixels);
            attrib!("SizeC", geometry.size_c, pixels);
            attrib!("SizeT", geometry.size_t, pixels);
            writer.write_event(Event::Start(pixels.borrow()))?;

            for channel in image.channels.iter() {
                let mut channel_elt = bstart!("Channel");
                attrib!("ID", channel.id, channel_elt);
                if let Some(name) = channel.name.as_ref() {
                    attrib!("Name", name, channel_elt);
                }
                attrib!("SamplesPerPixel", channel.samples_per_pixel, channel_elt);
                writer.write_event(Event::Empty(channel_elt))?;
            }

            writer.write_event(Event::End(pixels.to_end()))?;
            writer.write_event(Event::End(image_elt.to_end()))?;
        }
        writer.write_event(Event::End(root.to_end()))?;
        Ok(())
    }
}

impl MetadataModel for OmeMetadata {
    fn populate_from_document(xml: &str) -> Result<Self, MetadataError> {
        let mut this = Self {
            images: Vec::new(),
            plates: Vec::new(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            uuid: String::new(),
            creator: None,
            source: None,
        };
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut current = None;
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    this.handle_start(e, &mut current)?;
                }
                Ok(Event::Empty(ref e)) => {
                    this.handle_start(e, &mut current)?;
                    if e.local_name().as_ref() == b"Image" {
                        this.finish_image(&mut current)?;
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.local_name().as_ref() == b"Image" {
                        this.finish_image(&mut current)?;
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(MetadataError::MalformedXml(e.to_string())),
            }
        }
        debug!(
            "Populated metadata with {} images and {} plates",
            this.images.len(),
            this.plates.len()
        );
        this.source = Some(xml.to_string());
        Ok(this)
    }

    fn serialize_to_document(&self) -> Result<String, MetadataError> {
        if let Some(source) = self.source.as_ref() {
            return Ok(source.clone());
        }
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_document(&mut writer)
            .map_err(|e| MetadataError::SerializationError(e.to_string()))?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| MetadataError::SerializationError(e.to_string()))
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn plane_geometry(&self, image_index: usize) -> Option<PlaneGeometry> {
        self.images.get(image_index).map(|image| image.geometry)
    }

    fn plate_count(&self) -> usize {
        self.plates.len()
    }

    fn schema_version(&self) -> &str {
        &self.schema_version
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2015-01" UUID="urn:uuid:1234">
  <Plate ID="Plate:0" Name="P1"/>
  <Image ID="Image:0" Name="first">
    <Pixels ID="Pixels:0" DimensionOrder="XYCZT" Type="uint16" SizeX="4" SizeY="2" SizeZ="3" SizeC="1" SizeT="1">
      <Channel ID="Channel:0:0" SamplesPerPixel="1"/>
      <BinData BigEndian="false" Length="0"/>
    </Pixels>
  </Image>
  <Image ID="Image:1">
    <Pixels ID="Pixels:1" DimensionOrder="XYZCT" Type="int8" BigEndian="true" SizeX="2" SizeY="2" SizeZ="1" SizeC="3" SizeT="1" Interleaved="true">
      <Channel ID="Channel:1:0" SamplesPerPixel="3"/>
    </Pixels>
  </Image>
</OME>"#;

    #[test_log::test]
    fn test_populate() -> Result<(), MetadataError> {
        let meta = OmeMetadata::populate_from_document(DOCUMENT)?;
        assert_eq!(meta.image_count(), 2);
        assert_eq!(meta.plate_count(), 1);
        assert_eq!(meta.schema_version(), "2015-01");
        assert_eq!(meta.uuid(), "urn:uuid:1234");

        let g0 = meta.plane_geometry(0).unwrap();
        assert_eq!((g0.size_x, g0.size_y, g0.size_z), (4, 2, 3));
        assert_eq!(g0.pixel_type, PixelType::Uint16);
        assert_eq!(g0.dimension_order, DimensionOrder::XYCZT);
        assert!(g0.little_endian);
        assert_eq!(g0.plane_count(), 3);

        let g1 = meta.plane_geometry(1).unwrap();
        assert!(!g1.little_endian);
        assert!(g1.interleaved);
        assert_eq!(g1.samples_per_pixel, 3);
        assert_eq!(g1.frame_count(), 1);
        assert_eq!(g1.plane_count(), 3);

        assert!(meta.plane_geometry(2).is_none());
        assert!(meta.is_verbatim());
        assert_eq!(meta.serialize_to_document()?, DOCUMENT);
        Ok(())
    }

    #[test_log::test]
    fn test_missing_size() {
        let doc = r#"<OME><Image ID="Image:0"><Pixels Type="uint8" SizeX="1" SizeY="1" SizeZ="1" SizeT="1"/></Image></OME>"#;
        let err = OmeMetadata::populate_from_document(doc).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::MissingAttribute {
                attribute: "SizeC",
                ..
            }
        ));

        let doc = r#"<OME><Image ID="Image:0"><Pixels Type="uint9" SizeX="1" SizeY="1" SizeZ="1" SizeC="1" SizeT="1"/></Image></OME>"#;
        assert!(matches!(
            OmeMetadata::populate_from_document(doc),
            Err(MetadataError::UnknownPixelType(_))
        ));
    }

    #[test_log::test]
    fn test_oversized_geometry() {
        let doc = r#"<OME><Image ID="Image:0"><Pixels Type="uint8" SizeX="4294967296" SizeY="4294967296" SizeZ="1" SizeC="1" SizeT="1"/></Image></OME>"#;
        assert!(matches!(
            OmeMetadata::populate_from_document(doc),
            Err(MetadataError::InvalidValue {
                element: "Pixels",
                ..
            })
        ));

        let doc = r#"<OME><Image ID="Image:0"><Pixels Type="uint8" SizeX="1" SizeY="1" SizeZ="4294967296" SizeC="4294967296" SizeT="2"/></Image></OME>"#;
        assert!(matches!(
            OmeMetadata::populate_from_document(doc),
            Err(MetadataError::InvalidValue {
                attribute: "SizeT",
                ..
            })
        ));

        let doc = r#"<OME><Image ID="Image:0"><Pixels Type="double" SizeX="4294967296" SizeY="268435456" SizeZ="1" SizeC="1" SizeT="1"><Channel ID="Channel:0:0" SamplesPerPixel="2"/></Pixels></Image></OME>"#;
        assert!(matches!(
            OmeMetadata::populate_from_document(doc),
            Err(MetadataError::InvalidValue {
                element: "Channel",
                attribute: "SamplesPerPixel",
                ..
            })
        ));
    }

    #[test_log::test]
    fn test_generate_and_reparse() -> Result<(), MetadataError> {
        let mut meta = OmeMetadata::new();
        meta.add_plate("screen");
        meta.add_image(
            Some("a & b".into()),
            PlaneGeometry::new(3, 2, PixelType::Float)
                .with_sizes(2, 2, 1)
                .with_little_endian(true),
        );
        meta.add_image(None, PlaneGeometry::new(5, 5, PixelType::Uint8));
        assert!(!meta.is_verbatim());

        let text = meta.serialize_to_document()?;
        assert!(text.starts_with("<?xml"));
        assert!(!text.contains("BinData"));
        assert!(text.contains("</Pixels>"));

        let reread = OmeMetadata::populate_from_document(&text)?;
        assert_eq!(reread.image_count(), 2);
        assert_eq!(reread.plate_count(), 1);
        assert_eq!(reread.plane_geometry(0), meta.plane_geometry(0));
        assert_eq!(reread.plane_geometry(1), meta.plane_geometry(1));
        assert_eq!(reread.image(0).unwrap().name.as_deref(), Some("a & b"));
        assert_eq!(reread.image(0).unwrap().channels.len(), 2);
        assert_eq!(reread.uuid(), meta.uuid());
        Ok(())
    }
}
