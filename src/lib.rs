//! `omexml` reads and writes OME-XML, the XML flavour of the Open Microscopy
//! Environment format, where pixel data is stored inline as base64 encoded
//! `BinData` elements.
//!
//! Reading indexes every `BinData` payload by byte offset so individual planes
//! can be decoded on demand without holding the document's pixel data in memory:
//!
//! ```no_run
//! use omexml::prelude::*;
//! use omexml::OmeXmlReader;
//!
//! # fn main() -> std::io::Result<()> {
//! let mut reader = OmeXmlReader::open_path("./test/data/two_images.ome")?;
//! for plane in reader.iter_planes(0) {
//!     println!("{} bytes", plane?.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Writing streams planes into the serialized metadata in image order, see
//! [`OmeXmlWriterType`](crate::io::OmeXmlWriterType).
pub mod codec;
pub mod io;
pub mod meta;
pub mod plane;
pub mod prelude;

pub use crate::codec::{CodecError, CodecOptions, CompressionType};
pub use crate::io::{
    infer_format, open_file, MicroscopyFormat, OmeXmlParserError, OmeXmlReader,
    OmeXmlReaderType, OmeXmlWriter, OmeXmlWriterError, OmeXmlWriterType,
};
pub use crate::io::traits::{PlaneSource, PlaneWriter, SeekRead};
pub use crate::meta::{DefaultMetadata, MetadataModel, PixelType, PlaneGeometry};
pub use crate::plane::{Plane, Region};
