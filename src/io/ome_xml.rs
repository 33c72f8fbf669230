//! Read and write OME-XML documents, which embed each plane of pixel data as a
//! base64 encoded, optionally compressed `BinData` element inside the metadata.
//!
//! Reading happens in two passes over the stream. The first pass copies the
//! document without its `BinData` payloads while recording the line and column
//! where each payload begins, and the second converts those positions into byte
//! offsets so that planes can later be decoded with a single seek.
//!
//! Writing splits the serialized metadata at each image's `Pixels` element and
//! streams planes into the gaps.
mod fragments;
mod reader;
mod reading_shared;
mod writer;

use memchr::memmem;

pub use fragments::{split_fragments, FragmentSequence};
pub use reader::{OmeXmlReader, OmeXmlReaderType, PlaneLocation};
pub use reading_shared::{
    drive_sax, parse_document, BinDataExtractor, LineTrackingReader, OmeXmlParserError,
    OmeXmlParserState, OmeXmlSAX, ParserResult, TextPosition,
};
pub use writer::{
    OmeXmlWriter, OmeXmlWriterError, OmeXmlWriterState, OmeXmlWriterType, WriterResult,
};

/// How many leading bytes are examined when detecting an OME-XML document
pub const DETECTION_WINDOW: usize = 64;

/// Test whether `head`, the first bytes of a stream, looks like an OME-XML document
pub fn is_ome_xml(head: &[u8]) -> bool {
    let head = &head[..head.len().min(DETECTION_WINDOW)];
    head.starts_with(b"<?xml") && memmem::find(head, b"<OME").is_some()
}
