use std::borrow::Cow;
use std::io::{self, prelude::*};

use log::{trace, warn};
use memchr::{memchr, memchr_iter, memrchr};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Reader, Writer};
use thiserror::Error;

use crate::codec::{Bytes, CodecError, CompressionType};
use crate::io::offset_index::{BinDataRecord, OffsetResolutionError};
use crate::meta::{parse_ome_bool, MetadataError};
use crate::plane::Region;

/**
The different states the OME-XML parsers can enter while walking a document.
This is mostly useful for locating where in the document an error occurred.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OmeXmlParserState {
    Start = 0,
    Document,
    Image,
    Pixels,
    BinData,
    Done,
    ParserError,
}

impl OmeXmlParserState {
    /// The state after opening an element named `local_name`
    pub fn enter(self, local_name: &[u8]) -> Self {
        match local_name {
            b"Image" => Self::Image,
            b"Pixels" => Self::Pixels,
            b"BinData" => Self::BinData,
            _ if self == Self::Start => Self::Document,
            _ => self,
        }
    }

    /// The state after closing an element named `local_name`
    pub fn exit(self, local_name: &[u8], depth: usize) -> Self {
        if depth == 0 {
            return Self::Done;
        }
        match local_name {
            b"BinData" => Self::Pixels,
            b"Pixels" => Self::Image,
            b"Image" => Self::Document,
            _ => self,
        }
    }
}

/// A 1-based line and byte column in a text stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextPosition {
    pub line: u64,
    pub column: u64,
}

/**
All the ways that reading an OME-XML document can go wrong
*/
#[derive(Debug, Error)]
pub enum OmeXmlParserError {
    #[error("Malformed document at line {line}, column {column} in {state:?}: {message}")]
    MalformedDocument {
        state: OmeXmlParserState,
        line: u64,
        column: u64,
        message: String,
    },
    #[error("Pixel data not found, the document contains no BinData elements")]
    NoPixelDataFound,
    #[error("Failed to resolve BinData offsets: {0}")]
    OffsetResolutionError(#[from] OffsetResolutionError),
    #[error("Block {block_index} at offset {offset} decoded to {actual} bytes, expected {expected}")]
    PlaneSizeMismatch {
        block_index: usize,
        offset: u64,
        expected: usize,
        actual: usize,
    },
    #[error("Failed to decode block {block_index} at offset {offset}: {source}")]
    CodecError {
        block_index: usize,
        offset: u64,
        #[source]
        source: CodecError,
    },
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
    #[error("Region {region:?} does not fit within a {size_x}x{size_y} plane")]
    RegionOutOfBounds {
        region: Region,
        size_x: usize,
        size_y: usize,
    },
    #[error("Failed to interpret document metadata: {0}")]
    MetadataError(#[from] MetadataError),
    #[error("No metadata model is available to interpret OME-XML documents")]
    UnavailableDependency,
    #[error("An XML error {1} was encountered in {0:?}")]
    XMLError(OmeXmlParserState, #[source] XMLError),
    #[error("An IO error {1} was encountered in {0:?}")]
    IOError(OmeXmlParserState, #[source] io::Error),
}

impl From<OmeXmlParserError> for io::Error {
    fn from(value: OmeXmlParserError) -> Self {
        match value {
            OmeXmlParserError::IOError(_, ref e) => io::Error::new(e.kind(), value),
            OmeXmlParserError::UnavailableDependency => {
                io::Error::new(io::ErrorKind::Unsupported, value)
            }
            OmeXmlParserError::ImageOutOfRange { .. }
            | OmeXmlParserError::PlaneOutOfRange { .. }
            | OmeXmlParserError::RegionOutOfBounds { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, value)
            }
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type ParserResult = Result<OmeXmlParserState, OmeXmlParserError>;

#[derive(Debug, Clone, Copy)]
struct LineDelta {
    length: usize,
    newlines: u64,
    after_last_newline: Option<usize>,
}

impl LineDelta {
    fn of(bytes: &[u8]) -> Self {
        let after_last_newline = memrchr(b'\n', bytes).map(|i| bytes.len() - i - 1);
        let newlines = if after_last_newline.is_some() {
            memchr_iter(b'\n', bytes).count() as u64
        } else {
            0
        };
        Self {
            length: bytes.len(),
            newlines,
            after_last_newline,
        }
    }
}

/**
Wraps a [`BufRead`] and keeps track of the line and byte column of the next
unread byte.

[`quick_xml::Reader`] consumes exactly through the closing `>` of each tag it
emits, so after a start tag is returned the position points at the first
byte of the element's content.
*/
#[derive(Debug)]
pub struct LineTrackingReader<R: BufRead> {
    inner: R,
    line: u64,
    column: u64,
    consumed: u64,
}

impl<R: BufRead> LineTrackingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 1,
            column: 1,
            consumed: 0,
        }
    }

    pub fn position(&self) -> TextPosition {
        TextPosition {
            line: self.line,
            column: self.column,
        }
    }

    /// The number of bytes consumed so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn track(&mut self, delta: LineDelta) {
        self.consumed += delta.length as u64;
        match delta.after_last_newline {
            Some(tail) => {
                self.line += delta.newlines;
                self.column = tail as u64 + 1;
            }
            None => {
                self.column += delta.length as u64;
            }
        }
    }

    /// Consume bytes up to but not including the next `delimiter`, without
    /// retaining them. Returns the number of bytes skipped.
    pub fn skip_until(&mut self, delimiter: u8) -> io::Result<u64> {
        let mut skipped = 0u64;
        loop {
            let (found, used) = {
                let buf = self.fill_buf()?;
                if buf.is_empty() {
                    return Ok(skipped);
                }
                match memchr(delimiter, buf) {
                    Some(i) => (true, i),
                    None => (false, buf.len()),
                }
            };
            self.consume(used);
            skipped += used as u64;
            if found {
                return Ok(skipped);
            }
        }
    }
}

impl<R: BufRead> Read for LineTrackingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.track(LineDelta::of(&buf[..n]));
        Ok(n)
    }
}

impl<R: BufRead> BufRead for LineTrackingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        // The bytes being consumed are still buffered, so this does not read
        let delta = match self.inner.fill_buf() {
            Ok(buf) => LineDelta::of(&buf[..amt.min(buf.len())]),
            Err(_) => LineDelta {
                length: amt,
                newlines: 0,
                after_last_newline: None,
            },
        };
        self.track(delta);
        self.inner.consume(amt);
    }
}

/**
An event-driven consumer of an OME-XML document. Each method returns the
parser state after handling its event.

`BinData` payloads are never passed to `text`, they are skipped on the
underlying stream as soon as `start_element` returns [`OmeXmlParserState::BinData`].
*/
pub trait OmeXmlSAX {
    fn start_element(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        position: TextPosition,
    ) -> ParserResult;

    fn empty_element(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        position: TextPosition,
    ) -> ParserResult;

    fn end_element(
        &mut self,
        event: &BytesEnd,
        state: OmeXmlParserState,
        depth: usize,
    ) -> ParserResult;

    fn text(&mut self, event: &BytesText, state: OmeXmlParserState) -> ParserResult;

    /// Declarations, comments, processing instructions, CDATA and doctypes
    fn other(&mut self, event: Event, state: OmeXmlParserState) -> ParserResult;
}

fn malformed(
    state: OmeXmlParserState,
    position: TextPosition,
    message: impl Into<String>,
) -> OmeXmlParserError {
    OmeXmlParserError::MalformedDocument {
        state,
        line: position.line,
        column: position.column,
        message: message.into(),
    }
}

/// Walk a complete document from `source`, feeding each event to `handler`.
///
/// Fails with [`OmeXmlParserError::MalformedDocument`] if the document is not
/// well-formed, including when elements are left open at the end of input.
pub fn drive_sax<R: BufRead, S: OmeXmlSAX>(
    source: R,
    handler: &mut S,
) -> Result<OmeXmlParserState, OmeXmlParserError> {
    let mut reader = Reader::from_reader(LineTrackingReader::new(source));
    reader.check_end_names(true);
    let mut buffer = Bytes::new();
    let mut state = OmeXmlParserState::Start;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buffer);
        let position = reader.get_ref().position();
        match event {
            Ok(Event::Start(ref e)) => {
                if state == OmeXmlParserState::Done {
                    return Err(malformed(state, position, "content after the root element"));
                }
                depth += 1;
                if log::log_enabled!(log::Level::Trace) {
                    trace!(
                        "Starting element: {}",
                        String::from_utf8_lossy(e.name().as_ref())
                    );
                }
                state = handler.start_element(e, state, position)?;
                if state == OmeXmlParserState::BinData {
                    reader
                        .get_mut()
                        .skip_until(b'<')
                        .map_err(|e| OmeXmlParserError::IOError(state, e))?;
                }
            }
            Ok(Event::Empty(ref e)) => {
                if state == OmeXmlParserState::Done {
                    return Err(malformed(state, position, "content after the root element"));
                }
                state = handler.empty_element(e, state, position)?;
                if depth == 0 {
                    state = OmeXmlParserState::Done;
                }
            }
            Ok(Event::End(ref e)) => {
                depth = depth.saturating_sub(1);
                state = handler.end_element(e, state, depth)?;
            }
            Ok(Event::Text(ref e)) => {
                state = handler.text(e, state)?;
            }
            Ok(Event::Eof) => {
                if depth != 0 {
                    return Err(malformed(
                        state,
                        position,
                        format!("{depth} elements were not closed"),
                    ));
                }
                if state == OmeXmlParserState::Start {
                    return Err(malformed(state, position, "no root element"));
                }
                break;
            }
            Ok(event) => {
                state = handler.other(event, state)?;
            }
            Err(err) => {
                return Err(malformed(state, position, err.to_string()));
            }
        }
        buffer.clear();
    }
    Ok(state)
}

fn escape_quotes(value: &[u8]) -> Cow<'_, [u8]> {
    if memchr(b'"', value).is_some() {
        let mut escaped = Bytes::with_capacity(value.len() + 8);
        for b in value {
            if *b == b'"' {
                escaped.extend_from_slice(b"&quot;");
            } else {
                escaped.push(*b);
            }
        }
        Cow::Owned(escaped)
    } else {
        Cow::Borrowed(value)
    }
}

/**
The offset-tracking pass over an OME-XML document.

Copies the document through unchanged except that `BinData` payloads are dropped,
`BinData` `Length` attributes are set to `0`, and `BigEndian` attributes holding
only a `t` or `f` are spelled out. Records where each payload begins.
*/
pub struct BinDataExtractor {
    output: Writer<Bytes>,
    records: Vec<BinDataRecord>,
}

impl std::fmt::Debug for BinDataExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinDataExtractor")
            .field("output", &"...")
            .field("records", &self.records)
            .finish()
    }
}

impl Default for BinDataExtractor {
    fn default() -> Self {
        Self {
            output: Writer::new(Bytes::new()),
            records: Vec::new(),
        }
    }
}

impl BinDataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[BinDataRecord] {
        &self.records
    }

    /// Rebuild `event` if any of its attributes need rewriting
    fn rewrite<'a>(
        &self,
        event: &'a BytesStart,
        is_bin_data: bool,
        state: OmeXmlParserState,
        position: TextPosition,
    ) -> Result<(Option<BytesStart<'a>>, CompressionType), OmeXmlParserError> {
        let mut changed = false;
        let mut compression = CompressionType::NoCompression;
        let mut attributes: Vec<Attribute<'a>> = Vec::new();

        for attr in event.attributes() {
            let attr = attr.map_err(|e| malformed(state, position, e.to_string()))?;
            let key = attr.key.local_name();
            match key.as_ref() {
                b"Length" if is_bin_data => {
                    changed = true;
                    attributes.push(Attribute {
                        key: attr.key,
                        value: Cow::Borrowed(b"0"),
                    });
                }
                b"BigEndian" => {
                    let raw = String::from_utf8_lossy(&attr.value).to_string();
                    match parse_ome_bool(&raw) {
                        Some(flag) if raw != "true" && raw != "false" => {
                            warn!("Normalizing BigEndian={raw:?} to {flag}");
                            changed = true;
                            let value: &'static [u8] = if flag { b"true" } else { b"false" };
                            attributes.push(Attribute {
                                key: attr.key,
                                value: Cow::Borrowed(value),
                            });
                        }
                        _ => attributes.push(attr),
                    }
                }
                b"Compression" if is_bin_data => {
                    let value = attr
                        .unescape_value()
                        .map_err(|e| malformed(state, position, e.to_string()))?;
                    compression = CompressionType::from_name_lenient(&value);
                    attributes.push(attr);
                }
                _ => attributes.push(attr),
            }
        }

        if !changed {
            return Ok((None, compression));
        }
        let name = String::from_utf8_lossy(event.name().as_ref()).into_owned();
        let mut rebuilt = BytesStart::new(name);
        for attr in attributes {
            let value = escape_quotes(&attr.value).into_owned();
            rebuilt.push_attribute(Attribute {
                key: attr.key,
                value: Cow::Owned(value),
            });
        }
        Ok((Some(rebuilt), compression))
    }

    fn handle_start(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        position: TextPosition,
        empty: bool,
    ) -> ParserResult {
        let is_bin_data = event.local_name().as_ref() == b"BinData";
        let (rebuilt, compression) = self.rewrite(event, is_bin_data, state, position)?;
        if is_bin_data {
            trace!(
                "BinData {} at line {}, column {} ({compression})",
                self.records.len(),
                position.line,
                position.column
            );
            self.records
                .push(BinDataRecord::new(position.line, position.column, compression));
        }
        let elt = rebuilt.unwrap_or_else(|| event.borrow());
        let written = if empty {
            self.output.write_event(Event::Empty(elt))
        } else {
            self.output.write_event(Event::Start(elt))
        };
        written.map_err(|e| OmeXmlParserError::XMLError(state, e))?;
        Ok(state)
    }

    /// Consume the extractor, returning the payload-free document text and the
    /// payload positions
    pub fn finish(self) -> Result<(String, Vec<BinDataRecord>), OmeXmlParserError> {
        let text = String::from_utf8(self.output.into_inner()).map_err(|e| {
            OmeXmlParserError::MalformedDocument {
                state: OmeXmlParserState::Done,
                line: 0,
                column: 0,
                message: e.to_string(),
            }
        })?;
        Ok((text, self.records))
    }
}

impl OmeXmlSAX for BinDataExtractor {
    fn start_element(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        position: TextPosition,
    ) -> ParserResult {
        self.handle_start(event, state, position, false)?;
        Ok(state.enter(event.local_name().as_ref()))
    }

    fn empty_element(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        position: TextPosition,
    ) -> ParserResult {
        let state = if state == OmeXmlParserState::Start {
            OmeXmlParserState::Document
        } else {
            state
        };
        self.handle_start(event, state, position, true)
    }

    fn end_element(
        &mut self,
        event: &BytesEnd,
        state: OmeXmlParserState,
        depth: usize,
    ) -> ParserResult {
        self.output
            .write_event(Event::End(event.borrow()))
            .map_err(|e| OmeXmlParserError::XMLError(state, e))?;
        Ok(state.exit(event.local_name().as_ref(), depth))
    }

    fn text(&mut self, event: &BytesText, state: OmeXmlParserState) -> ParserResult {
        if state != OmeXmlParserState::BinData {
            self.output
                .write_event(Event::Text(event.borrow()))
                .map_err(|e| OmeXmlParserError::XMLError(state, e))?;
        }
        Ok(state)
    }

    fn other(&mut self, event: Event, state: OmeXmlParserState) -> ParserResult {
        self.output
            .write_event(event)
            .map_err(|e| OmeXmlParserError::XMLError(state, e))?;
        Ok(state)
    }
}

/// Parse a complete OME-XML document from `source`, returning the document text
/// with all `BinData` payloads removed and the position of each payload.
///
/// Fails with [`OmeXmlParserError::NoPixelDataFound`] if there are no `BinData`
/// elements at all.
pub fn parse_document<R: BufRead>(
    source: R,
) -> Result<(String, Vec<BinDataRecord>), OmeXmlParserError> {
    let mut extractor = BinDataExtractor::new();
    drive_sax(source, &mut extractor)?;
    let (text, records) = extractor.finish()?;
    if records.is_empty() {
        return Err(OmeXmlParserError::NoPixelDataFound);
    }
    Ok((text, records))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::offset_index::resolve_offsets;

    const DOC: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<!-- leading comment -->
<OME xmlns=\"http://www.openmicroscopy.org/Schemas/OME/2016-06\">
  <Image ID=\"Image:0\" Name=\"a &amp; b\">
    <Pixels ID=\"Pixels:0\" BigEndian=\"t\" Type=\"uint8\">
      <BinData Length=\"4\" BigEndian=\"f\" Compression=\"zlib\">QUJD
RA==</BinData><BinData Length=\"4\">RUZHSA==</BinData>
      <BinData Length=\"0\"/>
    </Pixels>
  </Image>
</OME>
";

    #[test_log::test]
    fn test_parse_document() -> Result<(), OmeXmlParserError> {
        let (text, records) = parse_document(DOC.as_bytes())?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].compression, CompressionType::Zlib);
        assert_eq!(records[1].compression, CompressionType::NoCompression);
        assert_eq!((records[0].line, records[0].column), (6, 60));

        assert!(!text.contains("QUJD"));
        assert!(!text.contains("RUZHSA"));
        assert!(!text.contains("Length=\"4\""));
        assert!(text.contains("<BinData Length=\"0\" BigEndian=\"false\" Compression=\"zlib\"></BinData>"));
        assert!(text.contains("<Pixels ID=\"Pixels:0\" BigEndian=\"true\" Type=\"uint8\">"));
        assert!(text.contains("Name=\"a &amp; b\""));
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- leading comment -->"));

        let table = resolve_offsets(&mut DOC.as_bytes(), 0, &records)?;
        let bytes = DOC.as_bytes();
        assert_eq!(&bytes[table[0] as usize..table[0] as usize + 4], b"QUJD");
        assert_eq!(&bytes[table[1] as usize..table[1] as usize + 4], b"RUZH");
        assert_eq!(bytes[table[2] as usize], b'\n');
        assert!(table[0] < table[1] && table[1] < table[2]);
        Ok(())
    }

    #[test]
    fn test_extractor_debug() {
        let extractor = BinDataExtractor::new();
        let text = format!("{extractor:?}");
        assert!(text.starts_with("BinDataExtractor"));
        assert!(text.contains("records: []"));
    }

    #[test_log::test]
    fn test_no_pixel_data() {
        let doc = "<?xml version=\"1.0\"?><OME><Image><Pixels/></Image></OME>";
        assert!(matches!(
            parse_document(doc.as_bytes()),
            Err(OmeXmlParserError::NoPixelDataFound)
        ));
    }

    #[test_log::test]
    fn test_malformed() {
        let unclosed = "<?xml version=\"1.0\"?>\n<OME><Image><BinData>AAAA</BinData>";
        let err = parse_document(unclosed.as_bytes()).unwrap_err();
        assert!(matches!(err, OmeXmlParserError::MalformedDocument { .. }));

        let mismatched = "<OME><Image></Pixels></OME>";
        let err = parse_document(mismatched.as_bytes()).unwrap_err();
        assert!(matches!(err, OmeXmlParserError::MalformedDocument { .. }));

        let err = parse_document("".as_bytes()).unwrap_err();
        assert!(matches!(err, OmeXmlParserError::MalformedDocument { .. }));
    }

    #[test]
    fn test_line_tracking() -> io::Result<()> {
        let mut reader = LineTrackingReader::new(&b"ab\ncd<ef\ng"[..]);
        assert_eq!(reader.position(), TextPosition { line: 1, column: 1 });
        assert_eq!(reader.skip_until(b'<')?, 5);
        assert_eq!(reader.position(), TextPosition { line: 2, column: 3 });
        let mut rest = String::new();
        reader.read_to_string(&mut rest)?;
        assert_eq!(rest, "<ef\ng");
        assert_eq!(reader.position(), TextPosition { line: 3, column: 2 });
        assert_eq!(reader.consumed(), 10);
        Ok(())
    }

    #[test]
    fn test_state_transitions() {
        use OmeXmlParserState::*;
        assert_eq!(Start.enter(b"OME"), Document);
        assert_eq!(Document.enter(b"Image"), Image);
        assert_eq!(Pixels.enter(b"BinData"), BinData);
        assert_eq!(BinData.exit(b"BinData", 3), Pixels);
        assert_eq!(Pixels.exit(b"Pixels", 2), Image);
        assert_eq!(Document.exit(b"OME", 0), Done);
    }
}
