use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::codec::Bytes;

use super::reading_shared::{
    drive_sax, OmeXmlParserError, OmeXmlParserState, OmeXmlSAX, ParserResult, TextPosition,
};

/// A serialized OME-XML document cut at the end of every `Pixels` element.
///
/// Header fragment `i` runs up to where image `i`'s pixel data belongs. Every
/// header after the first begins with the `</Pixels>` closing the previous image,
/// and the tail closes the last one and finishes the document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FragmentSequence {
    pub headers: Vec<String>,
    pub tail: String,
}

impl FragmentSequence {
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Rewrites a document without any `BinData` elements and splits it around
/// each `Pixels` element's content.
struct FragmentSplitter {
    output: Writer<Bytes>,
    headers: Vec<String>,
}

impl FragmentSplitter {
    fn new() -> Result<Self, OmeXmlParserError> {
        let mut output = Writer::new(Bytes::new());
        output
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| OmeXmlParserError::XMLError(OmeXmlParserState::Start, e))?;
        Ok(Self {
            output,
            headers: Vec::new(),
        })
    }

    fn take_fragment(&mut self, state: OmeXmlParserState) -> Result<String, OmeXmlParserError> {
        let bytes = std::mem::take(self.output.get_mut());
        String::from_utf8(bytes).map_err(|e| OmeXmlParserError::MalformedDocument {
            state,
            line: 0,
            column: 0,
            message: e.to_string(),
        })
    }

    fn split_after_pixels(&mut self, state: OmeXmlParserState) -> Result<(), OmeXmlParserError> {
        let fragment = self.take_fragment(state)?;
        self.headers.push(fragment);
        self.output
            .write_event(Event::End(BytesEnd::new("Pixels")))
            .map_err(|e| OmeXmlParserError::XMLError(state, e))?;
        Ok(())
    }

    fn write(&mut self, event: Event, state: OmeXmlParserState) -> Result<(), OmeXmlParserError> {
        self.output
            .write_event(event)
            .map_err(|e| OmeXmlParserError::XMLError(state, e))
    }

    fn finish(mut self) -> Result<FragmentSequence, OmeXmlParserError> {
        let tail = self.take_fragment(OmeXmlParserState::Done)?;
        Ok(FragmentSequence {
            headers: self.headers,
            tail,
        })
    }
}

impl OmeXmlSAX for FragmentSplitter {
    fn start_element(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        _position: TextPosition,
    ) -> ParserResult {
        let next = state.enter(event.local_name().as_ref());
        if next != OmeXmlParserState::BinData {
            self.write(Event::Start(event.borrow()), state)?;
        }
        Ok(next)
    }

    fn empty_element(
        &mut self,
        event: &BytesStart,
        state: OmeXmlParserState,
        _position: TextPosition,
    ) -> ParserResult {
        match event.local_name().as_ref() {
            b"BinData" => {}
            b"Pixels" => {
                self.write(Event::Start(event.borrow()), state)?;
                self.split_after_pixels(state)?;
            }
            _ => {
                self.write(Event::Empty(event.borrow()), state)?;
            }
        }
        if state == OmeXmlParserState::Start {
            Ok(OmeXmlParserState::Document)
        } else {
            Ok(state)
        }
    }

    fn end_element(
        &mut self,
        event: &BytesEnd,
        state: OmeXmlParserState,
        depth: usize,
    ) -> ParserResult {
        match event.local_name().as_ref() {
            b"BinData" if state == OmeXmlParserState::BinData => {}
            b"Pixels" => self.split_after_pixels(state)?,
            _ => self.write(Event::End(event.borrow()), state)?,
        }
        Ok(state.exit(event.local_name().as_ref(), depth))
    }

    fn text(&mut self, event: &BytesText, state: OmeXmlParserState) -> ParserResult {
        if state != OmeXmlParserState::BinData {
            self.write(Event::Text(event.borrow()), state)?;
        }
        Ok(state)
    }

    fn other(&mut self, event: Event, state: OmeXmlParserState) -> ParserResult {
        if !matches!(event, Event::Decl(_)) {
            self.write(event, state)?;
        }
        Ok(state)
    }
}

/// Split a serialized metadata document into one header fragment per image and a
/// trailing fragment, dropping any `BinData` elements it contains.
pub fn split_fragments(xml: &str) -> Result<FragmentSequence, OmeXmlParserError> {
    let mut splitter = FragmentSplitter::new()?;
    drive_sax(xml.as_bytes(), &mut splitter)?;
    splitter.finish()
}
