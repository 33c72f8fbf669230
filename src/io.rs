pub mod ome_xml;
mod offset_index;
pub mod traits;
mod infer_format;

pub use crate::io::ome_xml::{
    is_ome_xml, OmeXmlParserError, OmeXmlReader, OmeXmlReaderType, OmeXmlWriter,
    OmeXmlWriterError, OmeXmlWriterType,
};
pub use crate::io::offset_index::{
    resolve_offsets, BinDataRecord, ByteOffsetTable, OffsetResolutionError,
};
pub use crate::io::traits::{PlaneIter, PlaneSource, PlaneWriter, SeekRead};
pub use crate::io::infer_format::{
    infer_format, infer_from_path, infer_from_stream, open_file, MicroscopyFormat,
};
