use std::fmt::Display;
use std::fs;
use std::io;
use std::path;

use std::io::prelude::*;

use crate::io::ome_xml::{is_ome_xml, OmeXmlReader, DETECTION_WINDOW};
use crate::meta::{DefaultMetadata, MetadataModel};

/// Microscopy file formats that [`omexml`](crate) supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicroscopyFormat {
    OmeXml,
    Unknown,
}

impl MicroscopyFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OmeXml => "OME-XML",
            Self::Unknown => "Unknown",
        }
    }

    /// The file name suffixes associated with this format
    pub const fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Self::OmeXml => &["ome", "ome.xml"],
            Self::Unknown => &[],
        }
    }
}

impl Display for MicroscopyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Given a path, infer the file format from its name
pub fn infer_from_path<P: Into<path::PathBuf>>(path: P) -> MicroscopyFormat {
    let path: path::PathBuf = path.into();
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return MicroscopyFormat::Unknown,
    };
    let matches_suffix = MicroscopyFormat::OmeXml
        .suffixes()
        .iter()
        .any(|suffix| name.ends_with(&format!(".{suffix}")));
    if matches_suffix {
        MicroscopyFormat::OmeXml
    } else {
        MicroscopyFormat::Unknown
    }
}

/// Given a stream of bytes, infer the file format from its first bytes. This
/// assumes the stream is seekable, and restores its position.
///
/// OME-XML documents can only be recognized when a metadata model is available.
pub fn infer_from_stream<R: Read + Seek>(stream: &mut R) -> io::Result<MicroscopyFormat> {
    if !DefaultMetadata::is_available() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "No metadata model is available to read OME-XML",
        ));
    }
    let mut buf = Vec::with_capacity(DETECTION_WINDOW);
    let current_pos = stream.stream_position()?;
    stream
        .by_ref()
        .take(DETECTION_WINDOW as u64)
        .read_to_end(&mut buf)?;
    stream.seek(io::SeekFrom::Start(current_pos))?;
    if is_ome_xml(&buf) {
        Ok(MicroscopyFormat::OmeXml)
    } else {
        Ok(MicroscopyFormat::Unknown)
    }
}

/// Given a path, infer the file format by its name, falling back to its content
pub fn infer_format<P: Into<path::PathBuf>>(path: P) -> io::Result<MicroscopyFormat> {
    let path: path::PathBuf = path.into();
    match infer_from_path(path.clone()) {
        MicroscopyFormat::Unknown => {
            let mut handle = fs::File::open(path)?;
            infer_from_stream(&mut handle)
        }
        format => Ok(format),
    }
}

/// Given a local file system path, infer the file format, and attempt to open it
/// for reading.
pub fn open_file<P: Into<path::PathBuf>>(path: P) -> io::Result<OmeXmlReader<fs::File>> {
    let path: path::PathBuf = path.into();
    match infer_format(path.clone())? {
        MicroscopyFormat::OmeXml => {
            let handle = fs::File::open(path)?;
            Ok(OmeXmlReader::new(handle)?)
        }
        MicroscopyFormat::Unknown => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("Could not infer the format of {}", path.display()),
        )),
    }
}
