//! The reversible byte transforms that may be applied to a plane of pixel data
//! before it is base64 encoded into a `BinData` element.
//!
//! Each [`Codec`] is stateless and is parameterized per call by a [`CodecOptions`].
//! [`CompressionType`] names the algorithms and dispatches to them.
mod encodings;
mod options;
#[cfg(any(feature = "jpeg", feature = "jpeg2000"))]
mod raster;

pub use encodings::{
    Base64Codec, Bytes, Codec, CodecError, CompressionType, PackBitsCodec, PassThroughCodec,
    ZlibCodec,
};
#[cfg(feature = "bzip2")]
pub use encodings::Bzip2Codec;
pub use options::CodecOptions;
#[cfg(feature = "jpeg2000")]
pub use raster::Jpeg2000Codec;
#[cfg(feature = "jpeg")]
pub use raster::JpegCodec;
