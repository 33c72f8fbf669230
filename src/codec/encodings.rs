use std::fmt::Display;
use std::io::{self, prelude::*};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::warn;
use thiserror::Error;

use crate::meta::PixelType;

use super::options::CodecOptions;
#[cfg(feature = "jpeg2000")]
use super::raster::Jpeg2000Codec;
#[cfg(feature = "jpeg")]
use super::raster::JpegCodec;

pub type Bytes = Vec<u8>;

/// The compression schemes that may be declared on a `BinData` element's `Compression`
/// attribute. Base64 encoding is applied on top of all of these and is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompressionType {
    #[default]
    NoCompression,
    Zlib,
    Bzip2,
    PackBits,
    Jpeg,
    Jpeg2000,
}

impl Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl CompressionType {
    /// Every compression method this build is able to decode
    pub const COMPRESSION_METHODS: &[Self] = &[
        Self::NoCompression,
        Self::Zlib,
        #[cfg(feature = "bzip2")]
        Self::Bzip2,
        Self::PackBits,
        #[cfg(feature = "jpeg")]
        Self::Jpeg,
        #[cfg(feature = "jpeg2000")]
        Self::Jpeg2000,
    ];

    /// Every compression method this build is able to encode with when writing
    pub const WRITABLE_METHODS: &[Self] = &[
        Self::NoCompression,
        Self::Zlib,
        #[cfg(feature = "bzip2")]
        Self::Bzip2,
        #[cfg(feature = "jpeg")]
        Self::Jpeg,
    ];

    /// The name used in the `Compression` attribute
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NoCompression => "Uncompressed",
            Self::Zlib => "zlib",
            Self::Bzip2 => "bzip2",
            Self::PackBits => "PackBits",
            Self::Jpeg => "JPEG",
            Self::Jpeg2000 => "J2K",
        }
    }

    /// Parse a `Compression` attribute value.
    ///
    /// An empty value or `"none"` means the payload is not compressed. Unknown names
    /// return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty()
            || name.eq_ignore_ascii_case("none")
            || name.eq_ignore_ascii_case("uncompressed")
        {
            return Some(Self::NoCompression);
        }
        [
            Self::Zlib,
            Self::Bzip2,
            Self::PackBits,
            Self::Jpeg,
            Self::Jpeg2000,
        ]
        .into_iter()
        .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Like [`CompressionType::from_name`], but unknown names are treated as uncompressed
    /// and reported.
    pub fn from_name_lenient(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!("Unknown compression type {name:?}, treating payload as uncompressed");
            Self::NoCompression
        })
    }

    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::NoCompression)
    }

    pub fn is_available(&self) -> bool {
        Self::COMPRESSION_METHODS.contains(self)
    }

    pub fn is_writable(&self) -> bool {
        Self::WRITABLE_METHODS.contains(self)
    }

    /// The pixel types that may be written with this compression method
    pub fn supported_pixel_types(&self) -> &'static [PixelType] {
        match self {
            Self::Jpeg | Self::Jpeg2000 => &[PixelType::Int8, PixelType::Uint8],
            _ => PixelType::ALL,
        }
    }

    pub fn supports_pixel_type(&self, pixel_type: PixelType) -> bool {
        self.supported_pixel_types().contains(&pixel_type)
    }

    /// Get the [`Codec`] implementing this compression method, if it was compiled in
    pub fn codec(&self) -> Result<&'static dyn Codec, CodecError> {
        match self {
            Self::NoCompression => Ok(&PassThroughCodec),
            Self::Zlib => Ok(&ZlibCodec),
            #[cfg(feature = "bzip2")]
            Self::Bzip2 => Ok(&Bzip2Codec),
            Self::PackBits => Ok(&PackBitsCodec),
            #[cfg(feature = "jpeg")]
            Self::Jpeg => Ok(&JpegCodec),
            #[cfg(feature = "jpeg2000")]
            Self::Jpeg2000 => Ok(&Jpeg2000Codec),
            #[allow(unreachable_patterns)]
            _ => Err(CodecError::Unsupported(*self)),
        }
    }

    pub fn compress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        self.codec()?.compress(data, options)
    }

    pub fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        self.codec()?.decompress(data, options)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode base64 payload: {0}")]
    Base64Error(String),
    #[error("An error occurred while compressing with {0}: {1}")]
    CompressionError(CompressionType, String),
    #[error("An error occurred while decompressing {0}: {1}")]
    DecompressionError(CompressionType, String),
    #[error("{codec} does not support {bits_per_sample}-bit samples (signed: {signed})")]
    UnsupportedPixelType {
        codec: CompressionType,
        bits_per_sample: usize,
        signed: bool,
    },
    #[error("{0} compression is not available")]
    Unsupported(CompressionType),
    #[error("An IO error occurred: {0}")]
    IOError(#[from] io::Error),
}

impl From<CodecError> for io::Error {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::Unsupported(_) | CodecError::UnsupportedPixelType { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, value)
            }
            CodecError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// A reversible byte transform applied to a single plane of pixel data.
///
/// Implementations hold no state, and the same [`CodecOptions`] must be passed
/// to [`Codec::decompress`] as were passed to [`Codec::compress`].
pub trait Codec {
    fn compression(&self) -> CompressionType;

    fn compress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError>;

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError>;
}

/// Returns `data` unchanged. Decompression still honors [`CodecOptions::max_bytes`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn compression(&self) -> CompressionType {
        CompressionType::NoCompression
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> Result<Bytes, CodecError> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        let end = options.max_bytes.unwrap_or(data.len()).min(data.len());
        Ok(data[..end].to_vec())
    }
}

/// The outermost transform of every `BinData` payload.
///
/// Decoding ignores ASCII whitespace, since payloads are frequently wrapped
/// across lines, and tolerates missing trailing padding.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Codec;

impl Base64Codec {
    pub fn encode(data: &[u8]) -> Bytes {
        base64_simd::STANDARD.encode_type::<Bytes>(data)
    }

    /// The padded encoded length of `n` bytes, saturating instead of overflowing
    pub fn encoded_length(n: usize) -> usize {
        (n / 3 + usize::from(n % 3 != 0)).saturating_mul(4)
    }

    pub fn decode(data: &[u8], max_bytes: Option<usize>) -> Result<Bytes, CodecError> {
        let mut cleaned: Bytes = data
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if let Some(max_bytes) = max_bytes {
            cleaned.truncate(Self::encoded_length(max_bytes));
        }
        if cleaned.is_empty() {
            return Ok(Bytes::new());
        }
        let decoded = if cleaned.len() % 4 == 0 {
            base64_simd::STANDARD.decode_type::<Bytes>(&cleaned)
        } else {
            base64_simd::STANDARD_NO_PAD.decode_type::<Bytes>(&cleaned)
        };
        let mut decoded = decoded.map_err(|e| CodecError::Base64Error(e.to_string()))?;
        if let Some(max_bytes) = max_bytes {
            decoded.truncate(max_bytes);
        }
        Ok(decoded)
    }
}

impl Codec for Base64Codec {
    fn compression(&self) -> CompressionType {
        CompressionType::NoCompression
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> Result<Bytes, CodecError> {
        Ok(Self::encode(data))
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        Self::decode(data, options.max_bytes)
    }
}

fn read_bounded<R: Read>(
    reader: R,
    options: &CodecOptions,
    compression: CompressionType,
) -> Result<Bytes, CodecError> {
    let mut result = Bytes::new();
    let outcome = match options.max_bytes {
        Some(limit) => reader.take(limit as u64).read_to_end(&mut result),
        None => {
            let mut reader = reader;
            reader.read_to_end(&mut result)
        }
    };
    outcome.map_err(|e| CodecError::DecompressionError(compression, e.to_string()))?;
    Ok(result)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn compression(&self) -> CompressionType {
        CompressionType::Zlib
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> Result<Bytes, CodecError> {
        let result = Bytes::new();
        let mut compressor = ZlibEncoder::new(result, Compression::best());
        compressor
            .write_all(data)
            .and_then(|_| compressor.finish())
            .map_err(|e| CodecError::CompressionError(self.compression(), e.to_string()))
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        read_bounded(ZlibDecoder::new(data), options, self.compression())
    }
}

#[cfg(feature = "bzip2")]
const BZIP2_MAGIC: &[u8] = b"BZ";

/// Block-sorting compression.
///
/// Stored payloads carry the two byte `BZ` stream signature ahead of the compressed
/// stream. It is stripped before decoding and restored for the decoder, which
/// expects a complete stream.
#[cfg(feature = "bzip2")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Bzip2Codec;

#[cfg(feature = "bzip2")]
impl Codec for Bzip2Codec {
    fn compression(&self) -> CompressionType {
        CompressionType::Bzip2
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> Result<Bytes, CodecError> {
        let mut compressor = bzip2::write::BzEncoder::new(Bytes::new(), bzip2::Compression::best());
        compressor
            .write_all(data)
            .and_then(|_| compressor.finish())
            .map_err(|e| CodecError::CompressionError(self.compression(), e.to_string()))
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        if data.len() < BZIP2_MAGIC.len() {
            return Err(CodecError::DecompressionError(
                self.compression(),
                format!("payload of {} bytes is too short to hold a header", data.len()),
            ));
        }
        let stream = BZIP2_MAGIC.chain(&data[BZIP2_MAGIC.len()..]);
        read_bounded(
            bzip2::read::BzDecoder::new(stream),
            options,
            self.compression(),
        )
    }
}

/// Byte-oriented run-length encoding as used in TIFF and PICT.
///
/// A header byte `n` in `0..=127` is followed by `n + 1` literal bytes, a header in
/// `-127..=-1` repeats the next byte `1 - n` times and `-128` is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackBitsCodec;

impl PackBitsCodec {
    const MAX_RUN: usize = 128;
}

impl Codec for PackBitsCodec {
    fn compression(&self) -> CompressionType {
        CompressionType::PackBits
    }

    fn compress(&self, data: &[u8], _options: &CodecOptions) -> Result<Bytes, CodecError> {
        let mut output = Bytes::with_capacity(data.len() + data.len() / Self::MAX_RUN + 1);
        let n = data.len();
        let mut i = 0;
        while i < n {
            let mut run = 1;
            while i + run < n && run < Self::MAX_RUN && data[i + run] == data[i] {
                run += 1;
            }
            if run > 1 {
                output.push((1 - run as i16) as i8 as u8);
                output.push(data[i]);
                i += run;
            } else {
                let start = i;
                i += 1;
                while i < n && i - start < Self::MAX_RUN {
                    if i + 1 < n && data[i] == data[i + 1] {
                        break;
                    }
                    i += 1;
                }
                output.push((i - start - 1) as u8);
                output.extend_from_slice(&data[start..i]);
            }
        }
        Ok(output)
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        let limit = options.max_bytes.unwrap_or(usize::MAX);
        let mut output = Bytes::with_capacity(limit.min(data.len().saturating_mul(2)));
        let mut input_pos = 0;

        while output.len() < limit && input_pos < data.len() {
            let code = data[input_pos] as i8;
            input_pos += 1;

            if code == -128 {
                continue;
            } else if code < 0 {
                let run_length = (1 - code as i32) as usize;
                let Some(byte) = data.get(input_pos).copied() else {
                    return Err(CodecError::DecompressionError(
                        self.compression(),
                        "unexpected end of input in run".into(),
                    ));
                };
                input_pos += 1;
                let run_length = run_length.min(limit - output.len());
                output.extend(std::iter::repeat(byte).take(run_length));
            } else {
                let literal_count = code as usize + 1;
                if input_pos + literal_count > data.len() {
                    return Err(CodecError::DecompressionError(
                        self.compression(),
                        "not enough literal bytes".into(),
                    ));
                }
                let take = literal_count.min(limit - output.len());
                output.extend_from_slice(&data[input_pos..input_pos + take]);
                input_pos += literal_count;
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gradient(n: usize) -> Bytes {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_names() {
        for method in [
            CompressionType::NoCompression,
            CompressionType::Zlib,
            CompressionType::Bzip2,
            CompressionType::PackBits,
            CompressionType::Jpeg,
            CompressionType::Jpeg2000,
        ] {
            assert_eq!(CompressionType::from_name(method.name()), Some(method));
        }
        assert_eq!(
            CompressionType::from_name(""),
            Some(CompressionType::NoCompression)
        );
        assert_eq!(
            CompressionType::from_name("none"),
            Some(CompressionType::NoCompression)
        );
        assert_eq!(CompressionType::from_name("ZLIB"), Some(CompressionType::Zlib));
        assert_eq!(CompressionType::from_name("lzw"), None);
        assert_eq!(
            CompressionType::from_name_lenient("lzw"),
            CompressionType::NoCompression
        );
    }

    #[test]
    fn test_pixel_type_restrictions() {
        assert!(CompressionType::Jpeg.supports_pixel_type(PixelType::Uint8));
        assert!(CompressionType::Jpeg.supports_pixel_type(PixelType::Int8));
        assert!(!CompressionType::Jpeg.supports_pixel_type(PixelType::Uint16));
        assert!(!CompressionType::Jpeg2000.supports_pixel_type(PixelType::Float));
        assert!(CompressionType::Zlib.supports_pixel_type(PixelType::Double));
    }

    #[test]
    fn test_base64() -> Result<(), CodecError> {
        let data = gradient(100);
        let encoded = Base64Codec::encode(&data);
        let mut wrapped = Bytes::new();
        for chunk in encoded.chunks(19) {
            wrapped.extend_from_slice(b"\n  ");
            wrapped.extend_from_slice(chunk);
        }
        wrapped.extend_from_slice(b"\n");
        assert_eq!(Base64Codec::decode(&wrapped, None)?, data);
        assert_eq!(Base64Codec::decode(&wrapped, Some(10))?, &data[..10]);
        assert!(Base64Codec::decode(b"   \n ", None)?.is_empty());
        assert!(Base64Codec::decode(b"!!!!", None).is_err());
        Ok(())
    }

    #[test]
    fn test_zlib() -> Result<(), CodecError> {
        let data = gradient(4096);
        let opts = CodecOptions::new(64, 64, 8);
        let compressed = ZlibCodec.compress(&data, &opts)?;
        assert!(compressed.len() < data.len());
        assert_eq!(ZlibCodec.decompress(&compressed, &opts)?, data);

        let bounded = ZlibCodec.decompress(&compressed, &opts.with_max_bytes(100))?;
        assert_eq!(bounded, &data[..100]);

        assert!(ZlibCodec.decompress(b"not zlib at all", &opts).is_err());
        Ok(())
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn test_bzip2() -> Result<(), CodecError> {
        let data = gradient(2000);
        let opts = CodecOptions::new(40, 50, 8);
        let compressed = Bzip2Codec.compress(&data, &opts)?;
        assert_eq!(&compressed[..2], BZIP2_MAGIC);
        assert_eq!(Bzip2Codec.decompress(&compressed, &opts)?, data);

        // Only the two header bytes are stripped, whatever they hold
        let mut relabeled = compressed.clone();
        relabeled[0] = 0;
        relabeled[1] = 0;
        assert_eq!(Bzip2Codec.decompress(&relabeled, &opts)?, data);

        assert!(Bzip2Codec.decompress(b"B", &opts).is_err());
        Ok(())
    }

    #[test]
    fn test_packbits() -> Result<(), CodecError> {
        let opts = CodecOptions::default();
        let mut data = vec![7u8; 300];
        data.extend(gradient(300));
        data.extend([1, 1, 2, 3, 3, 3, 4]);
        let packed = PackBitsCodec.compress(&data, &opts)?;
        assert!(packed.len() < data.len());
        assert_eq!(PackBitsCodec.decompress(&packed, &opts)?, data);

        // The example from Apple's technical note
        let packed = [
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected = [
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(PackBitsCodec.decompress(&packed, &opts)?, expected);
        assert_eq!(
            PackBitsCodec.decompress(&packed, &opts.with_max_bytes(5))?,
            &expected[..5]
        );
        assert!(PackBitsCodec.decompress(&[0x05, 0x01], &opts).is_err());
        Ok(())
    }

    #[test]
    fn test_unreachable_max_bytes() -> Result<(), CodecError> {
        // Declared sizes far beyond what the payload can hold must not be allocated up front
        let data = gradient(64);
        let opts = CodecOptions::new(8, 8, 8).with_max_bytes(usize::MAX / 2);
        let compressed = ZlibCodec.compress(&data, &opts)?;
        assert_eq!(ZlibCodec.decompress(&compressed, &opts)?, data);
        let packed = PackBitsCodec.compress(&data, &opts)?;
        assert_eq!(PackBitsCodec.decompress(&packed, &opts)?, data);
        assert_eq!(
            Base64Codec::decode(&Base64Codec::encode(&data), Some(usize::MAX))?,
            data
        );
        assert_eq!(Base64Codec::encoded_length(usize::MAX), usize::MAX);
        assert_eq!(Base64Codec::encoded_length(4), 8);
        Ok(())
    }

    #[test]
    fn test_dispatch() -> Result<(), CodecError> {
        let data = gradient(512);
        let opts = CodecOptions::new(32, 16, 8);
        for method in CompressionType::COMPRESSION_METHODS {
            if matches!(method, CompressionType::Jpeg | CompressionType::Jpeg2000) {
                continue;
            }
            let compressed = method.compress(&data, &opts)?;
            assert_eq!(method.decompress(&compressed, &opts)?, data, "{method}");
            assert_eq!(method.codec()?.compression(), *method);
        }
        Ok(())
    }
}
