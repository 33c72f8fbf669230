//! Image codecs that operate on a whole plane rather than an opaque byte stream.
//!
//! Both are restricted to 8-bit samples when encoding.
#[cfg(feature = "jpeg")]
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageFormat};

use crate::plane::{deinterleave_channels, interleave_channels};

use super::encodings::{Bytes, Codec, CodecError, CompressionType};
use super::options::CodecOptions;

#[allow(unused)]
fn check_eight_bit(
    compression: CompressionType,
    options: &CodecOptions,
) -> Result<(), CodecError> {
    if options.bits_per_sample != 8 {
        return Err(CodecError::UnsupportedPixelType {
            codec: compression,
            bits_per_sample: options.bits_per_sample,
            signed: options.signed,
        });
    }
    Ok(())
}

/// Lay decoded interleaved samples out the way `options` describes
#[allow(unused)]
fn arrange_decoded(pixels: Bytes, options: &CodecOptions) -> Bytes {
    if options.channels > 1 && !options.interleaved {
        deinterleave_channels(&pixels, options.channels, options.bytes_per_sample())
    } else {
        pixels
    }
}

#[cfg(feature = "jpeg")]
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCodec;

#[cfg(feature = "jpeg")]
impl JpegCodec {
    pub const DEFAULT_QUALITY: u8 = 90;
}

#[cfg(feature = "jpeg")]
impl Codec for JpegCodec {
    fn compression(&self) -> CompressionType {
        CompressionType::Jpeg
    }

    fn compress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        check_eight_bit(self.compression(), options)?;
        let color = match options.channels {
            1 => ExtendedColorType::L8,
            3 => ExtendedColorType::Rgb8,
            n => {
                return Err(CodecError::CompressionError(
                    self.compression(),
                    format!("{n} channels cannot be stored as JPEG"),
                ))
            }
        };
        let expected = options.plane_size();
        if data.len() != expected {
            return Err(CodecError::CompressionError(
                self.compression(),
                format!(
                    "expected {expected} bytes for a {}x{} plane, got {}",
                    options.width,
                    options.height,
                    data.len()
                ),
            ));
        }
        let interleaved;
        let data = if options.channels > 1 && !options.interleaved {
            interleaved = interleave_channels(data, options.channels, 1);
            interleaved.as_slice()
        } else {
            data
        };

        let mut buffer = Bytes::new();
        let mut encoder = JpegEncoder::new_with_quality(
            &mut buffer,
            options.quality.unwrap_or(Self::DEFAULT_QUALITY),
        );
        encoder
            .encode(data, options.width as u32, options.height as u32, color)
            .map_err(|e| CodecError::CompressionError(self.compression(), e.to_string()))?;
        Ok(buffer)
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| CodecError::DecompressionError(self.compression(), e.to_string()))?;
        let mut pixels = if options.channels > 1 {
            image.into_rgb8().into_raw()
        } else {
            image.into_luma8().into_raw()
        };
        if let Some(max_bytes) = options.max_bytes {
            pixels.truncate(max_bytes);
        }
        Ok(arrange_decoded(pixels, options))
    }
}

/// JPEG 2000 codestream decoding. Encoding is not supported.
#[cfg(feature = "jpeg2000")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Jpeg2000Codec;

#[cfg(feature = "jpeg2000")]
impl Codec for Jpeg2000Codec {
    fn compression(&self) -> CompressionType {
        CompressionType::Jpeg2000
    }

    fn compress(&self, _data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        check_eight_bit(self.compression(), options)?;
        Err(CodecError::Unsupported(self.compression()))
    }

    fn decompress(&self, data: &[u8], options: &CodecOptions) -> Result<Bytes, CodecError> {
        let image = jpeg2k::Image::from_bytes(data)
            .map_err(|e| CodecError::DecompressionError(self.compression(), e.to_string()))?;
        let decoded = image
            .get_pixels(None)
            .map_err(|e| CodecError::DecompressionError(self.compression(), e.to_string()))?;
        let mut pixels = decoded.data;
        if let Some(max_bytes) = options.max_bytes {
            pixels.truncate(max_bytes);
        }
        Ok(arrange_decoded(pixels, options))
    }
}
