//! Plane buffers and the pixel layout helpers shared by the reader, the writer
//! and the image codecs.
use std::borrow::Cow;

use crate::codec::Bytes;

/// A rectangular region of a plane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The region covering an entire `size_x` by `size_y` plane
    pub const fn full(size_x: usize, size_y: usize) -> Self {
        Self::new(0, 0, size_x, size_y)
    }

    pub const fn area(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    pub const fn is_full_frame(&self, size_x: usize, size_y: usize) -> bool {
        self.x == 0 && self.y == 0 && self.width == size_x && self.height == size_y
    }

    /// Whether this region is non-empty and lies entirely inside a `size_x` by `size_y` plane
    pub const fn fits_within(&self, size_x: usize, size_y: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self.width <= size_x
            && self.x <= size_x - self.width
            && self.height <= size_y
            && self.y <= size_y - self.height
    }
}

/// The pixel data read for a single plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plane {
    /// Decoded pixel bytes for the requested region
    Data(Bytes),
    /// No pixel data was stored for this plane. Holds the byte length the requested
    /// region would have had.
    Blank(usize),
}

impl Plane {
    pub const fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Data(data) => data.len(),
            Self::Blank(size) => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View the pixel bytes, materializing a zero-filled buffer for a blank plane
    pub fn bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Data(data) => Cow::Borrowed(data.as_slice()),
            Self::Blank(size) => Cow::Owned(vec![0; *size]),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Data(data) => data,
            Self::Blank(size) => vec![0; size],
        }
    }
}

/// Copy `region` out of a full row-major plane whose rows are `size_x` pixels of
/// `bytes_per_pixel` bytes each.
///
/// Returns `None` if `pixels` is too short to contain the region.
pub fn extract_region(
    pixels: &[u8],
    size_x: usize,
    bytes_per_pixel: usize,
    region: &Region,
) -> Option<Bytes> {
    let row_width = region.width * bytes_per_pixel;
    if region.x == 0 && region.width == size_x {
        let start = region.y * row_width;
        return pixels
            .get(start..start + row_width * region.height)
            .map(|s| s.to_vec());
    }
    let mut buffer = Bytes::with_capacity(row_width * region.height);
    for row in 0..region.height {
        let offset = ((row + region.y) * size_x + region.x) * bytes_per_pixel;
        buffer.extend_from_slice(pixels.get(offset..offset + row_width)?);
    }
    Some(buffer)
}

/// Copy the samples of `channel` out of a plane holding `n_channels` channels.
///
/// When `interleaved` is true, samples are stored pixel by pixel (`RGBRGB...`),
/// otherwise each channel is a contiguous band (`RR..GG..BB..`).
pub fn split_channel(
    buffer: &[u8],
    channel: usize,
    n_channels: usize,
    bytes_per_sample: usize,
    interleaved: bool,
) -> Bytes {
    if n_channels <= 1 {
        return buffer.to_vec();
    }
    let band = buffer.len() / n_channels;
    if !interleaved {
        return buffer[channel * band..(channel + 1) * band].to_vec();
    }
    let stride = n_channels * bytes_per_sample;
    buffer
        .chunks_exact(stride)
        .flat_map(|pixel| {
            &pixel[channel * bytes_per_sample..(channel + 1) * bytes_per_sample]
        })
        .copied()
        .collect()
}

/// Convert banded channel data into pixel-interleaved order
pub fn interleave_channels(planar: &[u8], n_channels: usize, bytes_per_sample: usize) -> Bytes {
    if n_channels <= 1 {
        return planar.to_vec();
    }
    let band = planar.len() / n_channels;
    let mut buffer = Bytes::with_capacity(planar.len());
    for pixel in (0..band).step_by(bytes_per_sample) {
        for channel in 0..n_channels {
            let start = channel * band + pixel;
            buffer.extend_from_slice(&planar[start..start + bytes_per_sample]);
        }
    }
    buffer
}

/// Convert pixel-interleaved data into banded channel order
pub fn deinterleave_channels(
    interleaved: &[u8],
    n_channels: usize,
    bytes_per_sample: usize,
) -> Bytes {
    if n_channels <= 1 {
        return interleaved.to_vec();
    }
    let mut buffer = Bytes::with_capacity(interleaved.len());
    for channel in 0..n_channels {
        buffer.extend(split_channel(
            interleaved,
            channel,
            n_channels,
            bytes_per_sample,
            true,
        ));
    }
    buffer
}
