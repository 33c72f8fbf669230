/// Per-call parameters handed to a [`Codec`](super::Codec).
///
/// This is an immutable value. The builder-style `with_*` methods return a
/// modified copy, so a single set of options can be shared between the
/// channels of a plane and adjusted where needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodecOptions {
    pub width: usize,
    pub height: usize,
    pub bits_per_sample: usize,
    pub channels: usize,
    pub little_endian: bool,
    pub interleaved: bool,
    pub signed: bool,
    /// An upper bound on the number of decoded bytes a codec may produce.
    /// `None` means unbounded.
    pub max_bytes: Option<usize>,
    /// Quality for lossy codecs, in the range 1-100
    pub quality: Option<u8>,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            bits_per_sample: 8,
            channels: 1,
            little_endian: false,
            interleaved: false,
            signed: false,
            max_bytes: None,
            quality: None,
        }
    }
}

impl CodecOptions {
    pub fn new(width: usize, height: usize, bits_per_sample: usize) -> Self {
        Self {
            width,
            height,
            bits_per_sample,
            ..Default::default()
        }
    }

    pub const fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample.div_ceil(8)
    }

    /// The number of bytes in one decoded plane described by these options
    pub const fn plane_size(&self) -> usize {
        self.width * self.height * self.channels * self.bytes_per_sample()
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_little_endian(mut self, little_endian: bool) -> Self {
        self.little_endian = little_endian;
        self
    }

    pub fn with_interleaved(mut self, interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality.clamp(1, 100));
        self
    }
}
