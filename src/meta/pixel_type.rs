use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

/// The sample types an OME `Pixels` element may declare in its `Type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelType {
    Int8,
    #[default]
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float,
    Double,
    Complex,
    DoubleComplex,
    Bit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown pixel type {0:?}")]
pub struct UnknownPixelType(pub String);

impl PixelType {
    pub const ALL: &[Self] = &[
        Self::Int8,
        Self::Uint8,
        Self::Int16,
        Self::Uint16,
        Self::Int32,
        Self::Uint32,
        Self::Float,
        Self::Double,
        Self::Complex,
        Self::DoubleComplex,
        Self::Bit,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Float => "float",
            Self::Double => "double",
            Self::Complex => "complex",
            Self::DoubleComplex => "double-complex",
            Self::Bit => "bit",
        }
    }

    /// The number of bytes one sample occupies in a decoded plane. `bit` samples are
    /// stored one per byte.
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 | Self::Bit => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float => 4,
            Self::Double | Self::Complex => 8,
            Self::DoubleComplex => 16,
        }
    }

    pub const fn bits_per_sample(&self) -> usize {
        self.bytes_per_pixel() * 8
    }

    pub const fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Float
                | Self::Double
                | Self::Complex
                | Self::DoubleComplex
        )
    }

    pub const fn is_floating_point(&self) -> bool {
        matches!(
            self,
            Self::Float | Self::Double | Self::Complex | Self::DoubleComplex
        )
    }
}

impl Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelType {
    type Err = UnknownPixelType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPixelType(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("uint16".parse::<PixelType>().unwrap(), PixelType::Uint16);
        assert_eq!(
            "double-complex".parse::<PixelType>().unwrap(),
            PixelType::DoubleComplex
        );
        assert_eq!("Float".parse::<PixelType>().unwrap(), PixelType::Float);
        assert!("uint12".parse::<PixelType>().is_err());
        for t in PixelType::ALL {
            assert_eq!(t.to_string().parse::<PixelType>().unwrap(), *t);
        }
    }

    #[test]
    fn test_sizes() {
        assert_eq!(PixelType::Uint8.bytes_per_pixel(), 1);
        assert_eq!(PixelType::Int16.bits_per_sample(), 16);
        assert_eq!(PixelType::DoubleComplex.bytes_per_pixel(), 16);
        assert!(PixelType::Int8.is_signed());
        assert!(!PixelType::Uint32.is_signed());
        assert!(PixelType::Complex.is_floating_point());
    }
}
