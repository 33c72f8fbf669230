//! Metadata describing the images stored in an OME-XML document.
//!
//! The reader and writer only see metadata through the [`MetadataModel`] trait.
//! With the `ome-model` feature enabled, [`OmeMetadata`] provides an implementation
//! of it and is the [`DefaultMetadata`].
mod pixel_type;
mod traits;

#[cfg(feature = "ome-model")]
mod ome;

pub use crate::meta::pixel_type::{PixelType, UnknownPixelType};
pub use crate::meta::traits::{
    bin_data_namespace, parse_ome_bool, DimensionOrder, MetadataError, MetadataModel, PlaneGeometry,
    UnavailableMetadata, DEFAULT_SCHEMA_VERSION,
};

#[cfg(feature = "ome-model")]
pub use crate::meta::ome::{OmeChannel, OmeImage, OmeMetadata};

#[cfg(feature = "ome-model")]
pub type DefaultMetadata = OmeMetadata;

#[cfg(not(feature = "ome-model"))]
pub type DefaultMetadata = UnavailableMetadata;
