pub use crate::io::traits::{PlaneSource, PlaneWriter, SeekRead};
pub use crate::meta::MetadataModel;
pub use crate::codec::Codec;
pub use std::io::prelude::*;
