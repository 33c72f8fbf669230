use std::io;

use crate::meta::{PixelType, PlaneGeometry};
use crate::plane::{Plane, Region};

pub trait SeekRead: io::Read + io::Seek {}
impl<T: io::Read + io::Seek> SeekRead for T {}

/// A source of image planes addressed by image and plane index
pub trait PlaneSource {
    /// Retrieve the number of images in the source
    fn image_count(&self) -> usize;

    /// Retrieve the number of stored planes of `image_index`, or zero if there
    /// is no such image
    fn plane_count(&self, image_index: usize) -> usize;

    fn plane_geometry(&self, image_index: usize) -> Option<PlaneGeometry>;

    /// Read `region` of a single plane
    fn read_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
        region: &Region,
    ) -> io::Result<Plane>;

    /// Read an entire plane
    fn read_full_plane(&mut self, image_index: usize, plane_index: usize) -> io::Result<Plane> {
        let geometry = self.plane_geometry(image_index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Image index {image_index} is out of range"),
            )
        })?;
        self.read_plane(
            image_index,
            plane_index,
            &Region::full(geometry.size_x, geometry.size_y),
        )
    }

    /// Iterate over every plane of `image_index` in storage order
    fn iter_planes(&mut self, image_index: usize) -> PlaneIter<'_, Self>
    where
        Self: Sized,
    {
        PlaneIter::new(self, image_index)
    }
}

/// An [`Iterator`] over the full planes of one image of a [`PlaneSource`]
pub struct PlaneIter<'lifespan, S: PlaneSource> {
    source: &'lifespan mut S,
    image_index: usize,
    plane_index: usize,
    plane_count: usize,
}

impl<'lifespan, S: PlaneSource> PlaneIter<'lifespan, S> {
    pub fn new(source: &'lifespan mut S, image_index: usize) -> Self {
        let plane_count = source.plane_count(image_index);
        Self {
            source,
            image_index,
            plane_index: 0,
            plane_count,
        }
    }
}

impl<S: PlaneSource> Iterator for PlaneIter<'_, S> {
    type Item = io::Result<Plane>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.plane_index >= self.plane_count {
            return None;
        }
        let plane = self
            .source
            .read_full_plane(self.image_index, self.plane_index);
        self.plane_index += 1;
        Some(plane)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plane_count.saturating_sub(self.plane_index);
        (remaining, Some(remaining))
    }
}

impl<S: PlaneSource> ExactSizeIterator for PlaneIter<'_, S> {}

/// A sink that writes image planes in image order
pub trait PlaneWriter {
    /// Whether multiple planes may be written for each image
    fn can_do_stacks(&self) -> bool {
        true
    }

    /// The pixel types the writer can currently store
    fn supported_pixel_types(&self) -> &'static [PixelType];

    /// Write `region` of a plane from `data`
    fn write_plane(
        &mut self,
        image_index: usize,
        plane_index: usize,
        data: &[u8],
        region: &Region,
    ) -> io::Result<()>;

    /// Complete the output. Further writes fail.
    fn close(&mut self) -> io::Result<()>;
}
