//! The image loader capability (§6, external collaborator) and the
//! bounded-cache facade C7 wraps it in.

use std::collections::VecDeque;
use std::sync::Arc;

/// A decoded 3D image volume: `z` planes of `y * x` samples, row-major,
/// one channel.
#[derive(Debug, Clone)]
pub struct Image3D {
    pub size_z: usize,
    pub size_y: usize,
    pub size_x: usize,
    pub data: Arc<Vec<f32>>,
}

impl Image3D {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.size_z, self.size_y, self.size_x)
    }
}

/// Capability for fetching 3D image volumes, channel metadata and the
/// time-point range of an external image source. Any method may report "no
/// image" for an out-of-range request — the core never treats an
/// out-of-range `(t, channel)` as an error, only as an absence.
pub trait ImageLoader: std::fmt::Debug + Send + Sync {
    fn channel_count(&self) -> usize;

    /// `None` if `t` or `channel` is out of range.
    fn get_3d_image(&self, t: i32, channel: usize) -> Option<Image3D>;

    /// `(z, y, x)` for any in-range time point; `None` if nothing is
    /// loaded at all.
    fn image_size(&self) -> Option<(usize, usize, usize)>;

    fn first_time_point(&self) -> Option<i32>;
    fn last_time_point(&self) -> Option<i32>;

    /// `(container_path, pattern)` — enough for the on-disk serialization
    /// format to reconstruct this loader.
    fn serialize_to_config(&self) -> (String, String);
}

/// A loader that reports no images at all. Used as the default facade
/// backing and as a test double.
#[derive(Debug, Clone, Default)]
pub struct NullImageLoader;

impl ImageLoader for NullImageLoader {
    fn channel_count(&self) -> usize {
        0
    }

    fn get_3d_image(&self, _t: i32, _channel: usize) -> Option<Image3D> {
        None
    }

    fn image_size(&self) -> Option<(usize, usize, usize)> {
        None
    }

    fn first_time_point(&self) -> Option<i32> {
        None
    }

    fn last_time_point(&self) -> Option<i32> {
        None
    }

    fn serialize_to_config(&self) -> (String, String) {
        (String::new(), String::new())
    }
}

/// Integer XYZ offset applied to a time point's image coordinates relative
/// to position coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageOffset {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

const IMAGE_CACHE_CAPACITY: usize = 5;

/// Decorator over an [`ImageLoader`] that caches the last few decoded
/// volumes (bounded to [`IMAGE_CACHE_CAPACITY`]), and tracks a per-time-point
/// XYZ offset between image and position coordinates.
#[derive(Debug)]
pub struct ImageFacade {
    loader: Box<dyn ImageLoader>,
    offsets: std::collections::HashMap<i32, ImageOffset>,
    cache: VecDeque<((i32, usize), Image3D)>,
}

impl ImageFacade {
    pub fn new(loader: Box<dyn ImageLoader>) -> Self {
        ImageFacade { loader, offsets: std::collections::HashMap::new(), cache: VecDeque::new() }
    }

    pub fn empty() -> Self {
        Self::new(Box::new(NullImageLoader))
    }

    pub fn set_loader(&mut self, loader: Box<dyn ImageLoader>) {
        self.loader = loader;
        self.cache.clear();
    }

    pub fn set_offset(&mut self, t: i32, offset: ImageOffset) {
        self.offsets.insert(t, offset);
    }

    pub fn offset(&self, t: i32) -> ImageOffset {
        self.offsets.get(&t).copied().unwrap_or_default()
    }

    pub fn first_time_point(&self) -> Option<i32> {
        self.loader.first_time_point()
    }

    pub fn last_time_point(&self) -> Option<i32> {
        self.loader.last_time_point()
    }

    /// Fetches a cached (or freshly decoded and cached) volume.
    pub fn get_3d_image(&mut self, t: i32, channel: usize) -> Option<Image3D> {
        let key = (t, channel);
        if let Some(pos) = self.cache.iter().position(|(k, _)| *k == key) {
            let (_, image) = self.cache.remove(pos).unwrap();
            self.cache.push_back((key, image.clone()));
            return Some(image);
        }
        let image = self.loader.get_3d_image(t, channel)?;
        self.cache.push_back((key, image.clone()));
        if self.cache.len() > IMAGE_CACHE_CAPACITY {
            self.cache.pop_front();
        }
        Some(image)
    }

    /// An uncached fetch that bypasses and does not populate the cache.
    pub fn get_3d_image_uncached(&self, t: i32, channel: usize) -> Option<Image3D> {
        self.loader.get_3d_image(t, channel)
    }

    /// `None` if there is no image loader configured at all; otherwise
    /// whether `pos` (given margins) falls inside the loaded volume at its
    /// time point.
    pub fn is_inside_image(
        &self,
        x: f64,
        y: f64,
        z: f64,
        t: i32,
        margin_xy: f64,
        margin_z: f64,
    ) -> Option<bool> {
        let (size_z, size_y, size_x) = self.loader.image_size()?;
        let offset = self.offset(t);
        let lx = x - offset.x as f64;
        let ly = y - offset.y as f64;
        let lz = z - offset.z as f64;
        Some(
            lx >= margin_xy
                && lx < size_x as f64 - margin_xy
                && ly >= margin_xy
                && ly < size_y as f64 - margin_xy
                && lz >= margin_z
                && lz < size_z as f64 - margin_z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_loader_reports_no_image() {
        let mut facade = ImageFacade::empty();
        assert!(facade.get_3d_image(0, 0).is_none());
        assert!(facade.is_inside_image(0.0, 0.0, 0.0, 0, 0.0, 0.0).is_none());
    }

    #[derive(Debug)]
    struct FixedLoader;
    impl ImageLoader for FixedLoader {
        fn channel_count(&self) -> usize {
            1
        }
        fn get_3d_image(&self, t: i32, _channel: usize) -> Option<Image3D> {
            if !(0..3).contains(&t) {
                return None;
            }
            Some(Image3D { size_z: 2, size_y: 4, size_x: 4, data: Arc::new(vec![0.0; 32]) })
        }
        fn image_size(&self) -> Option<(usize, usize, usize)> {
            Some((2, 4, 4))
        }
        fn first_time_point(&self) -> Option<i32> {
            Some(0)
        }
        fn last_time_point(&self) -> Option<i32> {
            Some(2)
        }
        fn serialize_to_config(&self) -> (String, String) {
            ("fixed".to_string(), "*.tif".to_string())
        }
    }

    #[test]
    fn cache_bounds_to_capacity() {
        let mut facade = ImageFacade::new(Box::new(FixedLoader));
        for t in 0..10 {
            facade.get_3d_image(t % 3, 0);
        }
        assert!(facade.cache.len() <= IMAGE_CACHE_CAPACITY);
    }

    #[test]
    fn out_of_range_time_point_is_none_not_error() {
        let mut facade = ImageFacade::new(Box::new(FixedLoader));
        assert!(facade.get_3d_image(50, 0).is_none());
    }

    #[test]
    fn is_inside_image_respects_margin() {
        let facade = ImageFacade::new(Box::new(FixedLoader));
        assert_eq!(facade.is_inside_image(2.0, 2.0, 1.0, 0, 0.0, 0.0), Some(true));
        assert_eq!(facade.is_inside_image(-1.0, 2.0, 1.0, 0, 0.0, 0.0), Some(false));
    }
}
