use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use image::{imageops, DynamicImage, GenericImageView, RgbaImage};
use tracing::debug;

use crate::error::LoadError;
use crate::source::ImageSource;

/// A cover image that has been cropped to a circle, blurred and hue-rotated.
///
/// The parameters used at creation are recorded for diagnostics only; the
/// cache does not key on them.
#[derive(Clone)]
pub struct BlurredRaster {
    id: String,
    image: RgbaImage,
    blur_radius: f32,
    hue_shift: f32,
}

impl BlurredRaster {
    pub fn new(id: impl Into<String>, image: RgbaImage, blur_radius: f32, hue_shift: f32) -> Self {
        Self {
            id: id.into(),
            image,
            blur_radius,
            hue_shift,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn blur_radius(&self) -> f32 {
        self.blur_radius
    }

    pub fn hue_shift(&self) -> f32 {
        self.hue_shift
    }
}

impl fmt::Debug for BlurredRaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlurredRaster")
            .field("id", &self.id)
            .field("size", &(self.width(), self.height()))
            .field("blur_radius", &self.blur_radius)
            .field("hue_shift", &self.hue_shift)
            .finish()
    }
}

/// Largest blur radius the renderer will honour; larger values are clamped.
pub const MAX_BLUR_RADIUS: f32 = 256.0;

fn effective_blur(blur_radius: f32) -> f32 {
    if blur_radius.is_nan() {
        0.0
    } else {
        blur_radius.clamp(0.0, MAX_BLUR_RADIUS)
    }
}

/// Side length of the offscreen canvas for a cropped square of `square` px.
///
/// The margin leaves room for the blur to bleed past the circle edge. It is
/// truncated to whole pixels, the way a canvas sizes itself from a float.
pub fn canvas_side(square: u32, blur_radius: f32) -> u32 {
    let margin = (3.0 * effective_blur(blur_radius)).ceil() * 1.5;
    square.saturating_add(margin.trunc() as u32)
}

pub fn render_blurred(source: &DynamicImage, blur_radius: f32, hue_shift: f32) -> RgbaImage {
    let (width, height) = source.dimensions();
    let side = width.min(height).max(1);
    let x = width.saturating_sub(side) / 2;
    let y = height.saturating_sub(side) / 2;
    let square = source.crop_imm(x, y, side, side).to_rgba8();

    let blur_radius = effective_blur(blur_radius);
    let canvas_len = canvas_side(side, blur_radius);
    let offset = (canvas_len - side) / 2;
    let radius = side as f32 / 2.0;
    let mut canvas = RgbaImage::new(canvas_len, canvas_len);
    for (px, py, pixel) in square.enumerate_pixels() {
        let dx = px as f32 + 0.5 - radius;
        let dy = py as f32 + 0.5 - radius;
        if dx * dx + dy * dy <= radius * radius {
            canvas.put_pixel(px + offset, py + offset, *pixel);
        }
    }

    let blurred = if blur_radius > 0.0 {
        imageops::blur(&canvas, blur_radius)
    } else {
        canvas
    };
    let degrees = if hue_shift.is_finite() {
        hue_shift.rem_euclid(360.0).round() as i32
    } else {
        0
    };
    if degrees % 360 == 0 {
        blurred
    } else {
        imageops::huerotate(&blurred, degrees)
    }
}

pub fn build_raster<S: ImageSource + ?Sized>(
    source: &S,
    id: &str,
    blur_radius: f32,
    hue_shift: f32,
) -> Result<BlurredRaster, LoadError> {
    let decoded = source.load(id)?;
    let image = render_blurred(&decoded, blur_radius, hue_shift);
    debug!(
        id,
        width = image.width(),
        height = image.height(),
        blur_radius,
        hue_shift,
        "built blurred raster"
    );
    Ok(BlurredRaster::new(id, image, blur_radius, hue_shift))
}

/// Identifier-keyed memo of blurred rasters.
#[derive(Clone, Default)]
pub struct BlurCache {
    entries: Rc<RefCell<HashMap<String, Arc<BlurredRaster>>>>,
}

impl BlurCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<BlurredRaster>> {
        self.entries.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.borrow().contains_key(id)
    }

    pub fn insert(&self, id: impl Into<String>, raster: Arc<BlurredRaster>) {
        self.entries.borrow_mut().insert(id.into(), raster);
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shares_storage_with(&self, other: &BlurCache) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }

    pub fn lookup(&self, id: &str, blur_radius: f32, hue_shift: f32) -> Option<Arc<BlurredRaster>> {
        let hit = self.get(id)?;
        if hit.blur_radius() != blur_radius || hit.hue_shift() != hue_shift {
            debug!(
                id,
                cached_blur = hit.blur_radius(),
                cached_hue = hit.hue_shift(),
                blur_radius,
                hue_shift,
                "blur cache hit built with different parameters"
            );
        } else {
            debug!(id, "blur cache hit");
        }
        Some(hit)
    }

    /// Stores `raster` unless another holder of the cache got there first,
    /// and returns whichever entry ends up cached.
    pub fn insert_if_absent(&self, raster: BlurredRaster) -> Arc<BlurredRaster> {
        self.entries
            .borrow_mut()
            .entry(raster.id().to_string())
            .or_insert_with(|| Arc::new(raster))
            .clone()
    }

    /// A hit is returned as-is even if it was built with a different blur
    /// radius or hue shift.
    pub fn get_or_create<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        id: &str,
        blur_radius: f32,
        hue_shift: f32,
    ) -> Result<Arc<BlurredRaster>, LoadError> {
        if let Some(hit) = self.lookup(id, blur_radius, hue_shift) {
            return Ok(hit);
        }
        let raster = build_raster(source, id, blur_radius, hue_shift)?;
        Ok(self.insert_if_absent(raster))
    }
}

impl fmt::Debug for BlurCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlurCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingSource;

    #[test]
    fn canvas_adds_blur_margin() {
        assert_eq!(canvas_side(100, 0.0), 100);
        // ceil(3 * 10) * 1.5 = 45
        assert_eq!(canvas_side(100, 10.0), 145);
        // ceil(3 * 2.5) = 8, * 1.5 = 12
        assert_eq!(canvas_side(64, 2.5), 76);
        // ceil(3 * 1) * 1.5 = 4.5 truncates to 4
        assert_eq!(canvas_side(100, 1.0), 104);
    }

    #[test]
    fn out_of_range_blur_is_clamped() {
        assert_eq!(canvas_side(100, f32::INFINITY), canvas_side(100, MAX_BLUR_RADIUS));
        assert_eq!(canvas_side(100, 1e5), 100 + 1152);
        assert_eq!(canvas_side(100, -4.0), 100);
        assert_eq!(canvas_side(100, f32::NAN), 100);
        assert_eq!(canvas_side(u32::MAX, 10.0), u32::MAX);
    }

    #[test]
    fn non_finite_parameters_render_unblurred() {
        let source = CountingSource::new();
        let cache = BlurCache::new();
        let raster = cache
            .get_or_create(&source, "a", f32::NAN, f32::INFINITY)
            .unwrap();
        assert_eq!((raster.width(), raster.height()), (8, 8));
    }

    #[test]
    fn insert_if_absent_keeps_the_first_entry() {
        let source = CountingSource::new();
        let cache = BlurCache::new();
        let first = cache.insert_if_absent(build_raster(&source, "a", 1.0, 0.0).unwrap());
        let second = cache.insert_if_absent(build_raster(&source, "a", 9.0, 0.0).unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.blur_radius(), 1.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn second_lookup_returns_same_instance_without_decoding() {
        let source = CountingSource::new();
        let cache = BlurCache::new();
        let first = cache.get_or_create(&source, "a", 4.0, 0.0).unwrap();
        let second = cache.get_or_create(&source, "a", 4.0, 0.0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.loads(), 1);
    }

    #[test]
    fn hit_ignores_new_parameters() {
        let source = CountingSource::new();
        let cache = BlurCache::new();
        let first = cache.get_or_create(&source, "a", 4.0, 0.0).unwrap();
        let second = cache.get_or_create(&source, "a", 30.0, 90.0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.blur_radius(), 4.0);
        assert_eq!(second.hue_shift(), 0.0);
        assert_eq!(source.loads(), 1);
    }

    #[test]
    fn failed_load_leaves_cache_untouched() {
        let source = CountingSource::new().failing("broken");
        let cache = BlurCache::new();
        let err = cache.get_or_create(&source, "broken", 4.0, 0.0);
        assert!(err.is_err());
        assert!(!cache.contains("broken"));
        assert!(cache.is_empty());
    }

    #[test]
    fn cropped_circle_is_transparent_in_the_corners() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            40,
            20,
            image::Rgba([200, 40, 40, 255]),
        ));
        let raster = render_blurred(&image, 0.0, 0.0);
        assert_eq!(raster.dimensions(), (20, 20));
        assert_eq!(raster.get_pixel(0, 0).0[3], 0);
        assert_eq!(raster.get_pixel(19, 19).0[3], 0);
        assert_eq!(raster.get_pixel(10, 10).0, [200, 40, 40, 255]);
    }

    #[test]
    fn blurred_raster_grows_with_radius() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            32,
            48,
            image::Rgba([10, 200, 10, 255]),
        ));
        let raster = render_blurred(&image, 2.0, 45.0);
        assert_eq!(raster.dimensions(), (32 + 9, 32 + 9));
    }

    #[test]
    fn cloned_handles_share_entries() {
        let source = CountingSource::new();
        let cache = BlurCache::new();
        let shared = cache.clone();
        assert!(cache.shares_storage_with(&shared));
        cache.get_or_create(&source, "a", 1.0, 0.0).unwrap();
        assert!(shared.contains("a"));
        shared.clear();
        assert!(cache.is_empty());
        assert!(!BlurCache::new().shares_storage_with(&cache));
    }
}
