//! 学習データの拡張（シアー・ズーム・左右反転）

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct AugmentationConfig {
    /// シアー角の範囲（度、±）
    pub shear_range: f32,
    /// ズーム率の範囲（1 ± zoom_range）
    pub zoom_range: f32,
    /// 左右反転を行うかどうか（確率 0.5）
    pub horizontal_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageAugmenter {
    config: AugmentationConfig,
}

impl ImageAugmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn augment<R: Rng + ?Sized>(&self, img: &RgbImage, rng: &mut R) -> RgbImage {
        let shear = if self.config.shear_range > 0.0 {
            rng.gen_range(-self.config.shear_range..=self.config.shear_range)
        } else {
            0.0
        };
        let (zx, zy) = if self.config.zoom_range > 0.0 {
            let range = (1.0 - self.config.zoom_range)..=(1.0 + self.config.zoom_range);
            (rng.gen_range(range.clone()), rng.gen_range(range))
        } else {
            (1.0, 1.0)
        };

        let mut out = match affine_about_center(img.width(), img.height(), shear, zx, zy) {
            Some(projection) => warp(img, &projection, Interpolation::Bilinear, Rgb([0, 0, 0])),
            None => img.clone(),
        };

        if self.config.horizontal_flip && rng.gen_bool(0.5) {
            image::imageops::flip_horizontal_in_place(&mut out);
        }
        out
    }
}

/// 画像中心を原点としたシアーとズームの射影
///
/// 恒等変換の場合は None。
fn affine_about_center(
    width: u32,
    height: u32,
    shear_degrees: f32,
    zoom_x: f32,
    zoom_y: f32,
) -> Option<Projection> {
    if shear_degrees == 0.0 && zoom_x == 1.0 && zoom_y == 1.0 {
        return None;
    }
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let shear = shear_degrees.to_radians().tan();

    #[rustfmt::skip]
    let linear = Projection::from_matrix([
        zoom_x, shear * zoom_y, 0.0,
        0.0,    zoom_y,         0.0,
        0.0,    0.0,            1.0,
    ])?;

    Some(Projection::translate(cx, cy) * linear * Projection::translate(-cx, -cy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 0]))
    }

    #[test]
    fn test_disabled_augmentation_is_identity() {
        let augmenter = ImageAugmenter::new(AugmentationConfig {
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
        });
        let img = gradient(8, 8);
        let out = augmenter.augment(&img, &mut StdRng::seed_from_u64(0));
        assert_eq!(out, img);
    }

    #[test]
    fn test_flip_only_mirrors_or_keeps() {
        let augmenter = ImageAugmenter::new(AugmentationConfig {
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: true,
        });
        let img = gradient(8, 4);
        let flipped = image::imageops::flip_horizontal(&img);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..16 {
            let out = augmenter.augment(&img, &mut rng);
            assert!(out == img || out == flipped);
        }
    }

    #[test]
    fn test_default_augmentation_keeps_dimensions() {
        let augmenter = ImageAugmenter::new(AugmentationConfig::default());
        let img = gradient(20, 12);
        let out = augmenter.augment(&img, &mut StdRng::seed_from_u64(9));
        assert_eq!(out.dimensions(), (20, 12));
    }

    #[test]
    fn test_identity_projection_is_skipped() {
        assert!(affine_about_center(10, 10, 0.0, 1.0, 1.0).is_none());
        assert!(affine_about_center(10, 10, 0.1, 1.0, 1.0).is_some());
    }
}
