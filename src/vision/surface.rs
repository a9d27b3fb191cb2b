//! Surface material classifier
//!
//! Scores each material from a handful of cheap image statistics and keeps
//! the best one. Scores below `MIN_SURFACE_SCORE` report `Unknown`.

use image::RgbImage;
use imageproc::gradients::sobel_gradients;

use super::conditions::{ConditionLabel, ConditionSample, SurfaceMaterial};

/// Minimum winning score for a concrete material label
pub const MIN_SURFACE_SCORE: f32 = 0.3;

/// Luminance above which a pixel counts as a specular highlight
const HIGHLIGHT_LEVEL: u8 = 235;

/// Image statistics the material scores are built from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFeatures {
    /// Mean luminance (0 - 255)
    pub mean_luma: f32,
    /// Fraction of specular-highlight pixels
    pub highlight: f32,
    /// Mean HSV saturation (0.0 - 1.0)
    pub saturation: f32,
    /// Mean Sobel magnitude, normalised to 0.0 - 1.0
    pub texture: f32,
    /// Blue-over-red dominance, normalised to 0.0 - 1.0
    pub blue_dominance: f32,
}

impl SurfaceFeatures {
    /// Extract features from an RGB thumbnail; `None` for an empty image
    pub fn extract(thumbnail: &RgbImage) -> Option<Self> {
        let (w, h) = thumbnail.dimensions();
        if w == 0 || h == 0 {
            return None;
        }

        let gray = image::imageops::grayscale(thumbnail);
        let count = (w * h) as f32;

        let mut luma_sum = 0u64;
        let mut highlights = 0u32;
        for px in gray.pixels() {
            luma_sum += px.0[0] as u64;
            if px.0[0] >= HIGHLIGHT_LEVEL {
                highlights += 1;
            }
        }

        let mut sat_sum = 0.0f32;
        let mut red_sum = 0u64;
        let mut blue_sum = 0u64;
        for px in thumbnail.pixels() {
            let [r, g, b] = px.0;
            let max = r.max(g).max(b) as f32;
            let min = r.min(g).min(b) as f32;
            if max > 0.0 {
                sat_sum += (max - min) / max;
            }
            red_sum += r as u64;
            blue_sum += b as u64;
        }

        let gradients = sobel_gradients(&gray);
        let grad_sum: u64 = gradients.pixels().map(|p| p.0[0] as u64).sum();

        let mean_red = red_sum as f32 / count;
        let mean_blue = blue_sum as f32 / count;

        Some(Self {
            mean_luma: luma_sum as f32 / count,
            highlight: highlights as f32 / count,
            saturation: sat_sum / count,
            texture: (grad_sum as f32 / count / 120.0).clamp(0.0, 1.0),
            blue_dominance: ((mean_blue - mean_red) / 40.0).clamp(0.0, 1.0),
        })
    }

    /// Score one material against these features
    pub fn score(&self, material: SurfaceMaterial) -> f32 {
        let unit = |v: f32| v.clamp(0.0, 1.0);
        match material {
            SurfaceMaterial::Glass => {
                unit(self.highlight / 0.15)
                    * unit(1.0 - self.saturation * 2.0)
                    * (1.0 - self.texture * 0.5)
            }
            SurfaceMaterial::Metal => {
                // Highlights peak around 4% coverage; more than that reads as glass
                let sheen = if self.highlight <= 0.04 {
                    self.highlight / 0.04
                } else {
                    (0.12 - self.highlight) / 0.08
                };
                unit(1.0 - self.saturation / 0.2) * (0.5 * self.texture + 0.5 * unit(sheen))
            }
            SurfaceMaterial::Screen => self.blue_dominance * unit(self.mean_luma / 120.0),
            SurfaceMaterial::Paper => {
                unit((self.mean_luma - 150.0) / 60.0)
                    * unit(1.0 - self.saturation / 0.15)
                    * unit(1.0 - self.texture)
                    * unit(1.0 - self.highlight / 0.1)
            }
            SurfaceMaterial::Plastic => {
                unit((self.saturation - 0.15) / 0.35) * (1.0 - self.blue_dominance)
            }
            SurfaceMaterial::Unknown => 0.0,
        }
    }
}

/// Classify the surface material of an RGB thumbnail
pub fn classify_surface(thumbnail: &RgbImage) -> ConditionSample {
    let Some(features) = SurfaceFeatures::extract(thumbnail) else {
        return ConditionSample::new(ConditionLabel::Surface(SurfaceMaterial::Unknown), 0.0);
    };

    let (material, score) = SurfaceMaterial::KNOWN
        .iter()
        .map(|m| (*m, features.score(*m)))
        .fold((SurfaceMaterial::Unknown, 0.0f32), |best, cand| {
            if cand.1 > best.1 {
                cand
            } else {
                best
            }
        });

    if score < MIN_SURFACE_SCORE {
        return ConditionSample::new(ConditionLabel::Surface(SurfaceMaterial::Unknown), score);
    }
    ConditionSample::new(ConditionLabel::Surface(material), score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn label_of(img: &RgbImage) -> SurfaceMaterial {
        match classify_surface(img).label {
            ConditionLabel::Surface(m) => m,
            other => panic!("unexpected label {:?}", other),
        }
    }

    #[test]
    fn test_plain_white_label_is_paper() {
        let img = RgbImage::from_pixel(40, 40, Rgb([230, 228, 225]));
        assert_eq!(label_of(&img), SurfaceMaterial::Paper);
    }

    #[test]
    fn test_saturated_colour_is_plastic() {
        let img = RgbImage::from_pixel(40, 40, Rgb([200, 30, 30]));
        assert_eq!(label_of(&img), SurfaceMaterial::Plastic);
    }

    #[test]
    fn test_blue_backlit_is_screen() {
        let img = RgbImage::from_pixel(40, 40, Rgb([40, 80, 200]));
        assert_eq!(label_of(&img), SurfaceMaterial::Screen);
    }

    #[test]
    fn test_large_reflection_is_glass() {
        let img = RgbImage::from_fn(40, 40, |x, y| {
            if x < 20 && y < 20 {
                Rgb([255, 255, 255])
            } else {
                Rgb([60, 60, 60])
            }
        });
        assert_eq!(label_of(&img), SurfaceMaterial::Glass);
    }

    #[test]
    fn test_brushed_grey_is_metal() {
        let img = RgbImage::from_fn(50, 50, |x, y| {
            if x == 25 && y < 50 {
                Rgb([250, 250, 250])
            } else if (y / 2) % 2 == 0 {
                Rgb([110, 110, 110])
            } else {
                Rgb([170, 170, 170])
            }
        });
        assert_eq!(label_of(&img), SurfaceMaterial::Metal);
    }

    #[test]
    fn test_empty_is_unknown() {
        let sample = classify_surface(&RgbImage::new(0, 0));
        assert_eq!(sample.label, ConditionLabel::Surface(SurfaceMaterial::Unknown));
    }

    #[test]
    fn test_flat_mid_grey_is_unknown() {
        let img = RgbImage::from_pixel(40, 40, Rgb([120, 120, 120]));
        assert_eq!(label_of(&img), SurfaceMaterial::Unknown);
    }
}
