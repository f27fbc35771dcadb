//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the InsightFace reference layout
//! and resamples the face into a 112×112 crop for ArcFace.

use image::{GrayImage, Luma};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// `x' = a·x − b·y + tx`, `y' = b·x + a·y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
struct SimilarityTransform {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl SimilarityTransform {
    /// Least-squares fit from `src` to `dst` (closed form on centred points).
    ///
    /// `None` when all source points coincide.
    fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let (smx, smy) = src.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
        let (dmx, dmy) = dst.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
        let (smx, smy, dmx, dmy) = (smx / n, smy / n, dmx / n, dmy / n);

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.0 - smx, s.1 - smy);
            let (dx, dy) = (d.0 - dmx, d.1 - dmy);
            spread += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }
        if spread < 1e-9 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        })
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Bilinear sample; pixels outside the image read as black.
fn sample(image: &GrayImage, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |x: i64, y: i64| -> f32 {
        if x >= 0 && y >= 0 && x < image.width() as i64 && y < image.height() as i64 {
            image.get_pixel(x as u32, y as u32).0[0] as f32
        } else {
            0.0
        }
    };

    px(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + px(x0 + 1, y0) * fx * (1.0 - fy)
        + px(x0, y0 + 1) * (1.0 - fx) * fy
        + px(x0 + 1, y0 + 1) * fx * fy
}

/// Align a face to the canonical 112×112 crop.
///
/// Degenerate landmarks produce an all-black crop.
pub fn align_face(image: &GrayImage, landmarks: &[(f32, f32); 5]) -> GrayImage {
    let Some(to_source) = SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS_112)
        .and_then(|t| t.inverse())
    else {
        tracing::debug!("degenerate landmarks; returning blank crop");
        return GrayImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    };

    GrayImage::from_fn(ALIGNED_SIZE, ALIGNED_SIZE, |ox, oy| {
        let (sx, sy) = to_source.apply(ox as f32, oy as f32);
        Luma([sample(image, sx, sy).round().clamp(0.0, 255.0) as u8])
    })
}
