use super::{Tag, TagClassifier};

/// Check every Nth border pixel for performance.
const SAMPLING_STRIDE: u32 = 10;
/// At least this many matching samples before a tag counts.
const HIT_THRESHOLD: u32 = 3;

/// Detects the coloured frame the in-game addon draws around a screenshot:
/// a green border signals a queue pop, a red border signals enter/expire.
/// Only the four edges are sampled, never the interior.
#[derive(Debug, Default)]
pub struct BorderClassifier;

impl TagClassifier for BorderClassifier {
    fn classify(&self, image_bytes: &[u8]) -> Tag {
        let Ok(img) = image::load_from_memory(image_bytes) else {
            return Tag::NoTag;
        };

        let rgb = img.to_rgb8();
        let (w, h) = rgb.dimensions();
        if w == 0 || h == 0 {
            return Tag::NoTag;
        }

        let mut green_hits: u32 = 0;
        let mut red_hits: u32 = 0;

        let mut sample = |x: u32, y: u32| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            if g > 200 && r < 50 && b < 50 {
                green_hits += 1;
            }
            if r > 200 && g < 50 && b < 50 {
                red_hits += 1;
            }
        };

        // top & bottom edges
        for x in (0..w).step_by(SAMPLING_STRIDE as usize) {
            sample(x, 0);
            sample(x, h - 1);
        }

        // left & right edges
        for y in (0..h).step_by(SAMPLING_STRIDE as usize) {
            sample(0, y);
            sample(w - 1, y);
        }

        if green_hits > HIT_THRESHOLD {
            Tag::Pop
        } else if red_hits > HIT_THRESHOLD {
            Tag::Stop
        } else {
            Tag::NoTag
        }
    }
}
