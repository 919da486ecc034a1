//! Threshold-and-blob defect classifier.
//!
//! Frames are smoothed with a 3x3 box blur, thresholded against a robust
//! background estimate (median + k * MAD-sigma), and split into 4-connected
//! blobs. A blob whose bounding box has the size of a defect patch is a defect.

use crate::camera::Frame;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub trait DefectClassifier: Send {
    fn predict(&self, frame: &Frame) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Threshold distance above the background median, in robust sigmas.
    pub sigma_k: f64,
    /// Lower bound on the threshold distance, in gray levels.
    pub min_contrast: f64,
    pub min_patch: usize,
    pub max_patch: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sigma_k: 6.0,
            min_contrast: 25.0,
            min_patch: 8,
            max_patch: 12,
        }
    }
}

/// Bounding box of a detected blob, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
    pub area: usize,
}

impl Detection {
    pub fn width(&self) -> usize {
        self.right - self.left + 1
    }

    pub fn height(&self) -> usize {
        self.bottom - self.top + 1
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThresholdClassifier {
    config: ClassifierConfig,
}

impl ThresholdClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self, blurred: &[u8]) -> f64 {
        let (median, sigma) = robust_stats(blurred);
        median + (self.config.sigma_k * sigma).max(self.config.min_contrast)
    }

    /// First blob with a defect-sized bounding box, if any.
    pub fn detect(&self, frame: &Frame) -> Option<Detection> {
        let blurred = box_blur(frame);
        let threshold = self.threshold(&blurred);
        let mask: Vec<bool> = blurred.iter().map(|&v| f64::from(v) > threshold).collect();

        let range = self.config.min_patch..=self.config.max_patch;
        blobs(&mask, frame.width(), frame.height())
            .into_iter()
            .find(|d| range.contains(&d.width()) && range.contains(&d.height()))
    }
}

impl DefectClassifier for ThresholdClassifier {
    fn predict(&self, frame: &Frame) -> bool {
        let detection = self.detect(frame);
        if let Some(d) = detection {
            tracing::debug!(
                top = d.top,
                left = d.left,
                width = d.width(),
                height = d.height(),
                "defect detected"
            );
        }
        detection.is_some()
    }
}

/// 3x3 mean filter; border pixels average the in-bounds neighbourhood.
fn box_blur(frame: &Frame) -> Vec<u8> {
    let (w, h) = (frame.width(), frame.height());
    let mut out = vec![0u8; w * h];
    for row in 0..h {
        for col in 0..w {
            let mut sum = 0u32;
            let mut count = 0u32;
            for r in row.saturating_sub(1)..=(row + 1).min(h - 1) {
                for c in col.saturating_sub(1)..=(col + 1).min(w - 1) {
                    sum += u32::from(frame.get(r, c));
                    count += 1;
                }
            }
            out[row * w + col] = ((sum + count / 2) / count) as u8;
        }
    }
    out
}

/// Median and MAD-derived sigma over 8-bit samples.
fn robust_stats(samples: &[u8]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut histogram = [0usize; 256];
    for &v in samples {
        histogram[v as usize] += 1;
    }
    let median = histogram_median(&histogram, samples.len());

    let mut deviations = [0usize; 256];
    for (value, &count) in histogram.iter().enumerate() {
        let dev = (value as i32 - median as i32).unsigned_abs() as usize;
        deviations[dev] += count;
    }
    let mad = histogram_median(&deviations, samples.len());
    (f64::from(median), 1.4826 * f64::from(mad))
}

fn histogram_median(histogram: &[usize; 256], total: usize) -> u8 {
    let half = total.div_ceil(2);
    let mut seen = 0;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= half {
            return value as u8;
        }
    }
    u8::MAX
}

fn blobs(mask: &[bool], width: usize, height: usize) -> Vec<Detection> {
    let mut visited = vec![false; mask.len()];
    let mut found = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut blob = Detection {
            top: start / width,
            left: start % width,
            bottom: start / width,
            right: start % width,
            area: 0,
        };

        while let Some(idx) = queue.pop_front() {
            let (row, col) = (idx / width, idx % width);
            blob.top = blob.top.min(row);
            blob.bottom = blob.bottom.max(row);
            blob.left = blob.left.min(col);
            blob.right = blob.right.max(col);
            blob.area += 1;

            let mut visit = |n: usize| {
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            };
            if row > 0 {
                visit(idx - width);
            }
            if row + 1 < height {
                visit(idx + width);
            }
            if col > 0 {
                visit(idx - 1);
            }
            if col + 1 < width {
                visit(idx + 1);
            }
        }
        found.push(blob);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_patch(size: usize, value: u8) -> Frame {
        let mut frame = Frame::filled(100, 100, 20);
        for r in 40..40 + size {
            for c in 30..30 + size {
                frame.set(r, c, value);
            }
        }
        frame
    }

    #[test]
    fn robust_stats_ignore_outliers() {
        let mut samples = vec![10u8; 990];
        samples.extend(std::iter::repeat(250).take(10));
        let (median, sigma) = robust_stats(&samples);
        assert_eq!(median, 10.0);
        assert_eq!(sigma, 0.0);
    }

    #[test]
    fn finds_ten_pixel_patch() {
        let classifier = ThresholdClassifier::default();
        let d = classifier.detect(&frame_with_patch(10, 200)).unwrap();
        // The blur bleeds one pixel past each edge of the patch.
        assert_eq!((d.width(), d.height()), (12, 12));
        assert_eq!((d.top, d.left), (39, 29));
    }

    #[test]
    fn ignores_blobs_outside_patch_size() {
        let classifier = ThresholdClassifier::default();
        assert!(!classifier.predict(&frame_with_patch(3, 200)));
        assert!(!classifier.predict(&frame_with_patch(25, 200)));
    }

    #[test]
    fn ignores_low_contrast_patch() {
        let classifier = ThresholdClassifier::default();
        assert!(!classifier.predict(&frame_with_patch(10, 40)));
    }

    #[test]
    fn flat_frame_is_clean() {
        let classifier = ThresholdClassifier::default();
        assert!(!classifier.predict(&Frame::filled(100, 100, 0)));
    }

    #[test]
    fn patch_size_window_is_configurable() {
        let small = ThresholdClassifier::new(ClassifierConfig {
            min_patch: 4,
            max_patch: 6,
            ..ClassifierConfig::default()
        });
        let d = small.detect(&frame_with_patch(3, 200)).unwrap();
        assert_eq!((d.width(), d.height()), (5, 5));
        assert!(!small.predict(&frame_with_patch(10, 200)));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClassifierConfig = serde_json::from_str(r#"{"sigma_k": 4.5}"#).unwrap();
        assert_eq!(config.sigma_k, 4.5);
        assert_eq!(config.min_contrast, 25.0);
        assert_eq!((config.min_patch, config.max_patch), (8, 12));
    }
}
