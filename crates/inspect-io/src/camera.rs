//! Synthetic camera producing noisy grayscale frames with optional defects.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Row-major 8-bit grayscale frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.pixels[row * self.width + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        self.pixels[row * self.width + col] = value;
    }

    /// Write the frame as a binary PGM (P5) image.
    pub fn write_pgm<W: Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "P5\n{} {}\n255\n", self.width, self.height)?;
        out.write_all(&self.pixels)
    }
}

pub trait Camera: Send {
    fn capture(&mut self, with_defect: bool, low_lighting: bool) -> Frame;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: usize,
    pub height: usize,
    /// Side length of the square defect patch.
    pub defect_size: usize,
    pub noise_level: f64,
    pub low_light_noise_level: f64,
    pub defect_intensity: f64,
    pub low_light_defect_intensity: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            defect_size: 10,
            noise_level: 10.0,
            low_light_noise_level: 35.0,
            defect_intensity: 255.0,
            low_light_defect_intensity: 80.0,
        }
    }
}

/// Top-left corner of the last injected defect patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefectSite {
    pub row: usize,
    pub col: usize,
}

pub struct SyntheticCamera {
    config: CameraConfig,
    rng: ChaCha8Rng,
    last_defect: Option<DefectSite>,
}

impl SyntheticCamera {
    /// Seeded for reproducible frames; `None` seeds from the OS.
    pub fn new(config: CameraConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            config,
            rng,
            last_defect: None,
        }
    }

    pub fn last_defect(&self) -> Option<DefectSite> {
        self.last_defect
    }

    /// |N(0, 1)| via Box-Muller.
    fn half_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()).abs()
    }

    fn place_defect(&mut self) -> DefectSite {
        let half = self.config.defect_size / 2;
        let margin = self.config.defect_size;
        let max_row = self.config.height.saturating_sub(margin).max(margin);
        let max_col = self.config.width.saturating_sub(margin).max(margin);
        let row = self.rng.gen_range(margin..=max_row) - half;
        let col = self.rng.gen_range(margin..=max_col) - half;
        DefectSite { row, col }
    }
}

impl Camera for SyntheticCamera {
    fn capture(&mut self, with_defect: bool, low_lighting: bool) -> Frame {
        let (noise, intensity) = if low_lighting {
            (
                self.config.low_light_noise_level,
                self.config.low_light_defect_intensity,
            )
        } else {
            (self.config.noise_level, self.config.defect_intensity)
        };

        let (width, height) = (self.config.width, self.config.height);
        let mut levels: Vec<f64> = (0..width * height)
            .map(|_| self.half_normal() * noise)
            .collect();

        self.last_defect = None;
        if with_defect {
            let site = self.place_defect();
            let size = self.config.defect_size;
            for row in site.row..(site.row + size).min(height) {
                for col in site.col..(site.col + size).min(width) {
                    levels[row * width + col] += intensity;
                }
            }
            tracing::trace!(row = site.row, col = site.col, "injected defect");
            self.last_defect = Some(site);
        }

        let pixels = levels
            .into_iter()
            .map(|v| v.clamp(0.0, 255.0) as u8)
            .collect();
        Frame {
            width,
            height,
            pixels,
        }
    }
}
