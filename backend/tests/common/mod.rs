#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use realeyez::inference::{
    InferenceError, InferencePipeline, InputSize, ModelArtifact, PreprocessedTensor, TensorLayout,
};
use shared::ArtifactSummary;

#[derive(Debug, Clone, Copy)]
pub enum Scoring {
    Constant(f32),
    /// Mean pixel intensity, so white scores 1.0 and black 0.0.
    Brightness,
}

/// In-memory artifact that counts how often it is run.
pub struct StubArtifact {
    pub size: InputSize,
    pub scoring: Scoring,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StubArtifact {
    pub fn constant(score: f32) -> Self {
        Self::new(InputSize::square(8), Scoring::Constant(score))
    }

    pub fn brightness() -> Self {
        Self::new(InputSize::square(8), Scoring::Brightness)
    }

    pub fn new(size: InputSize, scoring: Scoring) -> Self {
        Self {
            size,
            scoring,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelArtifact for StubArtifact {
    fn input_size(&self) -> InputSize {
        self.size
    }

    fn score(&self, tensor: &PreprocessedTensor) -> Result<f32, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(match self.scoring {
            Scoring::Constant(score) => score,
            Scoring::Brightness => tensor.view().mean().unwrap_or(0.0),
        })
    }

    fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            format: "stub".into(),
            path: "memory".into(),
            input_width: self.size.width,
            input_height: self.size.height,
            channels: 3,
            layout: TensorLayout::Nhwc.as_str().into(),
            apply_sigmoid: false,
        }
    }
}

pub fn pipeline(stub: StubArtifact) -> (InferencePipeline, Arc<StubArtifact>) {
    let stub = Arc::new(stub);
    (InferencePipeline::new(stub.clone()), stub)
}

pub fn solid_image(width: u32, height: u32, rgb: [u8; 3], format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    solid_image(width, height, rgb, ImageFormat::Png)
}

pub fn white_png() -> Vec<u8> {
    solid_png(32, 32, [255, 255, 255])
}

pub fn black_png() -> Vec<u8> {
    solid_png(32, 32, [0, 0, 0])
}
