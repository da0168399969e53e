//! Decoding uploaded images into the tensor the classifier was trained on.
//!
//! The training loader resized every image straight to the model resolution
//! (no letterboxing, nearest-neighbour sampling) and rescaled pixels by 1/255,
//! so this module does exactly the same.

use std::io::Cursor;

use image::{DynamicImage, ImageReader, Limits, RgbImage, imageops, imageops::FilterType};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::error::InferenceError;

/// Spatial input resolution of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::square(224)
    }
}

/// Memory order of the batched input tensor handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the Keras convention.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, the PyTorch convention.
    Nchw,
}

impl TensorLayout {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorLayout::Nhwc => "nhwc",
            TensorLayout::Nchw => "nchw",
        }
    }

    /// Batched shape for a single image of the given resolution.
    pub fn batch_shape(&self, size: InputSize) -> [usize; 4] {
        let (h, w) = (size.height as usize, size.width as usize);
        match self {
            TensorLayout::Nhwc => [1, h, w, 3],
            TensorLayout::Nchw => [1, 3, h, w],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    #[default]
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub resize_filter: ResizeFilter,
    /// Upper bound on either declared dimension of an uploaded image.
    pub max_image_dimension: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_filter: ResizeFilter::Nearest,
            max_image_dimension: 16_384,
        }
    }
}

/// A `(height, width, 3)` image with every channel in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor {
    data: Array3<f32>,
}

impl PreprocessedTensor {
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// `[height, width, channels]`
    pub fn shape(&self) -> [usize; 3] {
        let (h, w, c) = self.data.dim();
        [h, w, c]
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Flattens the tensor in the element order expected for `layout`.
    pub fn to_layout_vec(&self, layout: TensorLayout) -> Vec<f32> {
        match layout {
            TensorLayout::Nhwc => self.data.iter().copied().collect(),
            TensorLayout::Nchw => self
                .data
                .view()
                .permuted_axes([2, 0, 1])
                .iter()
                .copied()
                .collect(),
        }
    }
}

/// Decodes `image_bytes` and prepares it for a model with `target_size` input.
pub fn preprocess(
    image_bytes: &[u8],
    target_size: InputSize,
) -> Result<PreprocessedTensor, InferenceError> {
    preprocess_with(image_bytes, target_size, &PreprocessConfig::default())
}

pub fn preprocess_with(
    image_bytes: &[u8],
    target_size: InputSize,
    config: &PreprocessConfig,
) -> Result<PreprocessedTensor, InferenceError> {
    let image = decode_image(image_bytes, config.max_image_dimension)?;
    Ok(tensor_from_image(&image, target_size, config.resize_filter))
}

pub fn decode_image(image_bytes: &[u8], max_dimension: u32) -> Result<DynamicImage, InferenceError> {
    let mut reader = ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|e| InferenceError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(InferenceError::Decode(
            "unrecognised or unsupported image format".to_string(),
        ));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    reader.limits(limits);

    Ok(reader.decode()?)
}

/// Straight resize to `target_size` followed by a 1/255 rescale.
pub fn tensor_from_image(
    image: &DynamicImage,
    target_size: InputSize,
    filter: ResizeFilter,
) -> PreprocessedTensor {
    let rgb = image.to_rgb8();
    let resized: RgbImage = if rgb.dimensions() == (target_size.width, target_size.height) {
        rgb
    } else {
        imageops::resize(
            &rgb,
            target_size.width,
            target_size.height,
            filter.filter_type(),
        )
    };

    let shape = (
        target_size.height as usize,
        target_size.width as usize,
        3,
    );
    let data = Array3::from_shape_fn(shape, |(y, x, c)| {
        f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0
    });
    PreprocessedTensor { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn solid_png(width: u32, height: u32, value: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([value, value, value]));
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
    }

    #[test]
    fn test_white_image_becomes_ones() {
        let tensor = preprocess(&solid_png(31, 17, 255), InputSize::square(8)).unwrap();
        assert_eq!(tensor.shape(), [8, 8, 3]);
        assert!(tensor.view().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_black_image_becomes_zeros() {
        let tensor = preprocess(&solid_png(5, 40, 0), InputSize::square(8)).unwrap();
        assert!(tensor.view().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_non_image_bytes_fail_to_decode() {
        let err = preprocess(b"definitely not an image", InputSize::default()).unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
        assert!(err.is_client_error());

        let err = preprocess(&[], InputSize::default()).unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let bytes = solid_png(16, 16, 128);
        let err = preprocess(&bytes[..bytes.len() / 2], InputSize::square(4)).unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }

    #[test]
    fn test_resize_ignores_aspect_ratio() {
        let tensor = preprocess(&solid_png(300, 20, 10), InputSize::new(6, 9)).unwrap();
        assert_eq!(tensor.shape(), [9, 6, 3]);
    }

    #[test]
    fn test_channel_values_are_scaled_by_255() {
        let img = RgbImage::from_pixel(4, 4, Rgb([51, 102, 204]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);
        let tensor = preprocess(&bytes, InputSize::square(4)).unwrap();
        let view = tensor.view();
        assert_eq!(view[[0, 0, 0]], 51.0 / 255.0);
        assert_eq!(view[[3, 3, 1]], 102.0 / 255.0);
        assert_eq!(view[[2, 1, 2]], 204.0 / 255.0);
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let img = RgbaImage::from_pixel(3, 3, image::Rgba([255, 255, 255, 0]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);
        let tensor = preprocess(&bytes, InputSize::square(3)).unwrap();
        assert_eq!(tensor.shape(), [3, 3, 3]);
        assert!(tensor.view().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let img = image::GrayImage::from_pixel(5, 5, image::Luma([255]));
        let bytes = encode(DynamicImage::ImageLuma8(img), ImageFormat::Png);
        let tensor = preprocess(&bytes, InputSize::square(2)).unwrap();
        assert_eq!(tensor.shape(), [2, 2, 3]);
        assert!(tensor.view().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_jpeg_input_is_accepted() {
        let img = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        let tensor = preprocess(&bytes, InputSize::square(4)).unwrap();
        assert_eq!(tensor.shape(), [4, 4, 3]);
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let config = PreprocessConfig {
            max_image_dimension: 8,
            ..PreprocessConfig::default()
        };
        let err = preprocess_with(&solid_png(9, 4, 0), InputSize::square(4), &config).unwrap_err();
        assert!(matches!(err, InferenceError::Decode(_)));
    }

    #[test]
    fn test_nchw_layout_groups_channels() {
        let mut data = Array3::<f32>::zeros((1, 2, 3));
        data[[0, 0, 0]] = 1.0;
        data[[0, 1, 0]] = 2.0;
        data[[0, 0, 2]] = 3.0;
        let tensor = PreprocessedTensor::from_array(data);

        assert_eq!(
            tensor.to_layout_vec(TensorLayout::Nhwc),
            vec![1.0, 0.0, 3.0, 2.0, 0.0, 0.0]
        );
        assert_eq!(
            tensor.to_layout_vec(TensorLayout::Nchw),
            vec![1.0, 2.0, 0.0, 0.0, 3.0, 0.0]
        );
    }

    #[test]
    fn test_batch_shape() {
        let size = InputSize::new(224, 200);
        assert_eq!(TensorLayout::Nhwc.batch_shape(size), [1, 200, 224, 3]);
        assert_eq!(TensorLayout::Nchw.batch_shape(size), [1, 3, 200, 224]);
    }
}
