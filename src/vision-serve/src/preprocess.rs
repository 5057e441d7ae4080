//! Request body to input tensor.
//!
//! The transform mirrors the ImageNet evaluation pipeline: resize the shorter
//! side to 256, center-crop 224x224, scale to [0, 1], normalize per channel.

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use log::{debug, info};
use ndarray::Array4;
use serde::Deserialize;
use serde_json::Value;

use crate::error::InputError;
use crate::timer::Timer;

pub const RESIZE_SIZE: u32 = 256;
pub const CROP_SIZE: u32 = 224;
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Event body, either still JSON-encoded or already decoded
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Json(Value),
}

/// Fetches raw image bytes for a URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InputError>;
}

/// Plain HTTP GET
#[derive(Default)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InputError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;

        Ok(resp.bytes().await?.to_vec())
    }
}

/// Extract the image URL from a request body
pub fn image_url(body: &RequestBody) -> Result<String, InputError> {
    let parsed;
    let value = match body {
        RequestBody::Text(raw) => {
            parsed = serde_json::from_str::<Value>(raw)?;
            &parsed
        }
        RequestBody::Json(value) => value,
    };

    value
        .get("url")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(InputError::MissingUrl)
}

/// Fetch the image a body points at and turn it into a (1, 3, 224, 224) tensor
pub async fn input_tensor(
    fetcher: &dyn ImageFetcher,
    body: &RequestBody,
) -> Result<Array4<f32>, InputError> {
    let url = image_url(body)?;

    let mut t = Timer::start(&format!("Fetching image from {}", url));
    let data = fetcher.fetch(&url).await?;
    t.stop();

    let mut t = Timer::start("Load image from memory");
    let image = image::load_from_memory(&data)?;
    t.stop();

    let mut t = Timer::start("Preprocessing image");
    let tensor = to_tensor(&image)?;
    t.stop();

    Ok(tensor)
}

pub fn to_tensor(image: &DynamicImage) -> Result<Array4<f32>, InputError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InputError::EmptyImage);
    }

    // Crop in source coordinates first so only the kept region is resampled.
    let (new_width, new_height) = resized_dims(width, height);
    let (left, crop_width) = source_window(width, new_width);
    let (top, crop_height) = source_window(height, new_height);
    debug!(
        "Cropping {}x{} at ({}, {}) from {}x{} image, resized extent {}x{}",
        crop_width, crop_height, left, top, width, height, new_width, new_height
    );

    let region = image.crop_imm(left, top, crop_width, crop_height).to_rgb8();
    let cropped = imageops::resize(&region, CROP_SIZE, CROP_SIZE, FilterType::Triangle);

    let side = CROP_SIZE as usize;
    let mut tensor = Array4::zeros((1, 3, side, side));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            let value = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            tensor[[0, c, y as usize, x as usize]] = value;
        }
    }

    info!("Input tensor shape is {:?}", tensor.shape());

    Ok(tensor)
}

/// Scale so the shorter side becomes RESIZE_SIZE, truncating the longer side
fn resized_dims(width: u32, height: u32) -> (u64, u64) {
    let scale = |long: u32, short: u32| RESIZE_SIZE as u64 * long as u64 / short as u64;

    if width <= height {
        (RESIZE_SIZE as u64, scale(height, width))
    } else {
        (scale(width, height), RESIZE_SIZE as u64)
    }
}

/// Source pixels `(start, len)` that end up in the centered crop once an axis
/// of `extent` pixels is resized to `resized` pixels
fn source_window(extent: u32, resized: u64) -> (u32, u32) {
    let crop = CROP_SIZE as u128;
    let resized = resized as u128;
    let extent = extent as u128;

    // resized >= RESIZE_SIZE > CROP_SIZE
    let offset = crop_offset(resized - crop);
    let start = offset * extent / resized;
    let end = ((offset + crop) * extent + resized - 1) / resized;
    let end = end.clamp(start + 1, extent);

    (start as u32, (end - start) as u32)
}

/// Half of the surplus, rounding ties to even
fn crop_offset(surplus: u128) -> u128 {
    let half = surplus / 2;
    if surplus % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}
