//! Image preprocessing for the card detector
//!
//! The detector takes the crop region resized to its fixed input size, as a
//! `[1, 3, H, W]` tensor of raw 0-255 RGB values (no normalization).

use image::imageops::FilterType;
use image::RgbaImage;
use ndarray::Array4;

use crate::capture::frame::CapturedFrame;
use crate::error::EngineError;
use crate::vision::geometry::FrameGeometry;

/// Crop region actually taken from a frame, clipped to the frame bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Detector input together with the region it was cut from
pub struct ModelInput {
    pub tensor: Array4<f32>,
    pub region: CropRegion,
}

/// Cut the configured crop region out of `frame` and build the detector tensor
pub fn prepare_model_input(frame: &CapturedFrame, geometry: &FrameGeometry) -> Result<ModelInput, EngineError> {
    let crop = frame
        .crop(geometry.crop_x, geometry.crop_y, geometry.crop_width, geometry.crop_height)
        .ok_or_else(|| {
            EngineError::Preprocess(format!(
                "crop region {}x{} at ({}, {}) lies outside the {}x{} frame",
                geometry.crop_width,
                geometry.crop_height,
                geometry.crop_x,
                geometry.crop_y,
                frame.width(),
                frame.height()
            ))
        })?;

    let region = CropRegion {
        x: geometry.crop_x,
        y: geometry.crop_y,
        width: crop.width(),
        height: crop.height(),
    };

    let resized = resize_for_model(&crop, geometry.model_width, geometry.model_height);
    Ok(ModelInput {
        tensor: image_to_tensor(&resized),
        region,
    })
}

/// Stretch an image to the model input size
pub fn resize_for_model(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// RGBA image to a `[1, 3, H, W]` tensor of raw channel values
pub fn image_to_tensor(image: &RgbaImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = pixel[0] as f32;
        tensor[[0, 1, y, x]] = pixel[1] as f32;
        tensor[[0, 2, y, x]] = pixel[2] as f32;
    }

    tensor
}
