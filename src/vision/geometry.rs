//! Coordinate transforms for detector output
//!
//! The detector sees a resized copy of the crop region, but boxes are shown
//! against the full preview frame. A box therefore travels through three
//! spaces, always in the same order:
//!
//! `ModelNormalized` -> [`decode_raw_box`] -> `ModelPixel`
//! -> [`rescale_to_crop_region`] -> `CropRegion`
//! -> [`offset_to_frame_pixel`] -> `FramePixel`
//!
//! Each step is pure and returns a new box.

use serde::Serialize;

use crate::error::DecodeError;

/// Coordinate space a [`BoundingBox`] is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Detector output in [0, 1]
    ModelNormalized,
    /// Pixels of the resized model input
    ModelPixel,
    /// Pixels of the crop region, relative to its top-left corner
    CropRegion,
    /// Pixels of the full, un-cropped frame
    FramePixel,
}

/// Axis-aligned box. Width and height are never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    space: CoordinateSpace,
}

impl BoundingBox {
    /// Build a box from its top-left corner and size
    pub fn from_ltwh(
        space: CoordinateSpace,
        left: f32,
        top: f32,
        width: f32,
        height: f32,
    ) -> Result<Self, DecodeError> {
        if ![left, top, width, height].iter().all(|v| v.is_finite()) {
            return Err(DecodeError::NonFinite);
        }
        if width < 0.0 || height < 0.0 {
            return Err(DecodeError::InvertedBox {
                x0: left,
                y0: top,
                x1: left + width,
                y1: top + height,
            });
        }

        Ok(Self { left, top, width, height, space })
    }

    /// Build a box from two corners
    pub fn from_corners(
        space: CoordinateSpace,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Result<Self, DecodeError> {
        if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
            return Err(DecodeError::NonFinite);
        }
        if x1 < x0 || y1 < y0 {
            return Err(DecodeError::InvertedBox { x0, y0, x1, y1 });
        }

        Ok(Self {
            left: x0,
            top: y0,
            width: x1 - x0,
            height: y1 - y0,
            space,
        })
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn top(&self) -> f32 {
        self.top
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    /// Integer pixel rectangle `(x, y, width, height)` clipped to an image of
    /// the given size. Returns `None` when nothing of the box lies inside it.
    pub fn clamped_pixel_rect(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.left.floor().clamp(0.0, image_width as f32) as u32;
        let y0 = self.top.floor().clamp(0.0, image_height as f32) as u32;
        let x1 = self.right().ceil().clamp(0.0, image_width as f32) as u32;
        let y1 = self.bottom().ceil().clamp(0.0, image_height as f32) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Scale normalized detector corners to model input pixels.
///
/// Inverted boxes are reported, not corrected; the caller drops them.
pub fn decode_raw_box(
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    model_width: u32,
    model_height: u32,
) -> Result<BoundingBox, DecodeError> {
    let mw = model_width as f32;
    let mh = model_height as f32;

    BoundingBox::from_corners(CoordinateSpace::ModelPixel, x0 * mw, y0 * mh, x1 * mw, y1 * mh)
}

/// Map a model-pixel box onto the crop region.
///
/// Horizontal and vertical factors are applied independently, the model
/// input does not have to share the crop's aspect ratio.
pub fn rescale_to_crop_region(
    bbox: &BoundingBox,
    model_width: u32,
    model_height: u32,
    crop_width: u32,
    crop_height: u32,
) -> BoundingBox {
    debug_assert_eq!(bbox.space, CoordinateSpace::ModelPixel);

    let sx = crop_width as f32 / model_width as f32;
    let sy = crop_height as f32 / model_height as f32;

    BoundingBox {
        left: bbox.left * sx,
        top: bbox.top * sy,
        width: bbox.width * sx,
        height: bbox.height * sy,
        space: CoordinateSpace::CropRegion,
    }
}

/// Translate a crop-region box into full-frame pixels
pub fn offset_to_frame_pixel(bbox: &BoundingBox, crop_origin_x: u32, crop_origin_y: u32) -> BoundingBox {
    debug_assert_eq!(bbox.space, CoordinateSpace::CropRegion);

    BoundingBox {
        left: bbox.left + crop_origin_x as f32,
        top: bbox.top + crop_origin_y as f32,
        space: CoordinateSpace::FramePixel,
        ..*bbox
    }
}

/// Model input size plus the crop region it was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub model_width: u32,
    pub model_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
}

impl FrameGeometry {
    /// Run the full Decode -> Rescale -> Offset chain
    pub fn to_frame_pixel(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> Result<BoundingBox, DecodeError> {
        let model = decode_raw_box(x0, y0, x1, y1, self.model_width, self.model_height)?;
        let crop = rescale_to_crop_region(
            &model,
            self.model_width,
            self.model_height,
            self.crop_width,
            self.crop_height,
        );
        Ok(offset_to_frame_pixel(&crop, self.crop_x, self.crop_y))
    }
}
