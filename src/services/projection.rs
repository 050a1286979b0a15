//! Frame-pixel to preview-view coordinate projection
//!
//! A point detected in the raw frame goes through three steps:
//! 1. normalize into the unit square
//! 2. rotate clockwise (and mirror for the front camera) according to the
//!    image orientation derived from device orientation + camera position
//! 3. aspect-fill into the preview view, centered, overflow cropped

use crate::domain::types::{CameraPosition, DeviceOrientation, Frame, Point};

/// Orientation of the image buffer relative to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrientation {
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    Left,
    LeftMirrored,
    Right,
    RightMirrored,
}

impl ImageOrientation {
    pub fn from_device(orientation: DeviceOrientation, camera: CameraPosition) -> Self {
        use CameraPosition::{Back, Front};
        match (orientation, camera) {
            (DeviceOrientation::Portrait, Front) => ImageOrientation::LeftMirrored,
            (DeviceOrientation::Portrait, Back) => ImageOrientation::Right,
            (DeviceOrientation::LandscapeLeft, Front) => ImageOrientation::DownMirrored,
            (DeviceOrientation::LandscapeLeft, Back) => ImageOrientation::Up,
            (DeviceOrientation::PortraitUpsideDown, Front) => ImageOrientation::RightMirrored,
            (DeviceOrientation::PortraitUpsideDown, Back) => ImageOrientation::Left,
            (DeviceOrientation::LandscapeRight, Front) => ImageOrientation::UpMirrored,
            (DeviceOrientation::LandscapeRight, Back) => ImageOrientation::Down,
            (DeviceOrientation::FaceUp | DeviceOrientation::FaceDown | DeviceOrientation::Unknown, _) => {
                ImageOrientation::Up
            }
        }
    }

    /// Clockwise rotation applied to the normalized point
    pub fn rotation_degrees(&self) -> u16 {
        match self {
            ImageOrientation::Up | ImageOrientation::UpMirrored => 90,
            ImageOrientation::RightMirrored | ImageOrientation::Left => 180,
            ImageOrientation::Down | ImageOrientation::DownMirrored => 270,
            ImageOrientation::LeftMirrored | ImageOrientation::Right => 0,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        matches!(
            self,
            ImageOrientation::UpMirrored
                | ImageOrientation::DownMirrored
                | ImageOrientation::LeftMirrored
                | ImageOrientation::RightMirrored
        )
    }
}

/// Preview layer size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSize {
    pub width: f64,
    pub height: f64,
}

impl ViewSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Precomputed projection for one frame; reused for every landmark of that frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    frame_width: f64,
    frame_height: f64,
    orientation: ImageOrientation,
    scale: f64,
    /// Rotated frame size after scaling
    scaled_width: f64,
    scaled_height: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Projection {
    /// `None` when the frame or the view has no area
    pub fn new(
        frame_width: u32,
        frame_height: u32,
        orientation: ImageOrientation,
        view: ViewSize,
    ) -> Option<Self> {
        if frame_width == 0 || frame_height == 0 || !view.is_valid() {
            return None;
        }

        let (fw, fh) = (frame_width as f64, frame_height as f64);
        let (rw, rh) = match orientation.rotation_degrees() {
            90 | 270 => (fh, fw),
            _ => (fw, fh),
        };

        let scale = (view.width / rw).max(view.height / rh);
        let scaled_width = rw * scale;
        let scaled_height = rh * scale;

        Some(Self {
            frame_width: fw,
            frame_height: fh,
            orientation,
            scale,
            scaled_width,
            scaled_height,
            offset_x: (view.width - scaled_width) / 2.0,
            offset_y: (view.height - scaled_height) / 2.0,
        })
    }

    pub fn for_frame(frame: &Frame, view: ViewSize) -> Option<Self> {
        let orientation = ImageOrientation::from_device(frame.orientation, frame.camera);
        Self::new(frame.width, frame.height, orientation, view)
    }

    pub fn orientation(&self) -> ImageOrientation {
        self.orientation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Map a frame-pixel point into view coordinates
    pub fn project(&self, point: Point) -> Point {
        let u = point.x / self.frame_width;
        let v = point.y / self.frame_height;

        let (mut u, v) = match self.orientation.rotation_degrees() {
            90 => (1.0 - v, u),
            180 => (1.0 - u, 1.0 - v),
            270 => (v, 1.0 - u),
            _ => (u, v),
        };

        if self.orientation.is_mirrored() {
            u = 1.0 - u;
        }

        Point::new(u * self.scaled_width + self.offset_x, v * self.scaled_height + self.offset_y)
    }
}

/// One-shot projection of a single point
pub fn project_point(
    point: Point,
    frame_width: u32,
    frame_height: u32,
    orientation: ImageOrientation,
    view: ViewSize,
) -> Option<Point> {
    Projection::new(frame_width, frame_height, orientation, view).map(|p| p.project(point))
}
