use crate::Result;
use frame_transport::{CameraInfo, Image};

/// One capture of a depth sensor with its companion image and calibrations for both.
#[derive(Clone, Debug)]
pub struct FrameSet {
    pub depth: Image,
    pub intensity: Image,
    /// Calibration at the intensity resolution.
    pub camera_info: CameraInfo,
    /// Calibration at the depth resolution.
    pub depth_camera_info: CameraInfo,
}

pub trait FrameSource {
    /// Open a source by device path or spec string.
    fn open(spec: &str) -> Result<Self>
    where
        Self: Sized;

    /// Read the next capture.
    fn read(&mut self) -> Result<FrameSet>;
}
