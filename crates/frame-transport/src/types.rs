use core::fmt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Well-known image encoding tags.
pub mod encodings {
    pub const MONO8: &str = "mono8";
    pub const MONO16: &str = "mono16";
    pub const TYPE_16UC1: &str = "16UC1";
    pub const TYPE_32FC1: &str = "32FC1";
    pub const RGB8: &str = "rgb8";
    pub const BGR8: &str = "bgr8";
    pub const RGBA8: &str = "rgba8";
    pub const BGRA8: &str = "bgra8";

    /// Bytes per pixel for a known tag, `None` for anything else.
    pub fn bytes_per_pixel(encoding: &str) -> Option<usize> {
        match encoding {
            MONO8 => Some(1),
            MONO16 | TYPE_16UC1 => Some(2),
            RGB8 | BGR8 => Some(3),
            TYPE_32FC1 | RGBA8 | BGRA8 => Some(4),
            _ => None,
        }
    }
}

/// Timestamp and coordinate frame shared by every stamped message.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub stamp: OffsetDateTime,
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: OffsetDateTime, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// A raw image as delivered by the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    /// Row stride in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Allocate a zero-filled, tightly packed image.
    pub fn zeroed(header: Header, width: u32, height: u32, encoding: &str) -> Option<Self> {
        let bpp = encodings::bytes_per_pixel(encoding)?;
        let step = width as usize * bpp;
        Some(Self {
            header,
            height,
            width,
            encoding: encoding.to_string(),
            is_bigendian: false,
            step: step as u32,
            data: vec![0u8; step * height as usize],
        })
    }
}

/// Calibration for one camera: intrinsic block `k` (3x3, row-major) and
/// projection `p` (3x4, row-major).
#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub k: [f64; 9],
    pub p: [f64; 12],
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisparityImage {
    pub header: Header,
    /// 32FC1 disparity values in pixels.
    pub image: Image,
    /// Focal length in pixels.
    pub f: f32,
    /// Baseline in meters.
    pub t: f32,
    pub min_disparity: f32,
    pub max_disparity: f32,
    pub delta_d: f32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PointFieldType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl PointFieldType {
    pub fn size(&self) -> u32 {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: PointFieldType,
    pub count: u32,
}

/// Structured point buffer; each point occupies `point_step` bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud2 {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: Vec<u8>,
    pub is_dense: bool,
}

impl PointCloud2 {
    pub fn field(&self, name: &str) -> Option<&PointField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.height as usize * self.width as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved topic and the transport it is carried on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TopicInfo {
    pub name: String,
    pub transport: String,
}

impl fmt::Display for TopicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.transport)
    }
}
