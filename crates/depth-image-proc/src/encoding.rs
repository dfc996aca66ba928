//! Encoding-aware pixel decoding for depth and intensity images.

use crate::{Error, Result};
use frame_transport::{encodings, Image};

/// Storage formats accepted for depth images.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DepthEncoding {
    /// Unsigned 16-bit integer, millimeters.
    Fixed16Mm,
    /// 32-bit float, meters.
    Float32M,
}

/// One undecoded depth sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawDepth {
    Millimeters(u16),
    Meters(f32),
}

impl RawDepth {
    /// Metric depth and whether the sample is a real measurement.
    pub fn decode(self) -> (f32, bool) {
        match self {
            RawDepth::Millimeters(mm) => (f32::from(mm) * 0.001, mm != 0),
            RawDepth::Meters(m) => (m, m.is_finite() && m > 0.0),
        }
    }

    /// The sample in its storage unit, `None` when it is not a real measurement.
    pub fn valid_raw(self) -> Option<f32> {
        match self {
            RawDepth::Millimeters(0) => None,
            RawDepth::Millimeters(mm) => Some(f32::from(mm)),
            RawDepth::Meters(m) if m.is_finite() && m > 0.0 => Some(m),
            RawDepth::Meters(_) => None,
        }
    }
}

impl DepthEncoding {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            encodings::TYPE_16UC1 | encodings::MONO16 => Ok(Self::Fixed16Mm),
            encodings::TYPE_32FC1 => Ok(Self::Float32M),
            other => Err(Error::UnsupportedEncoding(other.to_string())),
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Fixed16Mm => 2,
            Self::Float32M => 4,
        }
    }

    /// Meters represented by `raw` storage units; `to_meters(1.0)` is the unit scale.
    pub fn to_meters(&self, raw: f32) -> f32 {
        match self {
            Self::Fixed16Mm => raw * 0.001,
            Self::Float32M => raw,
        }
    }

    /// Read the sample stored in `px` (exactly `bytes_per_pixel` bytes).
    pub fn sample(&self, px: &[u8], big_endian: bool) -> RawDepth {
        match self {
            Self::Fixed16Mm => RawDepth::Millimeters(read_u16(px, big_endian)),
            Self::Float32M => RawDepth::Meters(read_f32(px, big_endian)),
        }
    }

    pub fn decode(&self, px: &[u8], big_endian: bool) -> (f32, bool) {
        self.sample(px, big_endian).decode()
    }
}

/// Storage formats accepted for the intensity channel of a point cloud.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IntensityEncoding {
    Mono8,
    Mono16,
    Float32,
}

impl IntensityEncoding {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            encodings::MONO8 => Ok(Self::Mono8),
            encodings::MONO16 | encodings::TYPE_16UC1 => Ok(Self::Mono16),
            encodings::TYPE_32FC1 => Ok(Self::Float32),
            other => Err(Error::UnsupportedEncoding(other.to_string())),
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Mono16 => 2,
            Self::Float32 => 4,
        }
    }

    pub fn read(&self, px: &[u8], big_endian: bool) -> f32 {
        match self {
            Self::Mono8 => f32::from(px[0]),
            Self::Mono16 => f32::from(read_u16(px, big_endian)),
            Self::Float32 => read_f32(px, big_endian),
        }
    }
}

/// Check the stride/buffer invariants of `image` for a given pixel size.
pub(crate) fn check_layout(image: &Image, bpp: usize) -> Result<()> {
    let min_step = image.width as usize * bpp;
    if (image.step as usize) < min_step {
        return Err(Error::InvalidFrame(format!(
            "row stride {} shorter than {} pixels of {} bytes",
            image.step, image.width, bpp
        )));
    }
    let needed = image.height as usize * image.step as usize;
    if image.data.len() < needed {
        return Err(Error::InvalidFrame(format!(
            "buffer holds {} bytes, {}x{} rows need {}",
            image.data.len(),
            image.height,
            image.step,
            needed
        )));
    }
    Ok(())
}

/// Pixel `u` of row `v`. Caller must have run [`check_layout`].
pub(crate) fn pixel(image: &Image, u: usize, v: usize, bpp: usize) -> &[u8] {
    let start = v * image.step as usize + u * bpp;
    &image.data[start..start + bpp]
}

fn read_u16(px: &[u8], big_endian: bool) -> u16 {
    let b = [px[0], px[1]];
    if big_endian {
        u16::from_be_bytes(b)
    } else {
        u16::from_le_bytes(b)
    }
}

fn read_f32(px: &[u8], big_endian: bool) -> f32 {
    let b = [px[0], px[1], px[2], px[3]];
    if big_endian {
        f32::from_be_bytes(b)
    } else {
        f32::from_le_bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millimeters_and_meters_agree() {
        let (mm, ok_mm) = RawDepth::Millimeters(1500).decode();
        let (m, ok_m) = RawDepth::Meters(1.5).decode();
        assert!(ok_mm && ok_m);
        assert!((mm - 1.5).abs() < 1e-6);
        assert!((m - 1.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_samples() {
        assert!(!RawDepth::Millimeters(0).decode().1);
        assert!(!RawDepth::Meters(f32::NAN).decode().1);
        assert!(!RawDepth::Meters(f32::INFINITY).decode().1);
        assert!(!RawDepth::Meters(f32::NEG_INFINITY).decode().1);
        assert!(!RawDepth::Meters(0.0).decode().1);
        assert!(!RawDepth::Meters(-1.0).decode().1);
    }

    #[test]
    fn unit_scale_and_raw_values() {
        assert!((DepthEncoding::Fixed16Mm.to_meters(1.0) - 0.001).abs() < 1e-9);
        assert_eq!(DepthEncoding::Float32M.to_meters(1.0), 1.0);
        assert!((DepthEncoding::Fixed16Mm.to_meters(1500.0) - 1.5).abs() < 1e-6);
        assert_eq!(RawDepth::Millimeters(1500).valid_raw(), Some(1500.0));
        assert_eq!(RawDepth::Millimeters(0).valid_raw(), None);
        assert_eq!(RawDepth::Meters(2.0).valid_raw(), Some(2.0));
        assert_eq!(RawDepth::Meters(f32::NAN).valid_raw(), None);
    }

    #[test]
    fn tags() {
        assert_eq!(DepthEncoding::from_tag("16UC1").unwrap(), DepthEncoding::Fixed16Mm);
        assert_eq!(DepthEncoding::from_tag("32FC1").unwrap(), DepthEncoding::Float32M);
        assert!(matches!(
            DepthEncoding::from_tag("rgb8"),
            Err(Error::UnsupportedEncoding(_))
        ));
        assert_eq!(IntensityEncoding::from_tag("16UC1").unwrap(), IntensityEncoding::Mono16);
        assert!(IntensityEncoding::from_tag("bgr8").is_err());
    }

    #[test]
    fn endianness() {
        let le = 1500u16.to_le_bytes();
        let be = 1500u16.to_be_bytes();
        assert_eq!(
            DepthEncoding::Fixed16Mm.sample(&le, false),
            RawDepth::Millimeters(1500)
        );
        assert_eq!(
            DepthEncoding::Fixed16Mm.sample(&be, true),
            RawDepth::Millimeters(1500)
        );
        let f = 2.5f32.to_be_bytes();
        assert_eq!(IntensityEncoding::Float32.read(&f, true), 2.5);
    }
}
