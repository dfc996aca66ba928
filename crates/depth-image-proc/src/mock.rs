use crate::traits::{FrameSet, FrameSource};
use crate::{Error, Result};
use frame_transport::{encodings, CameraInfo, Header, Image};
use time::{Duration, OffsetDateTime};

const FRAME_ID: &str = "depth_optical";
const FRAME_PERIOD_MS: i64 = 33;
const BASELINE_M: f64 = 0.075;

/// Synthetic depth sensor: a tilted plane in millimeters with a sparse grid of
/// zero (invalid) holes, plus a gray ramp intensity image at twice the resolution.
pub struct MockDepthCamera {
    width: u32,
    height: u32,
    counter: u64,
    start: OffsetDateTime,
}

impl MockDepthCamera {
    pub fn depth_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn depth(&self, header: Header) -> Result<Image> {
        let mut img = Image::zeroed(header, self.width, self.height, encodings::TYPE_16UC1)
            .ok_or_else(|| Error::InvalidFrame("mock depth size overflow".to_string()))?;
        let mut data = Vec::with_capacity(img.data.len());
        for y in 0..self.height {
            for x in 0..self.width {
                let mm = if (x + y) % 37 == 0 {
                    0u16
                } else {
                    (800 + x + 2 * y).min(u32::from(u16::MAX)) as u16
                };
                data.extend_from_slice(&mm.to_le_bytes());
            }
        }
        img.data = data;
        Ok(img)
    }

    fn intensity(&self, header: Header) -> Result<Image> {
        let (w, h) = (self.width * 2, self.height * 2);
        let mut img = Image::zeroed(header, w, h, encodings::MONO8)
            .ok_or_else(|| Error::InvalidFrame("mock intensity size overflow".to_string()))?;
        for y in 0..h {
            for x in 0..w {
                img.data[(y * w + x) as usize] = ((u64::from(x + y) + self.counter) % 256) as u8;
            }
        }
        Ok(img)
    }

    fn camera_info(header: Header, w: u32, h: u32) -> CameraInfo {
        let f = 525.0 * f64::from(w) / 640.0;
        let (cx, cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
        CameraInfo {
            header,
            width: w,
            height: h,
            k: [f, 0.0, cx, 0.0, f, cy, 0.0, 0.0, 1.0],
            p: [f, 0.0, cx, -f * BASELINE_M, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }
}

impl FrameSource for MockDepthCamera {
    /// `spec` is empty for 320x240 or `WIDTHxHEIGHT` for the depth resolution.
    fn open(spec: &str) -> Result<Self> {
        let (width, height) = if spec.trim().is_empty() {
            (320, 240)
        } else {
            parse_size(spec)?
        };
        Ok(Self {
            width,
            height,
            counter: 0,
            start: OffsetDateTime::now_utc(),
        })
    }

    fn read(&mut self) -> Result<FrameSet> {
        let offset = i64::try_from(self.counter)
            .map_err(|_| Error::InvalidFrame("mock frame counter overflow".to_string()))?;
        let stamp = self.start + Duration::milliseconds(offset * FRAME_PERIOD_MS);
        let header = Header::new(stamp, FRAME_ID);
        let set = FrameSet {
            depth: self.depth(header.clone())?,
            intensity: self.intensity(header.clone())?,
            camera_info: Self::camera_info(header.clone(), self.width * 2, self.height * 2),
            depth_camera_info: Self::camera_info(header, self.width, self.height),
        };
        self.counter += 1;
        Ok(set)
    }
}

fn parse_size(spec: &str) -> Result<(u32, u32)> {
    let bad = || Error::Config(format!("expected WIDTHxHEIGHT, got {spec:?}"));
    let (w, h) = spec.trim().split_once('x').ok_or_else(bad)?;
    let w: u32 = w.parse().map_err(|_| bad())?;
    let h: u32 = h.parse().map_err(|_| bad())?;
    if w == 0 || h == 0 {
        return Err(bad());
    }
    Ok((w, h))
}
