use crate::point_cloud::xyzi_points;
use crate::{Error, Result};
use anyhow::Context;
use frame_transport::{encodings, CameraInfo, Header, Image, PointCloud2};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Render `cloud` as ASCII PLY, skipping points with non-finite coordinates.
/// Returns the document and the number of vertices written.
pub fn render_ply(cloud: &PointCloud2) -> Result<(String, usize)> {
    let mut body = String::new();
    let mut count = 0usize;
    for [x, y, z, i] in xyzi_points(cloud)? {
        if x.is_finite() && y.is_finite() && z.is_finite() {
            let _ = writeln!(body, "{x} {y} {z} {i}");
            count += 1;
        }
    }
    let header = format!(
        "ply\nformat ascii 1.0\ncomment generated by depth-image-proc\ncomment frame_id {}\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nproperty float intensity\nend_header\n",
        cloud.header.frame_id, count
    );
    let mut out = String::with_capacity(header.len() + body.len());
    out.push_str(&header);
    out.push_str(&body);
    Ok((out, count))
}

pub fn write_ply(cloud: &PointCloud2, path: impl AsRef<Path>) -> Result<usize> {
    let (doc, count) = render_ply(cloud)?;
    std::fs::write(path.as_ref(), doc).map_err(|e| Error::Io(e.to_string()))?;
    Ok(count)
}

/// Read a headerless, tightly packed, little-endian frame from disk.
pub fn read_raw_image(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    encoding: &str,
    header: Header,
) -> Result<Image> {
    let bpp = encodings::bytes_per_pixel(encoding)
        .ok_or_else(|| Error::UnsupportedEncoding(encoding.to_string()))?;
    let data = std::fs::read(path.as_ref()).map_err(|e| Error::Io(e.to_string()))?;
    let expected = width as usize * height as usize * bpp;
    if data.len() != expected {
        return Err(Error::InvalidFrame(format!(
            "{} holds {} bytes, {width}x{height} {encoding} needs {expected}",
            path.as_ref().display(),
            data.len()
        )));
    }
    Ok(Image {
        header,
        height,
        width,
        encoding: encoding.to_string(),
        is_bigendian: false,
        step: width * bpp as u32,
        data,
    })
}

/// Calibration as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub width: u32,
    pub height: u32,
    pub k: [f64; 9],
    pub p: [f64; 12],
}

impl CalibrationFile {
    pub fn into_camera_info(self, header: Header) -> CameraInfo {
        CameraInfo {
            header,
            width: self.width,
            height: self.height,
            k: self.k,
            p: self.p,
        }
    }
}

pub fn load_calibration(path: impl AsRef<Path>) -> anyhow::Result<CalibrationFile> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading calibration: {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))
}
