use crate::camera::CameraIntrinsics;
use crate::encoding::{check_layout, pixel, DepthEncoding, IntensityEncoding};
use crate::{Error, Result};
use frame_transport::{Image, PointCloud2, PointField, PointFieldType};

/// Bytes per (x, y, z, intensity) record.
pub const XYZI_POINT_STEP: u32 = 16;

/// Field layout of an XYZI cloud: four little-endian `f32`s.
pub fn xyzi_fields() -> Vec<PointField> {
    ["x", "y", "z", "intensity"]
        .iter()
        .enumerate()
        .map(|(i, name)| PointField {
            name: (*name).to_string(),
            offset: i as u32 * 4,
            datatype: PointFieldType::Float32,
            count: 1,
        })
        .collect()
}

/// Depth + intensity to an organized XYZI point cloud.
#[derive(Clone, Debug, Default)]
pub struct PointCloudConverter {
    invalid_depth: f64,
}

impl PointCloudConverter {
    /// `invalid_depth` (meters) replaces samples that fail validation before projection.
    pub fn new(invalid_depth: f64) -> Self {
        Self { invalid_depth }
    }

    /// `companion` must already be on the depth grid (see [`crate::reconcile`]).
    pub fn convert(
        &self,
        depth: &Image,
        companion: &Image,
        intrinsics: &CameraIntrinsics,
    ) -> Result<PointCloud2> {
        let depth_enc = DepthEncoding::from_tag(&depth.encoding)?;
        let intensity_enc = IntensityEncoding::from_tag(&companion.encoding)?;
        let dbpp = depth_enc.bytes_per_pixel();
        let ibpp = intensity_enc.bytes_per_pixel();
        check_layout(depth, dbpp)?;
        check_layout(companion, ibpp)?;
        if depth.width != companion.width || depth.height != companion.height {
            return Err(Error::InvalidFrame(format!(
                "depth is {}x{} but intensity is {}x{}",
                depth.width, depth.height, companion.width, companion.height
            )));
        }

        let model = intrinsics.model();
        let width = depth.width as usize;
        let height = depth.height as usize;
        let mut data = Vec::with_capacity(width * height * XYZI_POINT_STEP as usize);
        for v in 0..height {
            for u in 0..width {
                let (z, valid) = depth_enc.decode(pixel(depth, u, v, dbpp), depth.is_bigendian);
                let z = if valid { f64::from(z) } else { self.invalid_depth };
                let (x, y, z) = model.project(u as f64, v as f64, z);
                let i = intensity_enc.read(pixel(companion, u, v, ibpp), companion.is_bigendian);
                for value in [x as f32, y as f32, z as f32, i] {
                    data.extend_from_slice(&value.to_le_bytes());
                }
            }
        }

        Ok(PointCloud2 {
            header: depth.header.clone(),
            height: depth.height,
            width: depth.width,
            fields: xyzi_fields(),
            is_bigendian: false,
            point_step: XYZI_POINT_STEP,
            row_step: depth.width * XYZI_POINT_STEP,
            data,
            is_dense: false,
        })
    }
}

/// Iterate `(x, y, z, intensity)` of a cloud laid out with float32 `x`, `y`, `z`,
/// `intensity` fields at any offsets.
pub fn xyzi_points(cloud: &PointCloud2) -> Result<impl Iterator<Item = [f32; 4]> + '_> {
    let mut offsets = [0usize; 4];
    for (slot, name) in offsets.iter_mut().zip(["x", "y", "z", "intensity"]) {
        let field = cloud
            .field(name)
            .filter(|f| f.datatype == PointFieldType::Float32)
            .ok_or_else(|| Error::InvalidFrame(format!("no float32 field {name}")))?;
        if field.offset + 4 > cloud.point_step {
            return Err(Error::InvalidFrame(format!("field {name} past point end")));
        }
        *slot = field.offset as usize;
    }
    let step = cloud.point_step as usize;
    if step == 0 || cloud.data.len() < cloud.len() * step {
        return Err(Error::InvalidFrame("point buffer too short".to_string()));
    }
    let be = cloud.is_bigendian;
    Ok(cloud.data.chunks_exact(step).take(cloud.len()).map(move |rec| {
        offsets.map(|o| {
            let b = [rec[o], rec[o + 1], rec[o + 2], rec[o + 3]];
            if be {
                f32::from_be_bytes(b)
            } else {
                f32::from_le_bytes(b)
            }
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_transport::{encodings, Header};
    use time::OffsetDateTime;

    fn header(frame: &str) -> Header {
        Header::new(OffsetDateTime::UNIX_EPOCH, frame)
    }

    fn intrinsics(f: f64, cx: f64, cy: f64) -> CameraIntrinsics {
        CameraIntrinsics {
            width: 0,
            height: 0,
            k: [f, 0.0, cx, 0.0, f, cy, 0.0, 0.0, 1.0],
            p: [f, 0.0, cx, 0.0, 0.0, f, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    fn depth_m(width: u32, height: u32, value: f32) -> Image {
        let mut img = Image::zeroed(header("depth"), width, height, encodings::TYPE_32FC1).unwrap();
        img.data = std::iter::repeat(value.to_le_bytes())
            .take((width * height) as usize)
            .flatten()
            .collect();
        img
    }

    fn mono8(width: u32, height: u32) -> Image {
        let mut img = Image::zeroed(header("intensity"), width, height, encodings::MONO8).unwrap();
        for (i, b) in img.data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(10);
        }
        img
    }

    #[test]
    fn projects_with_pinhole_model() {
        let depth = depth_m(501, 1, 2.0);
        let cloud = PointCloudConverter::default()
            .convert(&depth, &mono8(501, 1), &intrinsics(500.0, 0.0, 0.0))
            .unwrap();
        let points: Vec<[f32; 4]> = xyzi_points(&cloud).unwrap().collect();
        assert_eq!(points.len(), 501);
        assert_eq!(&points[0][..3], &[0.0, 0.0, 2.0]);
        assert_eq!(&points[500][..3], &[2.0, 0.0, 2.0]);
        assert_eq!((cloud.width, cloud.height), (501, 1));
        assert!(!cloud.is_dense);
        assert!(!cloud.is_bigendian);
        assert_eq!(cloud.header, header("depth"));
        assert_eq!(cloud.row_step, 501 * 16);
    }

    #[test]
    fn invalid_depth_uses_sentinel_and_keeps_intensity() {
        let mut depth = Image::zeroed(header("depth"), 2, 1, encodings::TYPE_16UC1).unwrap();
        depth.data = [0u16, 1000].iter().flat_map(|s| s.to_le_bytes()).collect();
        let intensity = mono8(2, 1);

        let cloud = PointCloudConverter::default()
            .convert(&depth, &intensity, &intrinsics(100.0, 0.0, 0.0))
            .unwrap();
        let points: Vec<[f32; 4]> = xyzi_points(&cloud).unwrap().collect();
        assert_eq!(points[0], [0.0, 0.0, 0.0, 0.0]);
        assert_eq!(points[1][2], 1.0);
        assert_eq!(points[1][3], 10.0);

        let cloud = PointCloudConverter::new(5.0)
            .convert(&depth, &intensity, &intrinsics(100.0, 0.0, 0.0))
            .unwrap();
        let first = xyzi_points(&cloud).unwrap().next().unwrap();
        assert_eq!(first, [0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn sixteen_bit_and_float_intensity() {
        let depth = depth_m(1, 1, 1.0);
        let mut mono16 = Image::zeroed(header("i"), 1, 1, encodings::MONO16).unwrap();
        mono16.data = 40000u16.to_le_bytes().to_vec();
        let conv = PointCloudConverter::default();
        let cloud = conv.convert(&depth, &mono16, &intrinsics(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(xyzi_points(&cloud).unwrap().next().unwrap()[3], 40000.0);

        let float = depth_m(1, 1, 0.25);
        let cloud = conv.convert(&depth, &float, &intrinsics(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(xyzi_points(&cloud).unwrap().next().unwrap()[3], 0.25);
    }

    #[test]
    fn rejects_mismatched_grid_and_encoding() {
        let conv = PointCloudConverter::default();
        let depth = depth_m(2, 2, 1.0);
        assert!(matches!(
            conv.convert(&depth, &mono8(1, 1), &intrinsics(1.0, 0.0, 0.0)),
            Err(Error::InvalidFrame(_))
        ));
        let rgb = Image::zeroed(header("i"), 2, 2, encodings::RGB8).unwrap();
        assert!(matches!(
            conv.convert(&depth, &rgb, &intrinsics(1.0, 0.0, 0.0)),
            Err(Error::UnsupportedEncoding(_))
        ));
    }
}
