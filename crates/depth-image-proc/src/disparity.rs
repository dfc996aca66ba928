use crate::camera::PinholeCameraModel;
use crate::encoding::{check_layout, pixel, DepthEncoding};
use crate::Result;
use frame_transport::{encodings, CameraInfo, DisparityImage, Image};

/// Range bounds and quantization reported with every disparity image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisparityParams {
    pub min_range: f64,
    pub max_range: f64,
    pub delta_d: f64,
}

impl Default for DisparityParams {
    fn default() -> Self {
        Self {
            min_range: 0.0,
            max_range: f64::INFINITY,
            delta_d: 0.125,
        }
    }
}

/// Depth image to disparity image, `d = f * t / Z`.
#[derive(Clone, Debug, Default)]
pub struct DisparityConverter {
    params: DisparityParams,
}

impl DisparityConverter {
    pub fn new(params: DisparityParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DisparityParams {
        &self.params
    }

    /// Convert using focal length and baseline taken from `info`'s projection matrix.
    pub fn convert(&self, depth: &Image, info: &CameraInfo) -> Result<DisparityImage> {
        let model = PinholeCameraModel::from_camera_info(info);
        self.convert_with(depth, model.fx as f32, model.baseline() as f32)
    }

    /// Convert with explicit focal length `f` (pixels) and baseline `t` (meters).
    pub fn convert_with(&self, depth: &Image, f: f32, t: f32) -> Result<DisparityImage> {
        let encoding = DepthEncoding::from_tag(&depth.encoding)?;
        let bpp = encoding.bytes_per_pixel();
        check_layout(depth, bpp)?;

        let width = depth.width as usize;
        let height = depth.height as usize;
        // Divide raw samples directly; the unit scale is folded into the constant.
        let constant = f * t / encoding.to_meters(1.0);
        let mut values = vec![0.0f32; width * height];
        for v in 0..height {
            for u in 0..width {
                let raw = encoding.sample(pixel(depth, u, v, bpp), depth.is_bigendian);
                if let Some(raw) = raw.valid_raw() {
                    values[v * width + u] = constant / raw;
                }
            }
        }

        let fxt = f64::from(f) * f64::from(t);
        Ok(DisparityImage {
            header: depth.header.clone(),
            image: Image {
                header: depth.header.clone(),
                height: depth.height,
                width: depth.width,
                encoding: encodings::TYPE_32FC1.to_string(),
                is_bigendian: false,
                step: depth.width * 4,
                data: values.into_iter().flat_map(f32::to_le_bytes).collect(),
            },
            f,
            t,
            min_disparity: (fxt / self.params.max_range) as f32,
            max_disparity: (fxt / self.params.min_range) as f32,
            delta_d: self.params.delta_d as f32,
        })
    }
}

/// Read pixel `(u, v)` of a 32FC1 disparity image.
pub fn disparity_at(img: &DisparityImage, u: u32, v: u32) -> Option<f32> {
    if u >= img.image.width || v >= img.image.height {
        return None;
    }
    let start = v as usize * img.image.step as usize + u as usize * 4;
    let b = img.image.data.get(start..start + 4)?;
    Some(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use frame_transport::Header;
    use time::OffsetDateTime;

    fn header() -> Header {
        Header::new(OffsetDateTime::UNIX_EPOCH, "depth_optical")
    }

    fn depth_mm(samples: &[u16], width: u32) -> Image {
        let height = samples.len() as u32 / width;
        Image {
            header: header(),
            height,
            width,
            encoding: encodings::TYPE_16UC1.to_string(),
            is_bigendian: false,
            step: width * 2,
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }

    fn depth_m(samples: &[f32], width: u32) -> Image {
        let height = samples.len() as u32 / width;
        Image {
            header: header(),
            height,
            width,
            encoding: encodings::TYPE_32FC1.to_string(),
            is_bigendian: false,
            step: width * 4,
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }

    fn info(f: f64, t: f64) -> CameraInfo {
        CameraInfo {
            header: header(),
            width: 2,
            height: 2,
            k: [f, 0.0, 1.0, 0.0, f, 1.0, 0.0, 0.0, 1.0],
            p: [f, 0.0, 1.0, -f * t, 0.0, f, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    #[test]
    fn float_depth_gives_ft_over_z() {
        let conv = DisparityConverter::default();
        let out = conv
            .convert(&depth_m(&[2.0, 1.0, 4.0, 0.5], 2), &info(525.0, 0.1))
            .unwrap();
        assert!((out.f - 525.0).abs() < 1e-4);
        assert!((out.t - 0.1).abs() < 1e-6);
        assert!((disparity_at(&out, 0, 0).unwrap() - 26.25).abs() < 1e-4);
        assert!((disparity_at(&out, 1, 0).unwrap() - 52.5).abs() < 1e-4);
        assert!((disparity_at(&out, 1, 1).unwrap() - 105.0).abs() < 1e-3);
        assert_eq!(out.header, header());
        assert_eq!(out.image.encoding, encodings::TYPE_32FC1);
    }

    #[test]
    fn millimeter_depth_matches_meters() {
        let conv = DisparityConverter::default();
        let out = conv.convert_with(&depth_mm(&[2000, 1500], 2), 525.0, 0.1).unwrap();
        assert!((disparity_at(&out, 0, 0).unwrap() - 26.25).abs() < 1e-3);
        assert!((disparity_at(&out, 1, 0).unwrap() - 35.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_depth_is_zero() {
        let conv = DisparityConverter::default();
        let out = conv
            .convert_with(&depth_m(&[f32::NAN, f32::INFINITY, 0.0, -1.0], 2), 525.0, 0.1)
            .unwrap();
        for (u, v) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(disparity_at(&out, u, v), Some(0.0));
        }
        let out = conv.convert_with(&depth_mm(&[0, 0], 2), 525.0, 0.1).unwrap();
        assert_eq!(disparity_at(&out, 0, 0), Some(0.0));
    }

    #[test]
    fn range_bounds() {
        let out = DisparityConverter::default()
            .convert_with(&depth_m(&[1.0], 1), 525.0, 0.1)
            .unwrap();
        assert_eq!(out.min_disparity, 0.0);
        assert!(out.max_disparity.is_infinite());
        assert_eq!(out.delta_d, 0.125);

        let conv = DisparityConverter::new(DisparityParams {
            min_range: 0.5,
            max_range: 10.0,
            delta_d: 0.0625,
        });
        let out = conv.convert_with(&depth_m(&[1.0], 1), 525.0, 0.1).unwrap();
        assert!((out.min_disparity - 5.25).abs() < 1e-4);
        assert!((out.max_disparity - 105.0).abs() < 1e-3);
        assert_eq!(out.delta_d, 0.0625);
    }

    #[test]
    fn padded_rows_are_skipped() {
        let mut img = depth_m(&[2.0, 2.0], 1);
        // two floats per row, second is padding
        img.step = 8;
        img.data = [2.0f32, 99.0, 4.0, 99.0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let out = DisparityConverter::default().convert_with(&img, 525.0, 0.1).unwrap();
        assert!((disparity_at(&out, 0, 1).unwrap() - 13.125).abs() < 1e-4);
    }

    #[test]
    fn rejects_unsupported_and_short_frames() {
        let conv = DisparityConverter::default();
        let mut img = depth_m(&[1.0], 1);
        img.encoding = "rgb8".into();
        assert!(matches!(
            conv.convert_with(&img, 1.0, 1.0),
            Err(Error::UnsupportedEncoding(_))
        ));
        let mut img = depth_m(&[1.0, 1.0], 1);
        img.data.truncate(4);
        assert!(matches!(
            conv.convert_with(&img, 1.0, 1.0),
            Err(Error::InvalidFrame(_))
        ));
    }
}
