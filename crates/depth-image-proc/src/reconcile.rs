//! Bring a companion (intensity/color) frame onto the depth frame's pixel grid.

use crate::camera::CameraIntrinsics;
use crate::encoding::{check_layout, IntensityEncoding};
use crate::{Error, Result};
use frame_transport::{encodings, CameraInfo, Image};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};
use std::borrow::Cow;

/// Image resampling and color conversion primitives.
pub trait Resampler {
    /// Resize rows `[0, rows)` of `src` to `width` x `height`, keeping its encoding.
    fn resize(&self, src: &Image, rows: u32, width: u32, height: u32) -> Result<Image>;

    /// Convert `src` to single-byte intensity.
    fn to_mono8(&self, src: &Image) -> Result<Image>;
}

/// [`Resampler`] backed by the `image` crate (bilinear filtering, BT.601 luma).
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageResampler;

impl Resampler for ImageResampler {
    fn resize(&self, src: &Image, rows: u32, width: u32, height: u32) -> Result<Image> {
        let bpp = encodings::bytes_per_pixel(&src.encoding).ok_or_else(|| {
            Error::CompanionConversionFailed(format!("cannot resize {}", src.encoding))
        })?;
        check_layout(src, bpp)?;
        if rows == 0 || rows > src.height || width == 0 || height == 0 {
            return Err(Error::CompanionConversionFailed(format!(
                "bad resize {}x{} (rows {}) -> {}x{}",
                src.width, src.height, rows, width, height
            )));
        }
        let packed = packed_rows(src, rows, bpp);
        let be = src.is_bigendian;
        let data = match src.encoding.as_str() {
            encodings::MONO8 => resize_buffer::<Luma<u8>>(packed, src.width, rows, width, height)?,
            encodings::MONO16 | encodings::TYPE_16UC1 => {
                let samples = packed
                    .chunks_exact(2)
                    .map(|c| read_u16(c, be))
                    .collect();
                resize_buffer::<Luma<u16>>(samples, src.width, rows, width, height)?
                    .into_iter()
                    .flat_map(u16::to_le_bytes)
                    .collect()
            }
            encodings::TYPE_32FC1 => {
                let samples = packed
                    .chunks_exact(4)
                    .map(|c| read_f32(c, be))
                    .collect();
                resize_buffer::<Luma<f32>>(samples, src.width, rows, width, height)?
                    .into_iter()
                    .flat_map(f32::to_le_bytes)
                    .collect()
            }
            encodings::RGB8 | encodings::BGR8 => {
                resize_buffer::<Rgb<u8>>(packed, src.width, rows, width, height)?
            }
            encodings::RGBA8 | encodings::BGRA8 => {
                resize_buffer::<Rgba<u8>>(packed, src.width, rows, width, height)?
            }
            other => {
                return Err(Error::CompanionConversionFailed(format!(
                    "cannot resize {other}"
                )))
            }
        };
        Ok(Image {
            header: src.header.clone(),
            height,
            width,
            encoding: src.encoding.clone(),
            is_bigendian: false,
            step: width * bpp as u32,
            data,
        })
    }

    fn to_mono8(&self, src: &Image) -> Result<Image> {
        let bpp = encodings::bytes_per_pixel(&src.encoding).ok_or_else(|| {
            Error::CompanionConversionFailed(format!("[{}] to mono8", src.encoding))
        })?;
        check_layout(src, bpp)?;
        let luma: fn(&[u8], bool) -> u8 = match src.encoding.as_str() {
            encodings::MONO8 => |px: &[u8], _: bool| px[0],
            encodings::MONO16 | encodings::TYPE_16UC1 => {
                |px: &[u8], be: bool| (read_u16(px, be) >> 8) as u8
            }
            encodings::RGB8 | encodings::RGBA8 => |px: &[u8], _: bool| bt601(px[0], px[1], px[2]),
            encodings::BGR8 | encodings::BGRA8 => |px: &[u8], _: bool| bt601(px[2], px[1], px[0]),
            other => {
                return Err(Error::CompanionConversionFailed(format!(
                    "[{other}] to mono8"
                )))
            }
        };
        let mut data = Vec::with_capacity(src.width as usize * src.height as usize);
        for v in 0..src.height as usize {
            let start = v * src.step as usize;
            let row = &src.data[start..start + src.width as usize * bpp];
            data.extend(row.chunks_exact(bpp).map(|px| luma(px, src.is_bigendian)));
        }
        Ok(Image {
            header: src.header.clone(),
            height: src.height,
            width: src.width,
            encoding: encodings::MONO8.to_string(),
            is_bigendian: false,
            step: src.width,
            data,
        })
    }
}

/// Companion frame and intrinsics, both expressed at the depth frame's resolution.
#[derive(Debug)]
pub struct Reconciled<'a> {
    pub companion: Cow<'a, Image>,
    pub intrinsics: CameraIntrinsics,
}

/// Match `companion` and the calibration in `info` to `depth`'s resolution.
///
/// When sizes already agree the companion is borrowed as is. Otherwise the rows
/// implied by the width ratio are cropped, resized to the depth grid, and a scaled
/// copy of the intrinsics is returned; `info` is never modified. Encodings the point
/// cloud cannot read as intensity are converted to mono8 afterwards.
pub fn reconcile<'a, R: Resampler + ?Sized>(
    depth: &Image,
    companion: &'a Image,
    info: &CameraInfo,
    resampler: &R,
) -> Result<Reconciled<'a>> {
    let base = CameraIntrinsics::from_camera_info(info);
    let (companion, intrinsics) =
        if depth.width == companion.width && depth.height == companion.height {
            (Cow::Borrowed(companion), base)
        } else {
            if companion.width == 0 || depth.width == 0 {
                return Err(Error::CompanionConversionFailed(
                    "zero-width frame".to_string(),
                ));
            }
            let ratio = f64::from(depth.width) / f64::from(companion.width);
            let intrinsics = base.scaled(ratio, depth.width, depth.height);
            let rows = ((f64::from(depth.height) / ratio) as u32).min(companion.height);
            let resized = resampler
                .resize(companion, rows, depth.width, depth.height)
                .map_err(as_conversion_failure)?;
            (Cow::Owned(resized), intrinsics)
        };

    let companion = if IntensityEncoding::from_tag(&companion.encoding).is_ok() {
        companion
    } else {
        Cow::Owned(
            resampler
                .to_mono8(&companion)
                .map_err(as_conversion_failure)?,
        )
    };
    Ok(Reconciled {
        companion,
        intrinsics,
    })
}

fn as_conversion_failure(e: Error) -> Error {
    match e {
        Error::CompanionConversionFailed(_) => e,
        other => Error::CompanionConversionFailed(other.to_string()),
    }
}

fn resize_buffer<P>(
    samples: Vec<P::Subpixel>,
    width: u32,
    height: u32,
    out_width: u32,
    out_height: u32,
) -> Result<Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let buf: ImageBuffer<P, Vec<P::Subpixel>> = ImageBuffer::from_raw(width, height, samples)
        .ok_or_else(|| Error::CompanionConversionFailed("buffer too small".to_string()))?;
    Ok(imageops::resize(&buf, out_width, out_height, FilterType::Triangle).into_raw())
}

fn packed_rows(src: &Image, rows: u32, bpp: usize) -> Vec<u8> {
    let row_bytes = src.width as usize * bpp;
    let mut out = Vec::with_capacity(row_bytes * rows as usize);
    for v in 0..rows as usize {
        let start = v * src.step as usize;
        out.extend_from_slice(&src.data[start..start + row_bytes]);
    }
    out
}

fn bt601(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b))
        .round()
        .clamp(0.0, 255.0) as u8
}

fn read_u16(px: &[u8], big_endian: bool) -> u16 {
    if big_endian {
        u16::from_be_bytes([px[0], px[1]])
    } else {
        u16::from_le_bytes([px[0], px[1]])
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
    use frame_transport::Header;
    use time::OffsetDateTime;

    fn header() -> Header {
        Header::new(OffsetDateTime::UNIX_EPOCH, "cam")
    }

    fn info(width: u32, height: u32, fx: f64, cx: f64, cy: f64) -> CameraInfo {
        CameraInfo {
            header: header(),
            width,
            height,
            k: [fx, 0.0, cx, 0.0, fx, cy, 0.0, 0.0, 1.0],
            p: [fx, 0.0, cx, 0.0, 0.0, fx, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    fn mono8(width: u32, height: u32, value: u8) -> Image {
        let mut img = Image::zeroed(header(), width, height, encodings::MONO8).unwrap();
        img.data.iter_mut().for_each(|b| *b = value);
        img
    }

    #[test]
    fn same_size_borrows_and_keeps_calibration() {
        let depth = Image::zeroed(header(), 4, 2, encodings::TYPE_16UC1).unwrap();
        let companion = mono8(4, 2, 7);
        let cal = info(4, 2, 100.0, 2.0, 1.0);
        let out = reconcile(&depth, &companion, &cal, &ImageResampler).unwrap();
        assert!(matches!(out.companion, Cow::Borrowed(_)));
        assert_eq!(out.intrinsics, CameraIntrinsics::from_camera_info(&cal));
    }

    #[test]
    fn half_width_companion_doubles_focal_and_center() {
        let depth = Image::zeroed(header(), 8, 4, encodings::TYPE_16UC1).unwrap();
        let companion = mono8(4, 2, 9);
        let cal = info(4, 2, 100.0, 2.0, 1.0);
        let out = reconcile(&depth, &companion, &cal, &ImageResampler).unwrap();
        assert_eq!(out.intrinsics.k[0], 200.0);
        assert_eq!(out.intrinsics.k[2], 4.0);
        assert_eq!(out.intrinsics.p[0], 200.0);
        assert_eq!(out.intrinsics.p[2], 4.0);
        assert_eq!((out.intrinsics.width, out.intrinsics.height), (8, 4));
        // caller's calibration untouched
        assert_eq!(cal.k[0], 100.0);
        assert_eq!((out.companion.width, out.companion.height), (8, 4));
        assert_eq!(out.companion.encoding, encodings::MONO8);
        assert!(out.companion.data.iter().all(|&b| b == 9));
    }

    #[test]
    fn extra_rows_are_cropped() {
        // 4:3 depth against a 4x4 companion: only the first 3 rows survive.
        let depth = Image::zeroed(header(), 8, 6, encodings::TYPE_32FC1).unwrap();
        let mut companion = mono8(4, 4, 50);
        let last_row = 3 * companion.step as usize;
        companion.data[last_row..].iter_mut().for_each(|b| *b = 255);
        let cal = info(4, 4, 100.0, 2.0, 2.0);
        let out = reconcile(&depth, &companion, &cal, &ImageResampler).unwrap();
        assert_eq!((out.companion.width, out.companion.height), (8, 6));
        assert!(out.companion.data.iter().all(|&b| b == 50));
    }

    #[test]
    fn color_companion_becomes_mono8() {
        let depth = Image::zeroed(header(), 2, 1, encodings::TYPE_16UC1).unwrap();
        let mut companion = Image::zeroed(header(), 2, 1, encodings::BGR8).unwrap();
        companion.data = vec![0, 0, 255, 255, 255, 255];
        let cal = info(2, 1, 100.0, 1.0, 0.5);
        let out = reconcile(&depth, &companion, &cal, &ImageResampler).unwrap();
        assert_eq!(out.companion.encoding, encodings::MONO8);
        assert_eq!(out.companion.data, vec![76, 255]);
    }

    #[test]
    fn supported_intensity_is_not_normalized() {
        let depth = Image::zeroed(header(), 2, 2, encodings::TYPE_16UC1).unwrap();
        let companion = Image::zeroed(header(), 2, 2, encodings::TYPE_32FC1).unwrap();
        let cal = info(2, 2, 100.0, 1.0, 1.0);
        let out = reconcile(&depth, &companion, &cal, &ImageResampler).unwrap();
        assert_eq!(out.companion.encoding, encodings::TYPE_32FC1);
    }

    #[test]
    fn unknown_encoding_fails_conversion() {
        let depth = Image::zeroed(header(), 2, 2, encodings::TYPE_16UC1).unwrap();
        let mut companion = mono8(1, 1, 0);
        companion.encoding = "yuv422".to_string();
        let cal = info(1, 1, 100.0, 0.5, 0.5);
        assert!(matches!(
            reconcile(&depth, &companion, &cal, &ImageResampler),
            Err(Error::CompanionConversionFailed(_))
        ));
    }
}
