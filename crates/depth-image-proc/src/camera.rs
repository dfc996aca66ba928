use frame_transport::CameraInfo;

/// Calibration block for one camera at one resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraIntrinsics {
    pub width: u32,
    pub height: u32,
    /// Intrinsic matrix, row-major 3x3.
    pub k: [f64; 9],
    /// Projection matrix, row-major 3x4.
    pub p: [f64; 12],
}

impl CameraIntrinsics {
    pub fn from_camera_info(info: &CameraInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            k: info.k,
            p: info.p,
        }
    }

    /// Copy rescaled by `ratio` for a frame of `width` x `height`.
    /// Focal lengths and principal point scale; `self` is left untouched.
    pub fn scaled(&self, ratio: f64, width: u32, height: u32) -> Self {
        let mut k = self.k;
        let mut p = self.p;
        for idx in [0, 2, 4, 5] {
            k[idx] *= ratio;
        }
        for idx in [0, 2, 5, 6] {
            p[idx] *= ratio;
        }
        Self {
            width,
            height,
            k,
            p,
        }
    }

    pub fn model(&self) -> PinholeCameraModel {
        PinholeCameraModel::from_intrinsics(self)
    }
}

/// Pinhole projection derived from the projection matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PinholeCameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// `P[3]`, i.e. `-fx * baseline` for the second camera of a rectified pair.
    pub tx: f64,
}

impl PinholeCameraModel {
    pub fn from_intrinsics(intr: &CameraIntrinsics) -> Self {
        Self {
            fx: intr.p[0],
            fy: intr.p[5],
            cx: intr.p[2],
            cy: intr.p[6],
            tx: intr.p[3],
        }
    }

    pub fn from_camera_info(info: &CameraInfo) -> Self {
        Self::from_intrinsics(&CameraIntrinsics::from_camera_info(info))
    }

    /// Baseline in meters (`-Tx / fx`).
    pub fn baseline(&self) -> f64 {
        -self.tx / self.fx
    }

    /// Back-project pixel `(u, v)` at `depth` meters into the camera frame.
    /// Non-finite depth propagates into the result.
    pub fn project(&self, u: f64, v: f64, depth: f64) -> (f64, f64, f64) {
        let x = (u - self.cx) * depth / self.fx;
        let y = (v - self.cy) * depth / self.fy;
        (x, y, depth)
    }
}
