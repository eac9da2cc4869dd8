use nalgebra::{Matrix3, Point2, Vector3};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Build from a 3x3 camera matrix K.
    pub fn from_k(k: Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Project a camera-frame point. `None` behind the camera.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        ))
    }

    /// Back-project a pixel to the camera-frame point at depth `z`.
    pub fn unproject(&self, pt: &Point2<f64>, z: f64) -> Vector3<f64> {
        Vector3::new(
            (pt.x - self.cx) * z / self.fx,
            (pt.y - self.cy) * z / self.fy,
            z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_unproject() {
        let cam = CameraModel::new(458.0, 457.0, 367.0, 248.0);
        let pt = Point2::new(100.0, 300.0);
        let p = cam.unproject(&pt, 3.5);

        assert_relative_eq!(cam.project(&p).unwrap(), pt, epsilon = 1e-9);
        assert!(cam.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_from_k() {
        let cam = CameraModel::new(500.0, 510.0, 320.0, 240.0);
        assert_eq!(CameraModel::from_k(cam.k()), cam);
    }
}
