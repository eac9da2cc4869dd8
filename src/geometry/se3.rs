//! SE3: rigid body transformation (rotation + translation).

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

/// Rigid transform acting on points as `p' = R * p + t`.
///
/// Poses are stored with the `T_target_source` convention: a frame's world
/// pose is `T_w_c` (camera to world), a relative pose between two frames is
/// `T_cur_ref` (reference camera to current camera).
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from a rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix(&rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix `[R | t; 0 | 1]`.
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let rotation: Matrix3<f64> = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let translation: Vector3<f64> = mat.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_rt(rotation, translation)
    }

    /// Homogeneous 4x4 matrix `[R | t; 0 | 1]`.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation_matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
