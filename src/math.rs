//! Spatial algebra: 4x4 homogeneous transforms and quantized distances.
//!
//! All tolerances of the core live here. Transform comparisons use an
//! absolute per-component tolerance of `1/PRECISION`; distances are snapped
//! to the same grid so that exact comparisons ("unit distance between dock
//! centers") survive floating point noise. Joint angles compare within
//! [`ANGLE_EPS`] degrees.

use nalgebra::{Matrix4, Rotation3, Unit, Vector3, Vector4};

pub type Matrix = Matrix4<f64>;
pub type Vector = Vector4<f64>;

/// Distance quantization grid (units of `1/PRECISION`).
pub const PRECISION: f64 = 1000.0;

/// Tolerance for joint-angle comparisons, in degrees.
pub const ANGLE_EPS: f64 = 1e-4;

pub fn identity() -> Matrix {
    Matrix::identity()
}

/// Rotation by `angle` radians around an arbitrary axis (normalized here).
pub fn rotate(angle: f64, axis: Vector3<f64>) -> Matrix {
    Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle).to_homogeneous()
}

pub fn rotate_x(angle: f64) -> Matrix {
    rotate(angle, Vector3::x())
}

pub fn rotate_y(angle: f64) -> Matrix {
    rotate(angle, Vector3::y())
}

pub fn rotate_z(angle: f64) -> Matrix {
    rotate(angle, Vector3::z())
}

pub fn translate(v: Vector3<f64>) -> Matrix {
    Matrix::new_translation(&v)
}

/// Translation along +Z (the module unit length).
pub fn translate_z(units: f64) -> Matrix {
    translate(Vector3::new(0.0, 0.0, units))
}

/// Per-component absolute comparison at `1/PRECISION`.
pub fn approx_eq(a: &Matrix, b: &Matrix) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= 1.0 / PRECISION)
}

pub fn approx_eq_vec(a: &Vector, b: &Vector) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= 1.0 / PRECISION)
}

pub fn quantize(val: f64) -> f64 {
    (val * PRECISION).round() / PRECISION
}

pub fn column(m: &Matrix, col: usize) -> Vector {
    m.column(col).into_owned()
}

/// The translation column of a transform: the shoe center in world space.
pub fn center(m: &Matrix) -> Vector {
    column(m, 3)
}

/// Euclidean distance, snapped to the quantization grid.
pub fn distance(a: &Vector, b: &Vector) -> f64 {
    quantize((a - b).norm())
}

/// Squared Euclidean distance, snapped to the quantization grid.
pub fn sq_distance(a: &Vector, b: &Vector) -> f64 {
    quantize((a - b).norm_squared())
}

pub fn center_distance(a: &Matrix, b: &Matrix) -> f64 {
    distance(&center(a), &center(b))
}

pub fn center_sq_distance(a: &Matrix, b: &Matrix) -> f64 {
    sq_distance(&center(a), &center(b))
}

/// Sum of per-column quantized distances between two transforms.
pub fn matrix_distance(a: &Matrix, b: &Matrix) -> f64 {
    (0..4).map(|c| distance(&column(a, c), &column(b, c))).sum()
}

/// Sum of per-column quantized squared distances between two transforms.
pub fn sq_matrix_distance(a: &Matrix, b: &Matrix) -> f64 {
    (0..4).map(|c| sq_distance(&column(a, c), &column(b, c))).sum()
}

pub fn dist_to_point(m: &Matrix, p: &Vector) -> f64 {
    distance(&center(m), p)
}

pub fn sq_dist_to_point(m: &Matrix, p: &Vector) -> f64 {
    sq_distance(&center(m), p)
}

/// Taxicab distance between two transform centers, rounded to lattice steps.
pub fn manhattan_center_distance(a: &Matrix, b: &Matrix) -> u32 {
    let d = center(a) - center(b);
    (d[0].abs() + d[1].abs() + d[2].abs()).round() as u32
}

/// Relative pose of side B with respect to side A of one module.
///
/// Angles are radians; joint values stored in degrees are converted by the
/// caller.
pub fn transform_joint(alpha: f64, beta: f64, gamma: f64) -> Matrix {
    rotate_x(alpha)
        * rotate_z(gamma)
        * translate_z(1.0)
        * rotate_y(std::f64::consts::PI)
        * rotate_x(-beta)
}

#[cfg(test)]
mod tests {
    use assertables::{assert_in_delta, assert_lt};

    use super::*;

    #[test]
    fn rotation_preserves_center() {
        let m = rotate_z(std::f64::consts::FRAC_PI_2);
        assert_in_delta!(center(&m)[0], 0.0, 1e-12);
        assert_in_delta!(center(&m)[3], 1.0, 1e-12);
    }

    #[test]
    fn distance_is_quantized() {
        let a = Vector::new(0.0, 0.0, 0.0, 1.0);
        let b = Vector::new(1.0 + 1e-7, 0.0, 0.0, 1.0);
        assert_eq!(distance(&a, &b), 1.0);
        assert_eq!(sq_distance(&a, &b), 1.0);
    }

    #[test]
    fn approx_eq_tolerance() {
        let a = identity();
        let mut b = identity();
        b[(1, 2)] += 0.0005;
        assert!(approx_eq(&a, &b));
        b[(1, 2)] += 0.002;
        assert!(!approx_eq(&a, &b));
    }

    #[test]
    fn joint_transform_moves_one_unit() {
        // With all joints at zero the far shoe sits one unit along +Z,
        // whatever the flip does to its orientation.
        let m = transform_joint(0.0, 0.0, 0.0);
        let c = center(&m);
        assert_in_delta!(c[2], 1.0, 1e-12);
        assert_lt!(c[0].abs() + c[1].abs(), 1e-12);
    }
}
