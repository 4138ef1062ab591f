use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3};
use std::f64::consts::PI;

const EULER_EPSILON: f64 = 1e-12;

pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle)
}

/// The rotation matrix `R = Rz(α) Ry(β) Rz(γ)`.
pub fn euler_zyz_to_matrix(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    let rz = |angle: f64| Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), beta);
    (rz(alpha) * ry * rz(gamma)).into_inner()
}

/// The z-y-z Euler angles `(α, β, γ)` of a rotation matrix, α and γ wrapped
/// into `[0, 2π)`. In the gimbal locked cases γ is fixed at zero.
pub fn matrix_to_euler_zyz(rotation: &Matrix3<f64>) -> Vector3<f64> {
    let beta = rotation[(2, 2)].clamp(-1.0, 1.0).acos();

    let (alpha, gamma) = if beta.sin().abs() > EULER_EPSILON {
        (
            rotation[(1, 2)].atan2(rotation[(0, 2)]),
            rotation[(2, 1)].atan2(-rotation[(2, 0)]),
        )
    } else if rotation[(2, 2)] > 0.0 {
        (rotation[(1, 0)].atan2(rotation[(0, 0)]), 0.0)
    } else {
        ((-rotation[(1, 0)]).atan2(-rotation[(0, 0)]), 0.0)
    };

    Vector3::new(wrap_angle(alpha), beta, wrap_angle(gamma))
}

/// Wraps an angle into `[0, 2π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped >= 2.0 * PI { 0.0 } else { wrapped }
}

pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Some(Point3::from(sum / points.len() as f64))
}

/// Applies `pos = R (pos - origin) + origin` in place.
pub fn rotate_about(points: &mut [Point3<f64>], rotation: &Matrix3<f64>, origin: &Point3<f64>) {
    for point in points.iter_mut() {
        *point = origin + rotation * (*point - origin);
    }
}
