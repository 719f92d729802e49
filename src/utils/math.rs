// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Math utilities

use nalgebra::{Point3, Vector3};

/// Off-midpoint blend used when probing a representative point on an edge,
/// so the probe does not land on another intersection.
pub const PROBE_BLEND: f64 = 0.50123456789;

/// Linear interpolation
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Linear interpolation between two points
pub fn lerp_point(a: &Point3<f64>, b: &Point3<f64>, t: f64) -> Point3<f64> {
    a + (b - a) * t
}

/// Lexicographic comparison of two points, used to make edge computations
/// independent of traversal direction.
pub fn lex_less(a: &Point3<f64>, b: &Point3<f64>) -> bool {
    (a.x, a.y, a.z) < (b.x, b.y, b.z)
}

/// Newell normal of a closed vertex loop; its length is twice the area.
pub fn newell_normal<'a, I>(points: I) -> Vector3<f64>
where
    I: IntoIterator<Item = &'a Point3<f64>>,
    I::IntoIter: Clone,
{
    let iter = points.into_iter();
    let mut next = iter.clone().cycle().skip(1);
    let mut normal = Vector3::zeros();
    for current in iter {
        let Some(following) = next.next() else {
            break;
        };
        normal.x += (current.y - following.y) * (current.z + following.z);
        normal.y += (current.z - following.z) * (current.x + following.x);
        normal.z += (current.x - following.x) * (current.y + following.y);
    }
    normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_lerp() {
        assert_eq!(lerp(0.0, 10.0, 0.5), 5.0);
        let p = lerp_point(&Point3::origin(), &Point3::new(2.0, 0.0, 0.0), 0.25);
        assert_eq!(p, Point3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_newell_normal_of_unit_square() {
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let n = newell_normal(square.iter());
        assert_relative_eq!(n.z, 2.0, epsilon = 1e-12);
        assert_relative_eq!(n.x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lex_less() {
        assert!(lex_less(&Point3::new(0.0, 5.0, 0.0), &Point3::new(1.0, 0.0, 0.0)));
        assert!(!lex_less(&Point3::new(1.0, 0.0, 0.0), &Point3::new(1.0, 0.0, 0.0)));
    }
}
