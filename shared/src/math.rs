//! Planar vector math and angle helpers shared by the simulation and the buffers.

use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Represents a vector in 2D world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    /// Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    /// Value along the y-axis.
    /// Positive direction is up.
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(self) -> Vec2 {
        let mag = self.length();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / mag, self.y / mag)
        }
    }

    /// Returns the scaled vector.
    pub fn scale(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product of two planar vectors.
    pub fn cross(self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    pub fn distance_squared(self, other: Vec2) -> f32 {
        (other - self).length_squared()
    }

    /// Rotates counter-clockwise about the origin by `angle` radians.
    pub fn rotate(self, angle: f32) -> Vec2 {
        let (sin, cos) = angle.sin_cos();
        Vec2::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        self + (other - self).scale(t)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f32) -> Vec2 {
        self.scale(rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Wraps an angle into the canonical range `(-PI, PI]`.
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Signed shortest angular distance from `from` to `to`.
pub fn angle_delta(from: f32, to: f32) -> f32 {
    normalize_angle(to - from)
}

/// Blends two angles along the shortest arc, wrapping across the +-PI seam.
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    normalize_angle(from + angle_delta(from, to) * t)
}
