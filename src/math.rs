//! Small 2D vector and affine transform types used across the pipeline.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A 2D point or vector
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn sqr_length(self) -> f32 {
        self.dot(self)
    }

    pub fn normalize(self) -> Vec2 {
        let len = self.length().max(1e-20);
        Vec2::new(self.x / len, self.y / len)
    }

    /// Counter-clockwise perpendicular
    pub fn perp_left(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    /// Clockwise perpendicular
    pub fn perp_right(self) -> Vec2 {
        Vec2::new(self.y, -self.x)
    }

    pub fn min(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn mix(self, other: Vec2, t: f32) -> Vec2 {
        self + (other - self) * t
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
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Mul<Vec2> for f32 {
    type Output = Vec2;
    fn mul(self, rhs: Vec2) -> Vec2 {
        rhs * self
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Column-major 2x3 affine transform: linear 2x2 part plus translation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat2x3 {
    pub x_axis: Vec2,
    pub y_axis: Vec2,
    pub origin: Vec2,
}

impl Mat2x3 {
    pub const IDENTITY: Mat2x3 = Mat2x3 {
        x_axis: Vec2 { x: 1.0, y: 0.0 },
        y_axis: Vec2 { x: 0.0, y: 1.0 },
        origin: Vec2 { x: 0.0, y: 0.0 },
    };

    pub fn new(x_axis: Vec2, y_axis: Vec2, origin: Vec2) -> Self {
        Self {
            x_axis,
            y_axis,
            origin,
        }
    }

    /// Apply the full affine transform to a point
    pub fn transform_point(&self, p: Vec2) -> Vec2 {
        self.x_axis * p.x + self.y_axis * p.y + self.origin
    }
}
