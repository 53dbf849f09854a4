//! Local parabola frames for exact point-to-curve distance.
//!
//! Every outline segment, straight or curved, is expressed as a span of the
//! canonical parabola `y = x^2` in a local frame. The fragment stage then
//! solves one cubic for the nearest point regardless of segment kind.

use crate::math::{Mat2x3, Vec2};

/// Classification of a quadratic Bezier by the angle at its control point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QbezType {
    /// Proper curved segment
    Parabola,
    /// Control point collinear with the endpoints
    Line,
    /// Cusp-like: both endpoints on the same side of the control point
    TwoLines,
}

/// `np10 = normalize(p0 - p1)`, `np12 = normalize(p2 - p1)`.
/// The 1e-6 thresholds keep the distance shader stable near cusps; do not
/// tighten them without re-checking the degenerate cases.
pub fn qbez_type(np10: Vec2, np12: Vec2) -> QbezType {
    let d = np10.dot(np12);
    let dmax = 1.0 - 1e-6;
    if d >= dmax {
        QbezType::TwoLines
    } else if d <= -dmax {
        QbezType::Line
    } else {
        QbezType::Parabola
    }
}

/// A parabola segment: local frame (scale kept separate), plus the sorted
/// x-range `[xstart, xend]` the segment occupies on `y = x^2`.
#[derive(Clone, Copy, Debug)]
pub struct Parabola {
    pub mat: Mat2x3,
    pub scale: f32,
    pub xstart: f32,
    pub xend: f32,
}

impl Parabola {
    /// A straight segment as a negligibly curved parabola, so the same
    /// shader path handles lines without branching.
    pub fn from_line(p0: Vec2, p2: Vec2) -> Parabola {
        let precision = 1e-16f32;

        let center = p0.mix(p2, 0.5);
        let x_axis = (p2 - p0).normalize();
        let ldir = (p2 - p0).length();
        let y_axis = x_axis.perp_left();
        let vertex = center + y_axis * (ldir * precision);
        let xlen = precision.sqrt();

        Parabola {
            mat: Mat2x3::new(x_axis, y_axis, vertex),
            scale: 0.5 * ldir / xlen,
            xstart: -xlen,
            xend: xlen,
        }
    }

    /// Frame of the parabola containing the quadratic Bezier `p0, p1, p2`.
    /// Requires a proper curve (classified [`QbezType::Parabola`]).
    pub fn from_qbez(p0: Vec2, p1: Vec2, p2: Vec2) -> Parabola {
        let center = p0.mix(p2, 0.5);
        let y_axis = (center - p1).normalize();
        let x_axis = y_axis.perp_right();

        let p01 = (p1 - p0).normalize();
        let p12 = (p2 - p1).normalize();
        let cx0 = x_axis.dot(p01);
        let sx0 = y_axis.dot(p01);
        let cx2 = x_axis.dot(p12);
        let sx2 = y_axis.dot(p12);

        // Tangent slopes give the segment endpoints on y = x^2
        let x0 = sx0 / cx0 * 0.5;
        let x2 = sx2 / cx2 * 0.5;
        let y0 = x0 * x0;

        let p02x = (p2 - p0).dot(x_axis);
        let scale = p02x / (x2 - x0);

        let vertex = p0 - y_axis * (y0 * scale) - x_axis * (x0 * scale);

        Parabola {
            mat: Mat2x3::new(x_axis, y_axis, vertex),
            scale,
            xstart: x0.min(x2),
            xend: x0.max(x2),
        }
    }

    /// World position of the parabola point at local x
    pub fn pos(&self, x: f32) -> Vec2 {
        self.mat.origin + self.mat.x_axis * (self.scale * x) + self.mat.y_axis * (self.scale * x * x)
    }

    /// Map a world position into the parabola's local frame
    pub fn world_to_par(&self, pos: Vec2) -> Vec2 {
        let inv_scale = 1.0 / self.scale;
        let d = pos - self.mat.origin;
        Vec2::new(inv_scale * d.dot(self.mat.x_axis), inv_scale * d.dot(self.mat.y_axis))
    }
}
