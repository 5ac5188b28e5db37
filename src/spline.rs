//! Arc-length parameterized rail curves.
//!
//! A [`RailSpline`] is a sampled polyline with a cumulative arc-length
//! table. Every query is by distance along the curve, which is the
//! coordinate the grinding systems track: position, tangent, up vector,
//! and the full orientation frame at a distance, plus the closest-distance
//! search used for rail entry and rail switching.

use bevy::prelude::*;

/// Scan step for the closest-distance search, in world units.
const SCAN_STEP: f32 = 1.0;
/// The search gives up below this step size.
const SCAN_TOLERANCE: f32 = 0.5;
/// Refinement budget for the closest-distance search.
const MAX_SCAN_ITERATIONS: usize = 32;

#[derive(Reflect, Debug, Clone)]
struct SplineSample {
    position: Vec3,
    /// Arc length from the start of the curve to this sample.
    cumulative: f32,
    /// Roll angle (radians) around the tangent at this sample.
    roll: f32,
}

/// A rail curve parameterized by distance along its length.
///
/// Built from an ordered list of points. A closed spline has an implicit
/// final segment back to the first point; distance queries on it wrap,
/// so the valid domain stays `[0, total_length]`.
#[derive(Reflect, Debug, Clone)]
pub struct RailSpline {
    samples: Vec<SplineSample>,
    total_length: f32,
    closed: bool,
}

impl Default for RailSpline {
    /// A degenerate empty spline. Queries return fallbacks and the
    /// distance searches return `None`.
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            total_length: 0.0,
            closed: false,
        }
    }
}

impl RailSpline {
    /// Build a spline from an ordered point list.
    ///
    /// Needs at least two points; with fewer, the spline is degenerate
    /// (zero length, every query returns the sole point or a default).
    pub fn new(points: impl IntoIterator<Item = Vec3>, closed: bool) -> Self {
        let points: Vec<Vec3> = points.into_iter().collect();
        let mut samples = Vec::with_capacity(points.len());
        let mut cumulative = 0.0;
        for (i, &position) in points.iter().enumerate() {
            if i > 0 {
                cumulative += position.distance(points[i - 1]);
            }
            samples.push(SplineSample {
                position,
                cumulative,
                roll: 0.0,
            });
        }
        let mut total_length = cumulative;
        if closed && points.len() >= 2 {
            total_length += points[points.len() - 1].distance(points[0]);
        }
        Self {
            samples,
            total_length,
            closed,
        }
    }

    /// Builder: set per-point roll angles (radians around the tangent).
    ///
    /// Extra values are ignored; missing values stay zero.
    pub fn with_rolls(mut self, rolls: impl IntoIterator<Item = f32>) -> Self {
        for (sample, roll) in self.samples.iter_mut().zip(rolls) {
            sample.roll = roll;
        }
        self
    }

    /// Total arc length of the curve.
    #[inline]
    pub fn total_length(&self) -> f32 {
        self.total_length
    }

    /// Whether the curve loops back onto its start.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Map a raw distance into the valid domain: wrap for closed curves,
    /// clamp for open ones.
    pub fn normalize_distance(&self, distance: f32) -> f32 {
        if self.total_length <= 0.0 {
            return 0.0;
        }
        if self.closed {
            distance.rem_euclid(self.total_length)
        } else {
            distance.clamp(0.0, self.total_length)
        }
    }

    /// Segment index and interpolation fraction for a (normalized) distance.
    fn locate(&self, distance: f32) -> Option<(usize, usize, f32)> {
        if self.samples.len() < 2 {
            return None;
        }
        let d = self.normalize_distance(distance);
        // Closing segment of a closed curve.
        let last = self.samples.len() - 1;
        if self.closed && d >= self.samples[last].cumulative {
            let seg_len = self.total_length - self.samples[last].cumulative;
            let t = if seg_len > 0.0 {
                (d - self.samples[last].cumulative) / seg_len
            } else {
                0.0
            };
            return Some((last, 0, t));
        }
        let idx = self
            .samples
            .partition_point(|s| s.cumulative <= d)
            .saturating_sub(1)
            .min(last - 1);
        let a = &self.samples[idx];
        let b = &self.samples[idx + 1];
        let seg_len = b.cumulative - a.cumulative;
        let t = if seg_len > 0.0 {
            (d - a.cumulative) / seg_len
        } else {
            0.0
        };
        Some((idx, idx + 1, t))
    }

    /// World position at a distance along the curve.
    pub fn location_at_distance(&self, distance: f32) -> Vec3 {
        match self.locate(distance) {
            Some((i, j, t)) => self.samples[i]
                .position
                .lerp(self.samples[j].position, t),
            None => self
                .samples
                .first()
                .map(|s| s.position)
                .unwrap_or(Vec3::ZERO),
        }
    }

    /// Unit tangent at a distance along the curve.
    ///
    /// Degenerate segments fall back to the world forward axis.
    pub fn tangent_at_distance(&self, distance: f32) -> Vec3 {
        match self.locate(distance) {
            Some((i, j, _)) => {
                let dir = self.samples[j].position - self.samples[i].position;
                let tangent = dir.normalize_or_zero();
                if tangent == Vec3::ZERO {
                    Vec3::NEG_Z
                } else {
                    tangent
                }
            }
            None => Vec3::NEG_Z,
        }
    }

    /// Up vector at a distance: world up rolled around the tangent,
    /// re-orthogonalized against it.
    pub fn up_at_distance(&self, distance: f32) -> Vec3 {
        let tangent = self.tangent_at_distance(distance);
        let roll = match self.locate(distance) {
            Some((i, j, t)) => self.samples[i].roll * (1.0 - t) + self.samples[j].roll * t,
            None => 0.0,
        };
        // Reference up, with a fallback when the rail runs vertical.
        let reference = if tangent.dot(Vec3::Y).abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let right = tangent.cross(reference).normalize_or_zero();
        let up = right.cross(tangent).normalize_or_zero();
        if roll.abs() > f32::EPSILON {
            Quat::from_axis_angle(tangent, roll) * up
        } else {
            up
        }
    }

    /// Full orientation frame at a distance: a rotation whose forward
    /// (-Z) is the tangent and whose +Y is the rail up.
    pub fn rotation_at_distance(&self, distance: f32) -> Quat {
        let tangent = self.tangent_at_distance(distance);
        let up = self.up_at_distance(distance);
        let right = tangent.cross(up).normalize_or_zero();
        if right == Vec3::ZERO {
            return Quat::IDENTITY;
        }
        let up = (-tangent).cross(right).normalize_or_zero();
        Quat::from_mat3(&Mat3::from_cols(right, up, -tangent))
    }

    /// Bounded linear scan: the first arc distance whose curve point lies
    /// within `tolerance` of `point`, stepping `step` units from the
    /// start. Returns `None` when the scan exhausts the curve length;
    /// the caller treats that as "no attachment".
    pub fn scan_distance_to(&self, point: Vec3, step: f32, tolerance: f32) -> Option<f32> {
        if self.samples.len() < 2 || self.total_length <= 0.0 || step <= 0.0 {
            return None;
        }
        let tolerance_sq = tolerance * tolerance;
        let mut d = 0.0;
        while d <= self.total_length {
            if self.location_at_distance(d).distance_squared(point) <= tolerance_sq {
                return Some(d);
            }
            d += step;
        }
        None
    }

    /// Arc distance of the point on the curve closest to `point`.
    ///
    /// Coarse 1-unit scan over the whole curve, then step-halving
    /// refinement around the best sample down to the 0.5-unit tolerance.
    /// Returns `None` for degenerate curves or when the refinement budget
    /// runs out before reaching tolerance.
    pub fn closest_distance_to(&self, point: Vec3) -> Option<f32> {
        if self.samples.len() < 2 || self.total_length <= 0.0 {
            return None;
        }

        let mut best_d = 0.0;
        let mut best_sq = f32::MAX;
        let mut d = 0.0;
        while d <= self.total_length {
            let sq = self.location_at_distance(d).distance_squared(point);
            if sq < best_sq {
                best_sq = sq;
                best_d = d;
            }
            d += SCAN_STEP;
        }

        let mut step = SCAN_STEP;
        let mut iterations = 0;
        while step > SCAN_TOLERANCE {
            if iterations >= MAX_SCAN_ITERATIONS {
                return None;
            }
            iterations += 1;
            step *= 0.5;
            for candidate in [best_d - step, best_d + step] {
                let c = self.normalize_distance(candidate);
                let sq = self.location_at_distance(c).distance_squared(point);
                if sq < best_sq {
                    best_sq = sq;
                    best_d = c;
                }
            }
        }
        Some(best_d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_rail() -> RailSpline {
        // 100 units along +X
        RailSpline::new([Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)], false)
    }

    fn square_loop() -> RailSpline {
        RailSpline::new(
            [
                Vec3::ZERO,
                Vec3::new(100.0, 0.0, 0.0),
                Vec3::new(100.0, 0.0, 100.0),
                Vec3::new(0.0, 0.0, 100.0),
            ],
            true,
        )
    }

    #[test]
    fn length_of_open_polyline() {
        let spline = straight_rail();
        assert_eq!(spline.total_length(), 100.0);
        assert!(!spline.is_closed());
    }

    #[test]
    fn closed_loop_includes_closing_segment() {
        let spline = square_loop();
        assert_eq!(spline.total_length(), 400.0);
        assert!(spline.is_closed());
    }

    #[test]
    fn location_interpolates_linearly() {
        let spline = straight_rail();
        let mid = spline.location_at_distance(50.0);
        assert!((mid - Vec3::new(50.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn open_curve_clamps_out_of_range_distance() {
        let spline = straight_rail();
        assert_eq!(spline.normalize_distance(-10.0), 0.0);
        assert_eq!(spline.normalize_distance(150.0), 100.0);
    }

    #[test]
    fn closed_curve_wraps_distance() {
        let spline = square_loop();
        assert!((spline.normalize_distance(450.0) - 50.0).abs() < 1e-4);
        assert!((spline.normalize_distance(-50.0) - 350.0).abs() < 1e-4);
        // The wrap stays inside [0, L].
        let d = spline.normalize_distance(401.0);
        assert!((0.0..=400.0).contains(&d));
    }

    #[test]
    fn closing_segment_location() {
        let spline = square_loop();
        // Distance 350 sits halfway along the implicit last edge.
        let p = spline.location_at_distance(350.0);
        assert!((p - Vec3::new(0.0, 0.0, 50.0)).length() < 1e-3);
    }

    #[test]
    fn tangent_follows_segment_direction() {
        let spline = straight_rail();
        let t = spline.tangent_at_distance(30.0);
        assert!((t - Vec3::X).length() < 1e-4);
    }

    #[test]
    fn up_is_orthogonal_to_tangent() {
        let spline = square_loop();
        for d in [10.0, 150.0, 250.0, 380.0] {
            let tangent = spline.tangent_at_distance(d);
            let up = spline.up_at_distance(d);
            assert!(tangent.dot(up).abs() < 1e-4, "at distance {d}");
            assert!((up.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn roll_rotates_up_around_tangent() {
        let spline = RailSpline::new([Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)], false)
            .with_rolls([std::f32::consts::PI, std::f32::consts::PI]);
        let up = spline.up_at_distance(50.0);
        assert!((up - Vec3::NEG_Y).length() < 1e-4);
    }

    #[test]
    fn rotation_frame_matches_tangent_and_up() {
        let spline = straight_rail();
        let rotation = spline.rotation_at_distance(50.0);
        let forward = rotation * Vec3::NEG_Z;
        let up = rotation * Vec3::Y;
        assert!((forward - Vec3::X).length() < 1e-4);
        assert!((up - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn scan_finds_first_distance_within_tolerance() {
        let spline = straight_rail();
        // Point on the curve at distance 42.
        let d = spline
            .scan_distance_to(Vec3::new(42.0, 0.0, 0.0), 1.0, 0.5)
            .unwrap();
        assert!((d - 42.0).abs() <= 0.5 + 1e-4);
    }

    #[test]
    fn scan_exhaustion_returns_none() {
        let spline = straight_rail();
        // Point 10 units off the curve never meets a 0.5 tolerance.
        assert!(spline
            .scan_distance_to(Vec3::new(50.0, 10.0, 0.0), 1.0, 0.5)
            .is_none());
    }

    #[test]
    fn closest_distance_on_straight_rail() {
        let spline = straight_rail();
        let d = spline.closest_distance_to(Vec3::new(37.2, 25.0, 3.0)).unwrap();
        assert!((d - 37.2).abs() <= 0.5 + 1e-4);
    }

    #[test]
    fn closest_distance_on_loop() {
        let spline = square_loop();
        // Near the middle of the third edge.
        let d = spline
            .closest_distance_to(Vec3::new(50.0, 10.0, 110.0))
            .unwrap();
        assert!((d - 250.0).abs() <= 1.0, "got {d}");
    }

    #[test]
    fn degenerate_spline_returns_none() {
        let spline = RailSpline::new([Vec3::ZERO], false);
        assert!(spline.closest_distance_to(Vec3::ONE).is_none());
        assert_eq!(spline.total_length(), 0.0);
    }

    #[test]
    fn vertical_rail_has_valid_frame() {
        let spline = RailSpline::new([Vec3::ZERO, Vec3::new(0.0, 100.0, 0.0)], false);
        let up = spline.up_at_distance(50.0);
        assert!((up.length() - 1.0).abs() < 1e-4);
        assert!(up.dot(Vec3::Y).abs() < 1e-4);
    }
}
