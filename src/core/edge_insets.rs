use crate::core::geo::{lerp, Point};
use serde::{Deserialize, Serialize};

/// Padding around the viewport in pixels. Shifts the effective center of the
/// map without changing the viewport size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeInsets {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

/// Partial padding update, unset sides keep their value when interpolating
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaddingOptions {
    pub top: Option<f64>,
    pub bottom: Option<f64>,
    pub left: Option<f64>,
    pub right: Option<f64>,
}

impl EdgeInsets {
    pub fn new(top: f64, bottom: f64, left: f64, right: f64) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /// Interpolates each side set in `target` from `start` toward it
    pub fn interpolate(&mut self, start: &EdgeInsets, target: &PaddingOptions, t: f64) {
        if let Some(top) = target.top {
            self.top = lerp(start.top, top, t);
        }
        if let Some(bottom) = target.bottom {
            self.bottom = lerp(start.bottom, bottom, t);
        }
        if let Some(left) = target.left {
            self.left = lerp(start.left, left, t);
        }
        if let Some(right) = target.right {
            self.right = lerp(start.right, right, t);
        }
    }

    /// Center of the padded viewport. Insets that overflow the viewport are
    /// clamped so the center always lies inside it.
    pub fn center(&self, width: f64, height: f64) -> Point {
        let x = ((self.left + width - self.right) / 2.0).clamp(0.0, width);
        let y = ((self.top + height - self.bottom) / 2.0).clamp(0.0, height);
        Point::new(x, y)
    }
}

impl From<EdgeInsets> for PaddingOptions {
    fn from(insets: EdgeInsets) -> Self {
        Self {
            top: Some(insets.top),
            bottom: Some(insets.bottom),
            left: Some(insets.left),
            right: Some(insets.right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_without_padding() {
        let insets = EdgeInsets::default();
        assert_eq!(insets.center(800.0, 600.0), Point::new(400.0, 300.0));
    }

    #[test]
    fn test_center_shifts_with_padding() {
        let insets = EdgeInsets::new(100.0, 0.0, 0.0, 200.0);
        assert_eq!(insets.center(800.0, 600.0), Point::new(300.0, 350.0));
    }

    #[test]
    fn test_overflowing_insets_are_clamped() {
        let insets = EdgeInsets::new(0.0, 0.0, 2000.0, 0.0);
        assert_eq!(insets.center(800.0, 600.0).x, 800.0);
    }

    #[test]
    fn test_interpolate_only_touches_given_sides() {
        let start = EdgeInsets::new(0.0, 0.0, 0.0, 0.0);
        let mut insets = EdgeInsets::new(5.0, 5.0, 5.0, 5.0);
        let target = PaddingOptions {
            top: Some(100.0),
            ..Default::default()
        };
        insets.interpolate(&start, &target, 0.5);
        assert_eq!(insets, EdgeInsets::new(50.0, 5.0, 5.0, 5.0));
    }
}
