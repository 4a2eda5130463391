use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub initial: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid zoom bounds: {0}")]
pub struct InvalidZoomBounds(&'static str);

impl From<InvalidZoomBounds> for AppError {
    fn from(e: InvalidZoomBounds) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl ZoomBounds {
    pub fn new(min: f64, max: f64, step: f64, initial: f64) -> Result<Self, InvalidZoomBounds> {
        let bounds = Self {
            min,
            max,
            step,
            initial,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Fields are public, so anything deserialized or built by hand is checked here.
    pub fn validate(&self) -> Result<(), InvalidZoomBounds> {
        if ![self.min, self.max, self.step, self.initial]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(InvalidZoomBounds("all values must be finite"));
        }
        if self.min <= 0.0 {
            return Err(InvalidZoomBounds("min must be positive"));
        }
        if self.min > self.max {
            return Err(InvalidZoomBounds("min must not exceed max"));
        }
        if self.step <= 0.0 {
            return Err(InvalidZoomBounds("step must be positive"));
        }
        Ok(())
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 2.0,
            step: 0.25,
            initial: 1.0,
        }
    }
}

/// Current zoom factor, always inside its bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom {
    bounds: ZoomBounds,
    factor: f64,
}

impl Zoom {
    pub fn new(bounds: ZoomBounds) -> Result<Self, InvalidZoomBounds> {
        bounds.validate()?;
        Ok(Self {
            factor: bounds.initial.clamp(bounds.min, bounds.max),
            bounds,
        })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Returns false when already at the maximum.
    pub fn zoom_in(&mut self) -> bool {
        self.set(self.factor + self.bounds.step)
    }

    /// Returns false when already at the minimum.
    pub fn zoom_out(&mut self) -> bool {
        self.set(self.factor - self.bounds.step)
    }

    fn set(&mut self, target: f64) -> bool {
        let next = target.clamp(self.bounds.min, self.bounds.max);
        if (next - self.factor).abs() < f64::EPSILON {
            return false;
        }
        self.factor = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_zoom() -> Zoom {
        Zoom::new(ZoomBounds::default()).unwrap()
    }

    #[test]
    fn test_steps_up_to_max_then_stops() {
        let mut z = default_zoom();
        let mut seen = vec![];
        while z.zoom_in() {
            seen.push(z.factor());
        }
        assert_eq!(seen, [1.25, 1.5, 1.75, 2.0]);
        assert!(!z.zoom_in());
        assert_eq!(z.factor(), 2.0);
    }

    #[test]
    fn test_steps_down_to_min_then_stops() {
        let mut z = default_zoom();
        assert!(z.zoom_out());
        assert!(z.zoom_out());
        assert_eq!(z.factor(), 0.5);
        assert!(!z.zoom_out());
        assert_eq!(z.factor(), 0.5);
    }

    #[test]
    fn test_step_clamps_to_bound() {
        let mut z = Zoom::new(ZoomBounds::new(0.5, 1.1, 0.25, 1.0).unwrap()).unwrap();
        assert!(z.zoom_in());
        assert_eq!(z.factor(), 1.1);
        assert!(!z.zoom_in());
    }

    #[test]
    fn test_out_of_range_initial_is_clamped() {
        let z = Zoom::new(ZoomBounds {
            initial: 9.0,
            ..ZoomBounds::default()
        })
        .unwrap();
        assert_eq!(z.factor(), 2.0);
    }

    #[test]
    fn test_rejects_inverted_or_non_finite_bounds() {
        assert!(ZoomBounds::new(2.0, 0.5, 0.25, 1.0).is_err());
        assert!(ZoomBounds::new(f64::NAN, 2.0, 0.25, 1.0).is_err());
        assert!(ZoomBounds::new(0.5, f64::INFINITY, 0.25, 1.0).is_err());
        assert!(ZoomBounds::new(0.5, 2.0, 0.0, 1.0).is_err());
        assert!(ZoomBounds::new(0.0, 2.0, 0.25, 1.0).is_err());

        let inverted = ZoomBounds {
            min: 3.0,
            ..ZoomBounds::default()
        };
        assert_eq!(
            Zoom::new(inverted),
            Err(InvalidZoomBounds("min must not exceed max"))
        );
    }
}
