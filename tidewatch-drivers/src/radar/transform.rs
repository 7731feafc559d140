//! Measurement transforms
//!
//! A transform turns the radar distance (and an optional auxiliary
//! reading supplied by the host) into the value that gets published.
//! Returning `None` suppresses publication for that cycle.

/// Strategy applied to every decoded distance before publication
pub trait MeasurementTransform {
    fn apply(&self, radar_mm: f32, aux: Option<f32>) -> Option<f32>;
}

/// Publish the radar distance unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl MeasurementTransform for Passthrough {
    fn apply(&self, radar_mm: f32, _aux: Option<f32>) -> Option<f32> {
        Some(radar_mm)
    }
}

/// Depth of liquid below a sensor mounted at a known height
///
/// `installation_height - distance`, floored at zero.
#[derive(Debug, Clone, Copy)]
pub struct DepthBelowMount {
    pub installation_height_mm: f32,
}

impl MeasurementTransform for DepthBelowMount {
    fn apply(&self, radar_mm: f32, _aux: Option<f32>) -> Option<f32> {
        Some((self.installation_height_mm - radar_mm).max(0.0))
    }
}

/// Site calibration: auxiliary reading plus a fixed offset
///
/// Falls back to the radar distance when no auxiliary value is set.
#[derive(Debug, Clone, Copy)]
pub struct AuxOffset {
    pub offset_mm: f32,
}

impl MeasurementTransform for AuxOffset {
    fn apply(&self, radar_mm: f32, aux: Option<f32>) -> Option<f32> {
        match aux {
            Some(aux) => Some(aux + self.offset_mm),
            None => Some(radar_mm),
        }
    }
}

impl<F> MeasurementTransform for F
where
    F: Fn(f32, Option<f32>) -> Option<f32>,
{
    fn apply(&self, radar_mm: f32, aux: Option<f32>) -> Option<f32> {
        self(radar_mm, aux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        assert_eq!(Passthrough.apply(3500.0, Some(1.0)), Some(3500.0));
    }

    #[test]
    fn test_depth_below_mount() {
        let t = DepthBelowMount {
            installation_height_mm: 2000.0,
        };
        assert_eq!(t.apply(1500.0, None), Some(500.0));
        // Surface reported below the floor
        assert_eq!(t.apply(2100.0, None), Some(0.0));
    }

    #[test]
    fn test_aux_offset() {
        let t = AuxOffset { offset_mm: -25.0 };
        assert_eq!(t.apply(3500.0, Some(1200.0)), Some(1175.0));
        assert_eq!(t.apply(3500.0, None), Some(3500.0));
    }

    #[test]
    fn test_closure() {
        let t = |radar: f32, aux: Option<f32>| aux.map(|a| a - radar);
        assert_eq!(t.apply(100.0, Some(400.0)), Some(300.0));
        assert_eq!(t.apply(100.0, None), None);
    }
}
