use crate::core::FeatureSet;

/// One display dimension derived from a feature set.
/// Nominally 0-100; values are not clamped.
pub trait Axis {
    fn name(&self) -> &'static str;
    fn evaluate(&self, features: &FeatureSet) -> f64;
}

/// All axes in display order.
pub fn default_axes() -> Vec<Box<dyn Axis + Send + Sync>> {
    vec![
        Box::new(VelocityAxis),
        Box::new(GeoRiskAxis),
        Box::new(DeviceAxis),
        Box::new(TimeAxis),
        Box::new(AmountAxis),
    ]
}

// --- Individual Axes ---

struct VelocityAxis;
impl Axis for VelocityAxis {
    fn name(&self) -> &'static str { "Velocity" }
    fn evaluate(&self, features: &FeatureSet) -> f64 {
        features.velocity * 10.0
    }
}

struct GeoRiskAxis;
impl Axis for GeoRiskAxis {
    fn name(&self) -> &'static str { "Geo Risk" }
    fn evaluate(&self, features: &FeatureSet) -> f64 {
        // 5000 distance units maps to 100
        features.geo_dist / 50.0
    }
}

struct DeviceAxis;
impl Axis for DeviceAxis {
    fn name(&self) -> &'static str { "Device" }
    fn evaluate(&self, features: &FeatureSet) -> f64 {
        if features.device_change { 85.0 } else { 20.0 }
    }
}

struct TimeAxis;
impl Axis for TimeAxis {
    fn name(&self) -> &'static str { "Time" }
    fn evaluate(&self, features: &FeatureSet) -> f64 {
        if features.unusual_time { 90.0 } else { 15.0 }
    }
}

struct AmountAxis;
impl Axis for AmountAxis {
    fn name(&self) -> &'static str { "Amount" }
    fn evaluate(&self, features: &FeatureSet) -> f64 {
        if features.amount_spike { 95.0 } else { 25.0 }
    }
}
