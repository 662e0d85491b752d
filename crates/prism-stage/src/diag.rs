use dashmap::DashMap;

/// Diagnostics graph: named gauges sampled by an external overlay.
///
/// The stage publishes a single metric, `produce-time`, normalized so that
/// 1.0 means twice the frame budget was spent producing a tick.
#[derive(Debug, Default)]
pub struct Graph {
    values: DashMap<String, f64>,
    colors: DashMap<String, [f32; 3]>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_color(&self, name: &str, rgb: [f32; 3]) {
        self.colors.insert(name.to_string(), rgb);
    }

    pub fn set_value(&self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|v| *v)
    }
}
