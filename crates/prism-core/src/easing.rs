use serde::{Deserialize, Serialize};

use crate::error::{PrismError, PrismResult};

/// Easing curve for transform interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Easing {
    Linear,
    QuadIn,
    QuadOut,
    QuadInOut,
    CubicIn,
    CubicOut,
    CubicInOut,
    QuartIn,
    QuartOut,
    QuartInOut,
    SineIn,
    SineOut,
    SineInOut,
    ExpoIn,
    ExpoOut,
    ExpoInOut,
}

impl Default for Easing {
    fn default() -> Self {
        Easing::Linear
    }
}

impl Easing {
    /// Apply the easing function to a normalized time value t in [0, 1].
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => t * (2.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::CubicIn => t * t * t,
            Easing::CubicOut => {
                let t1 = t - 1.0;
                t1 * t1 * t1 + 1.0
            }
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    let t1 = 2.0 * t - 2.0;
                    0.5 * t1 * t1 * t1 + 1.0
                }
            }
            Easing::QuartIn => t * t * t * t,
            Easing::QuartOut => {
                let t1 = t - 1.0;
                1.0 - t1 * t1 * t1 * t1
            }
            Easing::QuartInOut => {
                if t < 0.5 {
                    8.0 * t * t * t * t
                } else {
                    let t1 = t - 1.0;
                    1.0 - 8.0 * t1 * t1 * t1 * t1
                }
            }
            Easing::SineIn => 1.0 - (t * std::f64::consts::FRAC_PI_2).cos(),
            Easing::SineOut => (t * std::f64::consts::FRAC_PI_2).sin(),
            Easing::SineInOut => 0.5 * (1.0 - (t * std::f64::consts::PI).cos()),
            Easing::ExpoIn => {
                if t == 0.0 {
                    0.0
                } else {
                    2f64.powf(10.0 * (t - 1.0))
                }
            }
            Easing::ExpoOut => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2f64.powf(-10.0 * t)
                }
            }
            Easing::ExpoInOut => {
                if t == 0.0 || t == 1.0 {
                    t
                } else if t < 0.5 {
                    0.5 * 2f64.powf(20.0 * t - 10.0)
                } else {
                    1.0 - 0.5 * 2f64.powf(-20.0 * t + 10.0)
                }
            }
        }
    }

    /// Look up a curve by its command-layer name ("linear", "easeinquad",
    /// "easeoutcubic", ...). This is the only place an unknown curve can
    /// surface; a constructed `Easing` is always valid.
    pub fn from_name(name: &str) -> PrismResult<Easing> {
        match name.to_ascii_lowercase().as_str() {
            "linear" => Ok(Easing::Linear),
            "easeinquad" => Ok(Easing::QuadIn),
            "easeoutquad" => Ok(Easing::QuadOut),
            "easeinoutquad" => Ok(Easing::QuadInOut),
            "easeincubic" => Ok(Easing::CubicIn),
            "easeoutcubic" => Ok(Easing::CubicOut),
            "easeinoutcubic" => Ok(Easing::CubicInOut),
            "easeinquart" => Ok(Easing::QuartIn),
            "easeoutquart" => Ok(Easing::QuartOut),
            "easeinoutquart" => Ok(Easing::QuartInOut),
            "easeinsine" => Ok(Easing::SineIn),
            "easeoutsine" => Ok(Easing::SineOut),
            "easeinoutsine" => Ok(Easing::SineInOut),
            "easeinexpo" => Ok(Easing::ExpoIn),
            "easeoutexpo" => Ok(Easing::ExpoOut),
            "easeinoutexpo" => Ok(Easing::ExpoInOut),
            other => Err(PrismError::invalid_arg(format!("unknown easing {other:?}"))),
        }
    }
}

impl std::str::FromStr for Easing {
    type Err = PrismError;

    fn from_str(s: &str) -> PrismResult<Self> {
        Easing::from_name(s)
    }
}
