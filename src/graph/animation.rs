//! Keyframe animations.

use crate::util::{Quat, Vec3};

/// How values are interpolated between keyframes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
    CubicSpline,
}

impl Interpolation {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Step),
            1 => Some(Self::Linear),
            2 => Some(Self::CubicSpline),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Step => 0,
            Self::Linear => 1,
            Self::CubicSpline => 2,
        }
    }
}

/// Time-stamped channel update. Absent channels keep their previous value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keyframe {
    /// Seconds from the start of the animation.
    pub timestamp: f32,
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Vec3>,
    /// Morph target weights.
    pub weights: Vec<f32>,
}

impl Keyframe {
    pub fn at(timestamp: f32) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    pub fn with_translation(mut self, t: Vec3) -> Self {
        self.translation = Some(t);
        self
    }

    pub fn with_rotation(mut self, r: Quat) -> Self {
        self.rotation = Some(r);
        self
    }

    pub fn with_scale(mut self, s: Vec3) -> Self {
        self.scale = Some(s);
        self
    }

    pub fn with_weights(mut self, weights: Vec<f32>) -> Self {
        self.weights = weights;
        self
    }
}

/// Ordered keyframe sequence targeting a model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Animation {
    pub name: String,
    /// Animated model index.
    pub model: Option<u32>,
    pub interpolation: Interpolation,
    pub keyframes: Vec<Keyframe>,
}

impl Animation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: u32) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn push_keyframe(&mut self, keyframe: Keyframe) {
        self.keyframes.push(keyframe);
    }

    /// Time of the last keyframe.
    pub fn duration(&self) -> f32 {
        self.keyframes.last().map(|k| k.timestamp).unwrap_or(0.0)
    }
}
