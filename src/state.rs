use crate::config::EncoderConfig;
use crate::data::{Frame, Telemetry};
use crate::error::{Result, TrainError};

/// Maps a continuous value onto one of `boundaries.len()` ordered slots.
///
/// The value is clipped into `[first, last]` and lands in the slot just left
/// of the first boundary strictly greater than it. A value equal to the last
/// boundary has no greater boundary and saturates into the final slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucketizer {
    boundaries: Vec<f64>,
}

impl Bucketizer {
    pub fn new(boundaries: Vec<f64>) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(TrainError::InputValidation(
                "a bucketizer needs at least two boundaries".to_string(),
            ));
        }
        if boundaries.iter().any(|b| !b.is_finite()) || boundaries.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(TrainError::InputValidation(format!(
                "bucket boundaries must be finite and strictly increasing: {boundaries:?}"
            )));
        }
        Ok(Self { boundaries })
    }

    /// `count` evenly spaced boundaries from `min` to `max` inclusive.
    pub fn linspace(min: f64, max: f64, count: usize) -> Result<Self> {
        if count < 2 {
            return Self::new(vec![min]);
        }
        let step = (max - min) / (count - 1) as f64;
        let mut boundaries: Vec<f64> = (0..count).map(|i| min + step * i as f64).collect();
        // pin the endpoint so clipping to `max` hits the boundary exactly
        boundaries[count - 1] = max;
        Self::new(boundaries)
    }

    pub fn width(&self) -> usize {
        self.boundaries.len()
    }

    pub fn min(&self) -> f64 {
        self.boundaries[0]
    }

    pub fn max(&self) -> f64 {
        self.boundaries[self.boundaries.len() - 1]
    }

    pub fn index(&self, value: f64) -> usize {
        let clipped = value.clamp(self.min(), self.max());
        match self.boundaries.iter().position(|&b| clipped < b) {
            // clipped >= boundaries[0], so the first greater boundary is never index 0
            Some(i) => i - 1,
            None => self.width() - 1,
        }
    }

    /// Writes a one-hot row for `value` into `out`, which must be `width()` long.
    pub fn one_hot_into(&self, value: f64, out: &mut [f32]) {
        out.fill(0.0);
        out[self.index(value)] = 1.0;
    }
}

/// Discretized feature vector handed to the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub features: Vec<f32>,
}

impl State {
    pub fn width(&self) -> usize {
        self.features.len()
    }
}

/// External frame classifier: `(traffic_light, junction)` probabilities.
pub trait PerceptionModel {
    fn predict(&mut self, frame: &Frame) -> Result<(f32, f32)>;
}

/// Turns telemetry, and optionally a camera frame, into a [`State`].
///
/// Layout: heading one-hot, then distance one-hot, then two perception
/// flags when a [`PerceptionModel`] is attached.
pub struct StateEncoder {
    heading: Bucketizer,
    distance: Bucketizer,
    perception: Option<Box<dyn PerceptionModel>>,
    threshold: f32,
}

impl StateEncoder {
    pub fn new(cfg: &EncoderConfig) -> Result<Self> {
        Ok(Self {
            heading: Bucketizer::linspace(cfg.heading_min, cfg.heading_max, cfg.heading_buckets)?,
            distance: Bucketizer::linspace(
                cfg.distance_min,
                cfg.distance_max,
                cfg.distance_buckets,
            )?,
            perception: None,
            threshold: cfg.perception_threshold,
        })
    }

    pub fn with_perception(mut self, model: Box<dyn PerceptionModel>) -> Self {
        self.perception = Some(model);
        self
    }

    pub fn width(&self) -> usize {
        let perception = if self.perception.is_some() { 2 } else { 0 };
        self.heading.width() + self.distance.width() + perception
    }

    /// Telemetry-only encoding.
    pub fn encode(&self, telemetry: &Telemetry) -> Result<State> {
        telemetry.validate()?;

        let heading_width = self.heading.width();
        let mut features = vec![0.0; heading_width + self.distance.width()];
        let (heading, distance) = features.split_at_mut(heading_width);
        self.heading.one_hot_into(telemetry.way_degree, heading);
        self.distance.one_hot_into(telemetry.way_dis, distance);

        Ok(State { features })
    }

    /// Full observation: telemetry features plus perception flags from `frame`.
    pub fn encode_observation(&mut self, telemetry: &Telemetry, frame: &Frame) -> Result<State> {
        let mut state = self.encode(telemetry)?;
        let threshold = self.threshold;
        if let Some(model) = self.perception.as_mut() {
            let (traffic_light, junction) = model.predict(frame)?;
            let flag = |p: f32| if p > threshold { 1.0 } else { 0.0 };
            state.features.push(flag(traffic_light));
            state.features.push(flag(junction));
        }
        Ok(state)
    }
}
