use crate::error::{Result, TrainError};

/// Vehicle state for one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Vehicle speed, km/h.
    pub car_speed: f64,
    /// Distance from the lane center.
    pub way_dis: f64,
    /// Heading error relative to the lane direction, degrees.
    pub way_degree: f64,
}

impl Telemetry {
    pub fn new(car_speed: f64, way_dis: f64, way_degree: f64) -> Self {
        Self {
            car_speed,
            way_dis,
            way_degree,
        }
    }

    /// Rejects snapshots the encoder and reward cannot interpret.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("car_speed", self.car_speed),
            ("way_dis", self.way_dis),
            ("way_degree", self.way_degree),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(TrainError::InputValidation(format!(
                    "{name} is not a finite number: {value}"
                )));
            }
        }
        if self.car_speed < 0.0 {
            return Err(TrainError::InputValidation(format!(
                "car_speed is negative: {}",
                self.car_speed
            )));
        }
        Ok(())
    }
}

/// Sensor events for one simulation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorEvent {
    pub collision: bool,
    /// Reported by the gateway but not scored.
    pub lane_invasion: bool,
}

/// A BGR image, row-major, three bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height * 3],
        }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, bgr: [u8; 3]) {
        if x < self.width && y < self.height {
            let at = (y * self.width + x) * 3;
            self.pixels[at..at + 3].copy_from_slice(&bgr);
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x < self.width && y < self.height {
            let at = (y * self.width + x) * 3;
            Some([self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]])
        } else {
            None
        }
    }
}

/// The three camera feeds published each tick.
#[derive(Debug, Clone)]
pub struct CameraFrames {
    pub front: Frame,
    pub top: Frame,
    pub seg: Frame,
}
