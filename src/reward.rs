use crate::config::RewardConfig;
use crate::data::{SensorEvent, Telemetry};
use crate::error::Result;

/// Scores one tick of driving.
///
/// Dense shaping `scale * exp(-|way_degree| / decay)` plus a stationary
/// penalty, overridden by a flat terminal reward when the vehicle leaves the
/// lane envelope or collides.
#[derive(Debug, Clone)]
pub struct RewardEvaluator {
    cfg: RewardConfig,
}

impl RewardEvaluator {
    pub fn new(cfg: RewardConfig) -> Self {
        Self { cfg }
    }

    /// Returns `(reward, done)` for the current tick.
    pub fn evaluate(&self, telemetry: &Telemetry, sensors: &SensorEvent) -> Result<(f64, bool)> {
        telemetry.validate()?;

        if self.is_terminal(telemetry, sensors) {
            return Ok((self.cfg.terminal_reward, true));
        }

        let mut reward = 0.0;
        // speed is truncated to whole km/h, so a crawl counts as stopped
        if telemetry.car_speed.trunc() == 0.0 {
            reward += self.cfg.stationary_penalty;
        }
        reward += self.shaping(telemetry.way_degree);

        Ok((reward, false))
    }

    pub fn is_terminal(&self, telemetry: &Telemetry, sensors: &SensorEvent) -> bool {
        telemetry.way_dis > self.cfg.max_middle_dis
            || telemetry.way_degree.abs() > self.cfg.degree_limit
            || sensors.collision
    }

    fn shaping(&self, way_degree: f64) -> f64 {
        self.cfg.shaping_scale * (-way_degree.abs() / self.cfg.shaping_decay_degrees).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;

    fn evaluator() -> RewardEvaluator {
        RewardEvaluator::new(RewardConfig::default())
    }

    const CLEAR: SensorEvent = SensorEvent {
        collision: false,
        lane_invasion: false,
    };

    #[test]
    fn centered_moving_vehicle_gets_full_shaping() {
        let (reward, done) = evaluator()
            .evaluate(&Telemetry::new(5.0, 1.0, 0.0), &CLEAR)
            .unwrap();
        assert!((reward - 1.5).abs() < 1e-12);
        assert!(!done);
    }

    #[test]
    fn stationary_vehicle_is_penalised() {
        let (reward, done) = evaluator()
            .evaluate(&Telemetry::new(0.0, 1.0, 30.0), &CLEAR)
            .unwrap();
        let expected = -1.5 + 1.5 * (-2.0f64).exp();
        assert!((reward - expected).abs() < 1e-12);
        assert!((reward - -1.297).abs() < 1e-3);
        assert!(!done);
    }

    #[test]
    fn sub_unit_speed_counts_as_stationary() {
        let eval = evaluator();
        let (crawl, _) = eval.evaluate(&Telemetry::new(0.6, 1.0, 0.0), &CLEAR).unwrap();
        let (moving, _) = eval.evaluate(&Telemetry::new(1.0, 1.0, 0.0), &CLEAR).unwrap();
        assert!((crawl - 0.0).abs() < 1e-12);
        assert!((moving - 1.5).abs() < 1e-12);
    }

    #[test]
    fn shaping_strictly_decreases_with_heading_error() {
        let eval = evaluator();
        let mut last = f64::INFINITY;
        for step in 0..=80 {
            let degree = step as f64;
            let (reward, done) = eval
                .evaluate(&Telemetry::new(10.0, 1.0, -degree), &CLEAR)
                .unwrap();
            assert!(!done);
            assert!(reward < last, "reward did not decrease at {degree}");
            assert!(reward > 0.0 && reward <= 1.5);
            last = reward;
        }
    }

    #[test]
    fn leaving_the_lane_overrides_everything() {
        let eval = evaluator();
        for (speed, degree) in [(0.0, 0.0), (12.0, 5.0), (30.0, -70.0)] {
            let (reward, done) = eval
                .evaluate(&Telemetry::new(speed, 4.01, degree), &CLEAR)
                .unwrap();
            assert_eq!(reward, -10.0);
            assert!(done);
        }
    }

    #[test]
    fn heading_limit_is_exclusive() {
        let eval = evaluator();
        let (_, done) = eval.evaluate(&Telemetry::new(5.0, 1.0, 80.0), &CLEAR).unwrap();
        assert!(!done);
        let (reward, done) = eval.evaluate(&Telemetry::new(5.0, 1.0, -80.5), &CLEAR).unwrap();
        assert_eq!(reward, -10.0);
        assert!(done);
    }

    #[test]
    fn collision_terminates() {
        let crash = SensorEvent {
            collision: true,
            lane_invasion: false,
        };
        let (reward, done) = evaluator()
            .evaluate(&Telemetry::new(5.0, 1.0, 0.0), &crash)
            .unwrap();
        assert_eq!(reward, -10.0);
        assert!(done);
    }

    #[test]
    fn lane_invasion_alone_is_not_scored() {
        let invasion = SensorEvent {
            collision: false,
            lane_invasion: true,
        };
        let (reward, done) = evaluator()
            .evaluate(&Telemetry::new(5.0, 1.0, 0.0), &invasion)
            .unwrap();
        assert!((reward - 1.5).abs() < 1e-12);
        assert!(!done);
    }

    #[test]
    fn malformed_telemetry_is_rejected() {
        let err = evaluator().evaluate(&Telemetry::new(f64::NAN, 1.0, 0.0), &CLEAR);
        assert!(matches!(err, Err(TrainError::InputValidation(_))));
    }
}
