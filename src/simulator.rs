use std::thread;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

use crate::action::VehicleControl;
use crate::config::SimulatorConfig;
use crate::data::{CameraFrames, Frame, SensorEvent, Telemetry};
use crate::error::{Result, TrainError};

/// Vehicle, sensors and cameras exposed by a driving simulator.
///
/// Implementations that receive sensor data on background threads must hand
/// out consistent snapshots; the training loop calls everything from one
/// thread and does no locking of its own.
pub trait SimulatorGateway {
    /// Connect and spawn the vehicle with its sensors.
    fn initial(&mut self) -> Result<()>;
    /// Block until the simulator publishes data, or fail after `timeout`.
    fn wait_for_sim(&mut self, timeout: Duration) -> Result<()>;
    fn camera_data(&mut self) -> Result<CameraFrames>;
    fn car_data(&mut self) -> Result<Telemetry>;
    fn sensor_data(&mut self) -> Result<SensorEvent>;
    fn control_vehicle(&mut self, control: VehicleControl) -> Result<()>;
    /// Put the vehicle back at its start pose for a new episode.
    fn reset(&mut self) -> Result<()>;
    /// Release the vehicle and the connection.
    fn destroy(&mut self) -> Result<()>;
}

/// In-process point-mass vehicle on a straight lane.
///
/// Each applied control advances one tick: speed follows throttle, brake and
/// drag; heading error follows steering plus uniform drift; lateral offset
/// integrates the heading.
pub struct KinematicSimulator {
    cfg: SimulatorConfig,
    rng: StdRng,
    connected: bool,
    ticks_since_start: u32,
    speed: f64,
    heading: f64,
    offset: f64,
    collided: bool,
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);

impl KinematicSimulator {
    pub fn new(cfg: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self {
            cfg,
            rng,
            connected: false,
            ticks_since_start: 0,
            speed: 0.0,
            heading: 0.0,
            offset: 0.0,
            collided: false,
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(TrainError::Simulator("vehicle is not spawned".to_string()))
        }
    }

    fn tick(&mut self, control: VehicleControl) {
        let dt = self.cfg.tick_secs;
        let throttle = control.throttle.clamp(0.0, 1.0) as f64;
        let brake = control.brake.clamp(0.0, 1.0) as f64;
        let steer = control.steer.clamp(-1.0, 1.0) as f64;

        let accel = throttle * self.cfg.acceleration
            - brake * self.cfg.brake_deceleration
            - self.cfg.drag;
        self.speed = (self.speed + accel * dt).clamp(0.0, self.cfg.max_speed);

        // steering authority scales with speed; a parked car cannot turn
        let authority = self.speed / self.cfg.max_speed;
        let drift = if self.cfg.heading_noise > 0.0 {
            self.rng
                .random_range(-self.cfg.heading_noise..=self.cfg.heading_noise)
        } else {
            0.0
        };
        self.heading += steer * self.cfg.steer_rate * authority * dt + drift * authority;

        let metres_per_sec = self.speed / 3.6;
        self.offset += metres_per_sec * self.heading.to_radians().sin() * dt;

        if self.offset.abs() > self.cfg.curb_offset {
            self.collided = true;
        }
        self.ticks_since_start = self.ticks_since_start.saturating_add(1);
    }

    fn render(&self) -> CameraFrames {
        let (w, h) = (self.cfg.frame_width, self.cfg.frame_height);
        let mut front = Frame::blank(w, h);
        let mut top = Frame::blank(w, h);
        let mut seg = Frame::blank(w, h);

        // lane markings and the vehicle, viewed from above
        let scale = w as f64 / (2.0 * self.cfg.curb_offset.max(f64::EPSILON));
        let to_x = |lateral: f64| ((lateral + self.cfg.curb_offset) * scale).round() as isize;
        let car_x = to_x(self.offset);
        for y in 0..h {
            for lane in [-self.cfg.lane_half_width, self.cfg.lane_half_width] {
                let x = to_x(lane);
                if x >= 0 {
                    top.set_pixel(x as usize, y, [255, 255, 255]);
                    seg.set_pixel(x as usize, y, [50, 234, 157]);
                }
            }
        }
        if car_x >= 0 {
            top.set_pixel(car_x as usize, h.saturating_sub(2), [0, 0, 255]);
        }

        // the horizon tilts with heading error in the front view
        let horizon = (h as f64 / 2.0 + self.heading / 90.0 * h as f64 / 2.0).round();
        if horizon >= 0.0 {
            let row = horizon as usize;
            for x in 0..w {
                front.set_pixel(x, row, [200, 200, 200]);
            }
        }

        CameraFrames { front, top, seg }
    }
}

impl SimulatorGateway for KinematicSimulator {
    fn initial(&mut self) -> Result<()> {
        self.connected = true;
        self.ticks_since_start = 0;
        self.speed = 0.0;
        self.heading = 0.0;
        self.offset = 0.0;
        self.collided = false;
        info!(seed = self.cfg.seed, "Spawned vehicle in kinematic simulator");
        Ok(())
    }

    fn wait_for_sim(&mut self, timeout: Duration) -> Result<()> {
        self.ensure_connected()?;
        let deadline = Instant::now() + timeout;
        while self.ticks_since_start < self.cfg.warmup_ticks {
            if Instant::now() >= deadline {
                return Err(TrainError::Simulator(format!(
                    "simulator not ready after {timeout:?}"
                )));
            }
            // an idle world still ticks
            self.tick(VehicleControl::default());
            thread::sleep(POLL_INTERVAL);
        }
        debug!(ticks = self.ticks_since_start, "Simulator ready");
        Ok(())
    }

    fn camera_data(&mut self) -> Result<CameraFrames> {
        self.ensure_connected()?;
        Ok(self.render())
    }

    fn car_data(&mut self) -> Result<Telemetry> {
        self.ensure_connected()?;
        Ok(Telemetry::new(self.speed, self.offset.abs(), self.heading))
    }

    fn sensor_data(&mut self) -> Result<SensorEvent> {
        self.ensure_connected()?;
        Ok(SensorEvent {
            collision: self.collided,
            lane_invasion: self.offset.abs() > self.cfg.lane_half_width,
        })
    }

    fn control_vehicle(&mut self, control: VehicleControl) -> Result<()> {
        self.ensure_connected()?;
        self.tick(control);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.speed = 0.0;
        self.heading = 0.0;
        self.offset = 0.0;
        self.collided = false;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            info!("Destroyed vehicle");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    fn quiet() -> SimulatorConfig {
        SimulatorConfig {
            heading_noise: 0.0,
            warmup_ticks: 1,
            ..SimulatorConfig::default()
        }
    }

    fn ready(cfg: SimulatorConfig) -> KinematicSimulator {
        let mut sim = KinematicSimulator::new(cfg);
        sim.initial().unwrap();
        sim.wait_for_sim(Duration::from_secs(5)).unwrap();
        sim
    }

    #[test]
    fn calls_before_initial_fail() {
        let mut sim = KinematicSimulator::new(quiet());
        assert!(matches!(sim.car_data(), Err(TrainError::Simulator(_))));
        assert!(sim.wait_for_sim(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn wait_times_out() {
        let mut sim = KinematicSimulator::new(SimulatorConfig {
            warmup_ticks: u32::MAX,
            ..quiet()
        });
        sim.initial().unwrap();
        let err = sim.wait_for_sim(Duration::from_millis(20));
        assert!(matches!(err, Err(TrainError::Simulator(_))));
    }

    #[test]
    fn forward_accelerates_and_stop_brakes() {
        let mut sim = ready(quiet());
        for _ in 0..20 {
            sim.control_vehicle(Action::Forward.control()).unwrap();
        }
        let moving = sim.car_data().unwrap();
        assert!(moving.car_speed > 1.0);
        assert_eq!(moving.way_degree, 0.0);

        for _ in 0..20 {
            sim.control_vehicle(Action::Stop.control()).unwrap();
        }
        assert_eq!(sim.car_data().unwrap().car_speed, 0.0);
    }

    #[test]
    fn steering_drifts_off_center_until_collision() {
        let mut sim = ready(quiet());
        let mut collided = false;
        for _ in 0..2_000 {
            sim.control_vehicle(Action::FullRight.control()).unwrap();
            if sim.sensor_data().unwrap().collision {
                collided = true;
                break;
            }
        }
        assert!(collided);
        assert!(sim.car_data().unwrap().way_dis > 4.5);

        sim.reset().unwrap();
        let telemetry = sim.car_data().unwrap();
        assert_eq!((telemetry.way_dis, telemetry.way_degree), (0.0, 0.0));
        assert!(!sim.sensor_data().unwrap().collision);
    }

    #[test]
    fn frames_have_configured_size() {
        let mut sim = ready(quiet());
        let frames = sim.camera_data().unwrap();
        assert_eq!((frames.top.width, frames.top.height), (40, 30));
        assert_eq!(frames.front.pixels.len(), 40 * 30 * 3);
    }

    #[test]
    fn destroy_disconnects() {
        let mut sim = ready(quiet());
        sim.destroy().unwrap();
        assert!(sim.car_data().is_err());
        sim.destroy().unwrap();
    }
}
