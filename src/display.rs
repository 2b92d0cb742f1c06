use std::path::PathBuf;

use tracing::info;

use crate::config::DisplayConfig;
use crate::data::{Frame, Telemetry};
use crate::error::Result;

/// Diagnostic overlay refreshed once per training step.
pub trait Display {
    fn clear(&mut self) -> Result<()>;
    fn draw_image(&mut self, frame: &Frame) -> Result<()>;
    fn draw_text_info(&mut self, telemetry: &Telemetry, action_label: &str, episode: usize)
    -> Result<()>;
    /// True once the operator asked to stop training.
    fn should_quit(&mut self) -> bool;
    /// Flush the frame drawn since the last `clear`.
    fn update(&mut self) -> Result<()>;
    /// Release windows and buffers; called once at the end of a run.
    fn close(&mut self) -> Result<()>;
}

/// HUD rendered as log lines.
pub struct ConsoleDisplay {
    log_every: u64,
    stop_file: Option<PathBuf>,
    frames: u64,
    pending: Option<String>,
    last_frame_size: (usize, usize),
}

impl ConsoleDisplay {
    pub fn new(cfg: &DisplayConfig) -> Self {
        Self {
            log_every: cfg.log_every,
            stop_file: cfg.stop_file.clone(),
            frames: 0,
            pending: None,
            last_frame_size: (0, 0),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Display for ConsoleDisplay {
    fn clear(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    fn draw_image(&mut self, frame: &Frame) -> Result<()> {
        self.last_frame_size = (frame.width, frame.height);
        Ok(())
    }

    fn draw_text_info(
        &mut self,
        telemetry: &Telemetry,
        action_label: &str,
        episode: usize,
    ) -> Result<()> {
        self.pending = Some(format!(
            "episode {episode} | {action_label} | speed {:.1} km/h | way_dis {:.2} | way_degree {:.1}",
            telemetry.car_speed, telemetry.way_dis, telemetry.way_degree
        ));
        Ok(())
    }

    fn should_quit(&mut self) -> bool {
        self.stop_file.as_ref().is_some_and(|path| path.exists())
    }

    fn update(&mut self) -> Result<()> {
        self.frames += 1;
        if self.log_every > 0 && self.frames % self.log_every == 0 {
            if let Some(text) = self.pending.as_deref() {
                let (width, height) = self.last_frame_size;
                info!(frame = self.frames, width, height, "{text}");
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!(frames = self.frames, "Display closed");
        Ok(())
    }
}
