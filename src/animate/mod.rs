// src/animate/mod.rs

pub mod frame;
pub mod render;

use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::config::AnimationConfig;
use crate::table::YieldTable;

pub use frame::{frame_delay, AxisBounds, CurveColor, Frame, FrameCursor, FrameSequence};
pub use render::{ConsolePresenter, FramePresenter, GifPresenter, RenderError, SvgPresenter};

/// Frame sequence plus playback rate.
pub struct Animator {
    frames: FrameSequence,
    delay: Duration,
}

impl Animator {
    /// Animate the rows of `table` dated on or after `begin_date`.
    pub fn new(table: &YieldTable, begin_date: NaiveDate, frame_rate: f64) -> Result<Self, RenderError> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(RenderError::FrameRate(frame_rate));
        }
        let frames = FrameSequence::new(table, begin_date);
        if frames.is_empty() {
            return Err(RenderError::Empty);
        }
        debug!(frames = frames.len(), y_max = frames.bounds().y_max, "prepared animation");
        Ok(Self {
            frames,
            delay: frame_delay(frame_rate),
        })
    }

    pub fn from_config(table: &YieldTable, config: &AnimationConfig) -> Result<Self, RenderError> {
        Self::new(table, config.begin_date, config.frame_rate)
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Hand every frame to `presenter` once, in order, without waiting between
    /// them. Suits surfaces that store the timing themselves, such as a GIF.
    #[instrument(level = "info", skip_all, fields(frames = self.frames.len()))]
    pub fn render<P: FramePresenter>(&self, presenter: &mut P) -> Result<usize, RenderError> {
        let bounds = self.frames.bounds();
        let mut shown = 0;
        for frame in self.frames.frames() {
            presenter.present(&frame, bounds)?;
            shown += 1;
        }
        presenter.finish()?;
        info!(shown, "rendered animation");
        Ok(shown)
    }

    /// Timer-driven playback: one frame per tick, wrapping back to the first
    /// frame after the last. Runs until `max_frames` frames have been shown,
    /// or forever when it is `None`.
    pub async fn play<P: FramePresenter>(
        &self,
        presenter: &mut P,
        max_frames: Option<usize>,
    ) -> Result<usize, RenderError> {
        let bounds = self.frames.bounds();
        let mut ticker = interval(self.delay.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cursor = self.frames.cursor();
        let mut shown = 0;
        while max_frames.map_or(true, |max| shown < max) {
            ticker.tick().await;
            let Some(frame) = cursor.current() else {
                break;
            };
            presenter.present(&frame, bounds)?;
            shown += 1;
            cursor.advance();
        }
        presenter.finish()?;
        Ok(shown)
    }
}

/// Render `table` from `begin_date` onwards into `presenter` at `frame_rate`.
pub fn animate<P: FramePresenter>(
    table: &YieldTable,
    begin_date: NaiveDate,
    frame_rate: f64,
    presenter: &mut P,
) -> Result<usize, RenderError> {
    Animator::new(table, begin_date, frame_rate)?.render(presenter)
}
