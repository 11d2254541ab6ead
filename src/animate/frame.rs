use chrono::NaiveDate;
use std::time::Duration;

use crate::table::{YieldRecord, YieldTable};

/// Right edge of the maturity axis, in years.
pub const X_AXIS_MAX: f64 = 35.0;

/// Inter-frame delay for a playback rate in frames per second.
pub fn frame_delay(frame_rate: f64) -> Duration {
    Duration::from_millis((1000.0 / frame_rate).round() as u64)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveColor {
    Normal,
    /// 2Y above 10Y.
    Inverted,
}

impl CurveColor {
    pub fn for_record(record: &YieldRecord) -> Self {
        if record.is_inverted() {
            CurveColor::Inverted
        } else {
            CurveColor::Normal
        }
    }
}

/// Plot limits, fixed for the whole playback so the axes never rescale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisBounds {
    pub x_max: f64,
    pub y_max: f64,
}

impl AxisBounds {
    pub fn for_table(table: &YieldTable) -> Self {
        Self {
            x_max: X_AXIS_MAX,
            y_max: table.max_yield().map_or(0.0, f64::ceil) + 1.0,
        }
    }
}

/// Everything needed to draw one row.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame<'a> {
    pub index: usize,
    pub total: usize,
    pub record: &'a YieldRecord,
    pub color: CurveColor,
}

impl<'a> Frame<'a> {
    pub fn label(&self) -> String {
        self.record.date.format("%Y-%m-%d").to_string()
    }

    /// `(years, yield)` in maturity order.
    pub fn points(&self) -> Vec<(f64, Option<f64>)> {
        self.record.iter().map(|(m, y)| (m.years(), y)).collect()
    }

    /// Contiguous runs of present yields; a missing maturity breaks the line.
    pub fn segments(&self) -> Vec<Vec<(f64, f64)>> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        for (x, y) in self.points() {
            match y {
                Some(y) => current.push((x, y)),
                None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
                None => {}
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }
        segments
    }
}

/// The rows to animate plus the axis bounds computed once over all of them.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    records: Vec<YieldRecord>,
    bounds: AxisBounds,
}

impl FrameSequence {
    /// Rows of `table` dated on or after `begin`.
    pub fn new(table: &YieldTable, begin: NaiveDate) -> Self {
        Self::from_table(table.since(begin))
    }

    pub fn from_table(table: YieldTable) -> Self {
        let bounds = AxisBounds::for_table(&table);
        Self {
            records: table.into_iter().collect(),
            bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn bounds(&self) -> &AxisBounds {
        &self.bounds
    }

    pub fn frame(&self, index: usize) -> Option<Frame<'_>> {
        let record = self.records.get(index)?;
        Some(Frame {
            index,
            total: self.records.len(),
            record,
            color: CurveColor::for_record(record),
        })
    }

    /// One pass over every frame.
    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> {
        (0..self.len()).filter_map(move |i| self.frame(i))
    }

    pub fn cursor(&self) -> FrameCursor<'_> {
        FrameCursor {
            frames: self,
            position: 0,
        }
    }
}

/// Playback state: the index of the frame on screen. Advancing past the last
/// frame returns to the first.
#[derive(Clone, Debug)]
pub struct FrameCursor<'a> {
    frames: &'a FrameSequence,
    position: usize,
}

impl<'a> FrameCursor<'a> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<Frame<'a>> {
        self.frames.frame(self.position)
    }

    pub fn advance(&mut self) {
        if !self.frames.is_empty() {
            self.position = (self.position + 1) % self.frames.len();
        }
    }
}
