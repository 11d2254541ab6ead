// src/animate/render.rs

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use plotters::style::register_font;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info};

use super::frame::{AxisBounds, CurveColor, Frame};
use crate::table::Maturity;

pub const TITLE: &str = "Evolution of Treasury Rates";
pub const X_LABEL: &str = "Maturity (yrs)";
pub const Y_LABEL: &str = "Yield %";

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("nothing to animate: no rows on or after the begin date")]
    Empty,

    #[error("frame rate must be a positive number, got {0}")]
    FrameRate(f64),

    #[error("opening rendering surface {path}: {message}")]
    Backend { path: PathBuf, message: String },

    #[error("drawing frame {index}: {message}")]
    Draw { index: usize, message: String },

    #[error("bundled chart font could not be loaded")]
    Font,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Make the bundled face available to plotters as `sans-serif`. Every text
/// element of a frame is laid out with it, on bitmap and SVG surfaces alike.
pub fn register_fonts() -> Result<(), RenderError> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED.get_or_init(|| {
        register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).is_ok()
    });
    if ok {
        Ok(())
    } else {
        Err(RenderError::Font)
    }
}

/// A surface frames are handed to, one call per displayed frame.
pub trait FramePresenter {
    fn present(&mut self, frame: &Frame<'_>, bounds: &AxisBounds) -> Result<(), RenderError>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

impl CurveColor {
    pub fn rgb(&self) -> RGBColor {
        match self {
            CurveColor::Normal => GREEN,
            CurveColor::Inverted => RED,
        }
    }
}

fn draw_frame<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    frame: &Frame<'_>,
    bounds: &AxisBounds,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(area)
        .caption(TITLE, (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..bounds.x_max, 0f64..bounds.y_max)?;

    chart
        .configure_mesh()
        .x_desc(X_LABEL)
        .y_desc(Y_LABEL)
        .draw()?;

    let style = frame.color.rgb().stroke_width(2);
    let mut labelled = false;
    for segment in frame.segments() {
        let series = chart.draw_series(LineSeries::new(segment, style))?;
        if !labelled {
            series
                .label(frame.label())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
            labelled = true;
        }
    }

    if labelled {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    Ok(())
}

fn draw_error<E: std::error::Error + Send + Sync>(
    frame: &Frame<'_>,
) -> impl FnOnce(DrawingAreaErrorKind<E>) -> RenderError {
    let index = frame.index;
    move |e| RenderError::Draw {
        index,
        message: e.to_string(),
    }
}

fn ensure_parent(path: &Path) -> Result<(), RenderError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Animated GIF on disk. The file loops forever in any viewer.
pub struct GifPresenter {
    area: DrawingArea<BitMapBackend<'static>, Shift>,
    path: PathBuf,
    frames: usize,
}

impl GifPresenter {
    pub fn create(
        path: impl Into<PathBuf>,
        size: (u32, u32),
        delay: Duration,
    ) -> Result<Self, RenderError> {
        let path = path.into();
        register_fonts()?;
        ensure_parent(&path)?;
        let delay_ms = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        let backend =
            BitMapBackend::gif(&path, size, delay_ms).map_err(|e| RenderError::Backend {
                path: path.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            area: backend.into_drawing_area(),
            path,
            frames: 0,
        })
    }
}

impl FramePresenter for GifPresenter {
    fn present(&mut self, frame: &Frame<'_>, bounds: &AxisBounds) -> Result<(), RenderError> {
        draw_frame(&self.area, frame, bounds).map_err(draw_error(frame))?;
        self.area.present().map_err(draw_error(frame))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        info!(path = %self.path.display(), frames = self.frames, "wrote animated GIF");
        Ok(())
    }
}

/// One SVG file per frame, `frame_00000.svg` onwards, in `dir`.
pub struct SvgPresenter {
    dir: PathBuf,
    size: (u32, u32),
}

impl SvgPresenter {
    pub fn create(dir: impl Into<PathBuf>, size: (u32, u32)) -> Result<Self, RenderError> {
        let dir = dir.into();
        register_fonts()?;
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, size })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frame_{:05}.svg", index))
    }
}

impl FramePresenter for SvgPresenter {
    fn present(&mut self, frame: &Frame<'_>, bounds: &AxisBounds) -> Result<(), RenderError> {
        let path = self.frame_path(frame.index);
        let area = SVGBackend::new(&path, self.size).into_drawing_area();
        draw_frame(&area, frame, bounds).map_err(draw_error(frame))?;
        area.present().map_err(draw_error(frame))?;
        debug!(path = %path.display(), "wrote frame");
        Ok(())
    }
}

/// Text playback: one line per frame.
pub struct ConsolePresenter<W: Write> {
    out: W,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> FramePresenter for ConsolePresenter<W> {
    fn present(&mut self, frame: &Frame<'_>, _bounds: &AxisBounds) -> Result<(), RenderError> {
        let status = match frame.color {
            CurveColor::Inverted => "INVERTED",
            CurveColor::Normal => "normal  ",
        };
        let spread = frame
            .record
            .spread_2s10s()
            .map_or_else(|| "  --".to_string(), |s| format!("{:+.2}", s));
        let curve = frame
            .record
            .iter()
            .map(|(m, y)| match y {
                Some(y) => format!("{}={:.2}", m, y),
                None => format!("{}=--", m),
            })
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            self.out,
            "[{:>5}/{}] {} {} 2s10s={} | {}",
            frame.index + 1,
            frame.total,
            frame.label(),
            status,
            spread,
            curve
        )?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Column header for console playback.
pub fn console_header() -> String {
    Maturity::ALL
        .iter()
        .map(|m| format!("{}={:.1}y", m, m.years()))
        .collect::<Vec<_>>()
        .join(" ")
}
