//! Frame presentation for the `human` render mode.
//!
//! Surfaces are created lazily by a [`SurfaceFactory`] the first time a frame
//! is presented and dropped again on `close`.

use crate::Result;
use ndarray::Array3;
use std::io::{self, Write};

/// Each emulator pixel becomes a `ZOOM_FACTOR x ZOOM_FACTOR` block on screen
pub const ZOOM_FACTOR: usize = 4;

/// A display target that accepts RGB frames of a fixed size.
pub trait Surface: Send {
    /// Draw a `[height, width, 3]` frame and flip it onto the display
    fn present(&mut self, frame: &Array3<u8>) -> Result<()>;
}

/// Creates a surface for frames of `(width, height)` pixels
pub type SurfaceFactory = Box<dyn FnMut(usize, usize) -> Result<Box<dyn Surface>> + Send>;

/// Factory used when the caller installs none
pub fn default_factory() -> SurfaceFactory {
    Box::new(|width, height| {
        tracing::debug!(width, height, "opening terminal surface");
        Ok(Box::new(TerminalSurface::new(io::stdout(), width, height)) as Box<dyn Surface>)
    })
}

/// Nearest-neighbour upscale of a `[height, width, channels]` frame
pub fn scale(frame: &Array3<u8>, zoom: usize) -> Array3<u8> {
    let (h, w, c) = frame.dim();
    Array3::from_shape_fn((h * zoom, w * zoom, c), |(y, x, ch)| {
        frame[[y / zoom, x / zoom, ch]]
    })
}

/// Writes frames as 24-bit colour half-block characters.
///
/// Each character cell carries two vertically stacked pixels; columns are
/// subsampled so a line never exceeds `max_columns`.
pub struct TerminalSurface<W: Write + Send> {
    out: W,
    width: usize,
    height: usize,
    max_columns: usize,
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W, width: usize, height: usize) -> Self {
        Self {
            out,
            width,
            height,
            max_columns: 80,
        }
    }

    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.max_columns = max_columns.max(1);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Surface for TerminalSurface<W> {
    fn present(&mut self, frame: &Array3<u8>) -> Result<()> {
        let (h, w, _) = frame.dim();
        debug_assert_eq!((w, h), (self.width, self.height));

        let stride = w.div_ceil(self.max_columns).max(1);
        let mut buf = String::from("\x1b[H");
        for y in (0..h).step_by(stride * 2) {
            let below = (y + stride).min(h - 1);
            for x in (0..w).step_by(stride) {
                let top = (frame[[y, x, 0]], frame[[y, x, 1]], frame[[y, x, 2]]);
                let bot = (
                    frame[[below, x, 0]],
                    frame[[below, x, 1]],
                    frame[[below, x, 2]],
                );
                buf.push_str(&format!(
                    "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m\u{2580}",
                    top.0, top.1, top.2, bot.0, bot.1, bot.2
                ));
            }
            buf.push_str("\x1b[0m\n");
        }
        self.out.write_all(buf.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}
