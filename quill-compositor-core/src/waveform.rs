//! E-paper waveform modes and automatic waveform selection.

use std::ops::ControlFlow;

use quill_buffer_manager::{Color, PixelBuffer};
use quill_core::types::Rect;

/// Refresh waveforms understood by the EPDC. Values are the driver's codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveformMode {
    /// Full flashing clear to white.
    Initialize,
    /// Fast black and white.
    Mono,
    HighQualityGrayscale,
    Grayscale,
    Highlight,
}

impl WaveformMode {
    pub fn code(self) -> u32 {
        match self {
            WaveformMode::Initialize => 0,
            WaveformMode::Mono => 1,
            WaveformMode::HighQualityGrayscale => 2,
            WaveformMode::Grayscale => 3,
            WaveformMode::Highlight => 8,
        }
    }

    /// Decodes the waveform field of a `Repaint` message. Zero, and any code
    /// the driver does not know, means "choose automatically".
    pub fn from_wire(value: u64) -> Option<WaveformMode> {
        match value {
            1 => Some(WaveformMode::Mono),
            2 => Some(WaveformMode::HighQualityGrayscale),
            3 => Some(WaveformMode::Grayscale),
            8 => Some(WaveformMode::Highlight),
            0 => None,
            other => {
                tracing::debug!(waveform = other, "Unknown waveform code, selecting automatically");
                None
            }
        }
    }

    pub fn to_wire(waveform: Option<WaveformMode>) -> u64 {
        waveform.map_or(0, |mode| u64::from(mode.code()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    Partial,
    Full,
}

impl UpdateMode {
    pub fn code(self) -> u32 {
        match self {
            UpdateMode::Partial => 0,
            UpdateMode::Full => 1,
        }
    }
}

/// Picks the cheapest waveform that can render `rect` of `framebuffer`.
///
/// Mono when the area holds only black, white or transparent pixels,
/// Grayscale when the only other color is the toolkit gray, and
/// HighQualityGrayscale as soon as any other color shows up.
pub fn select_waveform(framebuffer: &PixelBuffer, rect: Rect) -> WaveformMode {
    let format = framebuffer.format();
    let white = format.quantize(Color::WHITE);
    let black = format.quantize(Color::BLACK);
    let transparent = format.quantize(Color::TRANSPARENT);
    let gray = format.quantize(Color::GRAY);

    let mut mode = WaveformMode::Mono;
    framebuffer.scan(rect, |color| {
        if color == white || color == black || color == transparent {
            ControlFlow::Continue(())
        } else if color == gray {
            mode = WaveformMode::Grayscale;
            ControlFlow::Continue(())
        } else {
            mode = WaveformMode::HighQualityGrayscale;
            ControlFlow::Break(())
        }
    });
    mode
}
