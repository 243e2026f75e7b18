use super::Display;
use anyhow::{Result, anyhow};
use image::{GrayImage, RgbImage};
use minifb::{Key, Window, WindowOptions};

const LIVE_TITLE: &str = "Live Feed";
const DEBUG_TITLE: &str = "Debug View (What the Detector Sees)";

/// Live and debug windows. `q` or `Esc` in either window quits.
#[derive(Default)]
pub struct WindowDisplay {
    live: Option<Surface>,
    debug: Option<Surface>,
}

struct Surface {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Surface {
    fn open(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| anyhow!("Failed to open window {:?}: {}", title, e))?;
        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    fn present(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| anyhow!("Failed to update window: {}", e))
    }

    fn closed(&self) -> bool {
        !self.window.is_open()
            || self.window.is_key_down(Key::Q)
            || self.window.is_key_down(Key::Escape)
    }
}

fn surface_for<'a>(
    slot: &'a mut Option<Surface>,
    title: &str,
    width: usize,
    height: usize,
) -> Result<&'a mut Surface> {
    let stale = slot
        .as_ref()
        .map(|s| s.width != width || s.height != height)
        .unwrap_or(true);
    if stale {
        *slot = Some(Surface::open(title, width, height)?);
    }
    slot.as_mut().ok_or_else(|| anyhow!("window {:?} unavailable", title))
}

impl WindowDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for WindowDisplay {
    fn show(&mut self, live: &RgbImage, debug: Option<&GrayImage>) -> Result<()> {
        let (w, h) = (live.width() as usize, live.height() as usize);
        let surface = surface_for(&mut self.live, LIVE_TITLE, w, h)?;
        for (dst, p) in surface.buffer.iter_mut().zip(live.pixels()) {
            *dst = (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32;
        }
        surface.present()?;

        if let Some(debug) = debug {
            let (w, h) = (debug.width() as usize, debug.height() as usize);
            let surface = surface_for(&mut self.debug, DEBUG_TITLE, w, h)?;
            for (dst, p) in surface.buffer.iter_mut().zip(debug.pixels()) {
                let v = p[0] as u32;
                *dst = v << 16 | v << 8 | v;
            }
            surface.present()?;
        }
        Ok(())
    }

    fn quit_requested(&self) -> bool {
        self.live.as_ref().map(Surface::closed).unwrap_or(false)
            || self.debug.as_ref().map(Surface::closed).unwrap_or(false)
    }
}
