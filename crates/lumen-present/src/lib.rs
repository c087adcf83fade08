// SPDX-License-Identifier: CEPL-1.0
//! Backend-neutral contract between a frame-paced renderer and the engine that
//! owns the window surface.
//!
//! The renderer drives one cycle per frame:
//! [`Presenter::acquire_next_image`], draw into the returned image, then
//! [`Presenter::present_image`] exactly once for that image.
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Minimised windows report a zero-area size; nothing can be presented then.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Per-frame information supplied by the renderer when it asks for an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameHints {
    pub size: SurfaceSize,
}

/// An image handed to the renderer. `image` is the raw API handle and `format`
/// the raw API format value, so renderers on the other side of an FFI boundary
/// can consume it without sharing types with the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentImage {
    pub image: u64,
    pub format: i32,
}

pub trait Presenter {
    fn create_surface(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: SurfaceSize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Records the new target size. Recreation happens lazily on the next frame.
    fn on_resize(&mut self, size: SurfaceSize);

    fn acquire_next_image(&mut self, hints: FrameHints) -> PresentImage;

    /// Returns true only when the image reached the display without any
    /// staleness signal.
    fn present_image(&mut self, image: &PresentImage) -> bool;

    fn is_valid(&self) -> bool;
}
