// SPDX-License-Identifier: CEPL-1.0
//! Acquire → (external render) → present loop.
//!
//! STRICT PER-FRAME ORDER:
//! 1) acquire_next_image signalling the slot's image_ready fence
//! 2) block on image_ready (wait + reset) so the image is usable on return
//! 3) renderer draws and hands the image back in COLOR_ATTACHMENT_OPTIMAL
//! 4) wait + reset the slot's submit_done fence, submit the pre-recorded
//!    transition signalling present_transition and submit_done
//! 5) queue_present waiting on present_transition
//! 6) advance the slot index, whatever the present returned
use ash::vk;
use ash::vk::Handle;
use lumen_present::{FrameHints, PresentImage, SurfaceSize};
use tracing::{debug, error, info, warn};

use crate::error::PresentResult;
use crate::gpu::Gpu;
use crate::swapchain::SwapchainState;
use crate::sync::SyncPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquiring,
    Acquired,
    Presenting,
    Recreating,
}

enum AcquireOutcome {
    Ready(u32),
    /// Usable, but the swapchain no longer matches the surface.
    Suboptimal(u32),
    OutOfDate,
    Failed,
}

pub(crate) struct FrameCycle<G: Gpu> {
    gpu: G,
    frames_in_flight: usize,
    sync: SyncPool,
    swapchain: SwapchainState,
    /// Slot used by the current cycle, 0..frames_in_flight.
    frame_index: usize,
    /// Swapchain image index handed out by the last successful acquire.
    image_index: u32,
    last_image: PresentImage,
    phase: FramePhase,
    valid: bool,
    /// Size to build the next swapchain at.
    target: SurfaceSize,
    frames_presented: u64,
    recreations: u64,
}

impl<G: Gpu> FrameCycle<G> {
    pub fn new(gpu: G, frames_in_flight: usize, size: SurfaceSize) -> PresentResult<Self> {
        let mut sync = SyncPool::create(&gpu, frames_in_flight)?;
        let swapchain = match SwapchainState::create(&gpu, size) {
            Ok(s) => s,
            Err(e) => {
                sync.destroy(&gpu);
                return Err(e);
            }
        };
        Ok(FrameCycle {
            gpu,
            frames_in_flight,
            sync,
            swapchain,
            frame_index: 0,
            image_index: 0,
            last_image: PresentImage::default(),
            phase: FramePhase::Idle,
            valid: true,
            target: size,
            frames_presented: 0,
            recreations: 0,
        })
    }

    #[cfg(test)]
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[cfg(test)]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.surface_format.format
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        self.swapchain.image_usage
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Records the size for the next swapchain. Nothing is rebuilt here.
    pub fn on_resize(&mut self, size: SurfaceSize) {
        if size != self.target {
            debug!("resize pending: {}x{}", size.width, size.height);
            self.target = size;
        }
    }

    fn resize_pending(&self) -> bool {
        !self.target.is_empty() && self.target != self.swapchain.requested
    }

    /// Returns an image the renderer may draw into right away.
    ///
    /// Blocks on the slot's image_ready fence before returning; a stuck GPU
    /// blocks the calling thread indefinitely. On an unrecoverable acquire
    /// error the previous image is returned and the following present is
    /// skipped.
    pub fn acquire(&mut self, hints: FrameHints) -> PresentImage {
        if self.phase == FramePhase::Acquired {
            warn!(
                "acquire while image {} is still outstanding; handing it out again",
                self.image_index
            );
            return self.last_image;
        }
        if !hints.size.is_empty() && hints.size != self.target {
            debug!(
                "frame hints ask for {}x{}, target is {}x{}",
                hints.size.width, hints.size.height, self.target.width, self.target.height
            );
        }

        if (!self.valid || self.resize_pending()) && !self.recreate() {
            return self.last_image;
        }

        self.phase = FramePhase::Acquiring;
        let mut outcome = self.try_acquire();
        if let AcquireOutcome::Suboptimal(_) | AcquireOutcome::OutOfDate = outcome {
            info!("acquire: swapchain stale, recreating");
            outcome = if self.recreate() {
                self.phase = FramePhase::Acquiring;
                self.try_acquire()
            } else {
                AcquireOutcome::Failed
            };
        }

        match outcome {
            // A second suboptimal right after a rebuild is presented as is.
            AcquireOutcome::Ready(index) | AcquireOutcome::Suboptimal(index) => {
                self.image_index = index;
                self.last_image = PresentImage {
                    image: self.swapchain.images[index as usize].as_raw(),
                    format: self.swapchain.surface_format.format.as_raw(),
                };
                self.phase = FramePhase::Acquired;
            }
            AcquireOutcome::OutOfDate => {
                // Already rebuilt once this frame; try again next frame.
                warn!("acquire: swapchain still stale after recreation, skipping frame");
                self.phase = FramePhase::Idle;
            }
            AcquireOutcome::Failed => {
                self.phase = FramePhase::Idle;
            }
        }
        self.last_image
    }

    fn try_acquire(&mut self) -> AcquireOutcome {
        let slot = self.sync.slot(self.frame_index);

        // The acquire needs an unsignaled fence; fresh slots start signaled.
        match self.gpu.fence_signaled(slot.image_ready) {
            Ok(true) => {
                if let Err(e) = self.gpu.reset_fence(slot.image_ready) {
                    error!(code = e.as_raw(), "reset_fences(image_ready): {:?}", e);
                }
            }
            Ok(false) => {}
            Err(e) => error!(code = e.as_raw(), "get_fence_status(image_ready): {:?}", e),
        }

        match self
            .gpu
            .acquire_next_image(self.swapchain.handle, slot.image_ready)
        {
            Ok((index, suboptimal)) => {
                // Host sync before handing the image out: the renderer uses it immediately.
                if let Err(e) = self.gpu.wait_for_fences(&[slot.image_ready]) {
                    error!(code = e.as_raw(), "wait_for_fences(image_ready): {:?}", e);
                } else if let Err(e) = self.gpu.reset_fence(slot.image_ready) {
                    error!(code = e.as_raw(), "reset_fences(image_ready): {:?}", e);
                }
                if suboptimal {
                    AcquireOutcome::Suboptimal(index)
                } else {
                    AcquireOutcome::Ready(index)
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::OutOfDate,
            Err(e) => {
                error!(code = e.as_raw(), "acquire_next_image: {:?}", e);
                AcquireOutcome::Failed
            }
        }
    }

    /// Returns true only if the present succeeded without a staleness signal.
    pub fn present(&mut self, image: &PresentImage) -> bool {
        if self.phase != FramePhase::Acquired {
            warn!("present without an acquired image; frame skipped");
            return false;
        }
        let index = self.image_index;
        if self.swapchain.image_index_of(image.image) != Some(index) {
            warn!(
                "present: handle 0x{:x} is not the acquired image {}; presenting the acquired one",
                image.image, index
            );
        }

        self.phase = FramePhase::Presenting;
        let slot = self.sync.slot(self.frame_index);

        // The previous submit from this slot must be done before it is reused.
        if let Err(e) = self.gpu.wait_for_fences(&[slot.submit_done]) {
            error!(code = e.as_raw(), "wait_for_fences(submit_done): {:?}", e);
        }
        if let Err(e) = self.gpu.reset_fence(slot.submit_done) {
            error!(code = e.as_raw(), "reset_fences(submit_done): {:?}", e);
        }

        let result = match self.gpu.queue_submit(
            self.swapchain.transition(index),
            slot.present_transition,
            slot.submit_done,
        ) {
            Ok(()) => self
                .gpu
                .queue_present(self.swapchain.handle, index, slot.present_transition),
            Err(e) => {
                error!(code = e.as_raw(), "queue_submit(present transition): {:?}", e);
                // submit_done will never signal now; rebuild the ring before reuse.
                self.valid = false;
                Err(e)
            }
        };

        // Always move on so one bad slot cannot stall every later frame.
        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;
        self.phase = FramePhase::Idle;

        match result {
            Ok(false) => {
                self.frames_presented += 1;
                true
            }
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                if result.is_ok() {
                    self.frames_presented += 1;
                }
                info!("present: swapchain stale, recreating");
                self.recreate();
                false
            }
            Err(e) => {
                if self.valid {
                    error!(code = e.as_raw(), "queue_present: {:?}", e);
                }
                false
            }
        }
    }

    /// Waits for the device, destroys the swapchain (explicitly) and the
    /// sync ring, then builds both again at the target size.
    fn recreate(&mut self) -> bool {
        if self.target.is_empty() {
            debug!("recreate deferred: zero-area target");
            return false;
        }
        let resume = self.phase;
        self.phase = FramePhase::Recreating;

        if let Err(e) = self.gpu.device_wait_idle() {
            error!(code = e.as_raw(), "device_wait_idle before recreate: {:?}", e);
        }
        self.swapchain.destroy(&self.gpu);
        self.sync.destroy(&self.gpu);

        let rebuilt = SyncPool::create(&self.gpu, self.frames_in_flight).and_then(|sync| {
            self.sync = sync;
            SwapchainState::create(&self.gpu, self.target)
        });
        self.phase = resume;
        match rebuilt {
            Ok(swapchain) => {
                self.swapchain = swapchain;
                self.valid = true;
                self.recreations += 1;
                info!(
                    "swapchain recreated ({}x{}, {} sync slots), {} total",
                    self.swapchain.extent.width,
                    self.swapchain.extent.height,
                    self.sync.len(),
                    self.recreations
                );
                true
            }
            Err(e) => {
                error!("swapchain recreation failed: {e}");
                self.valid = false;
                false
            }
        }
    }
}

// STRICT TEARDOWN ORDER:
// - wait every submit_done fence, then device idle
// - sync objects
// - transition command buffers, their pool, the swapchain
impl<G: Gpu> Drop for FrameCycle<G> {
    fn drop(&mut self) {
        if self.valid {
            if let Err(e) = self.sync.wait_idle(&self.gpu) {
                error!(code = e.as_raw(), "teardown wait_for_fences: {:?}", e);
            }
        }
        self.gpu.device_wait_idle().ok();
        self.sync.destroy(&self.gpu);
        self.swapchain.destroy(&self.gpu);
    }
}
