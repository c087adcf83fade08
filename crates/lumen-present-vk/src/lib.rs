// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for [`lumen_present::Presenter`]: instance and surface,
//! physical device scoring, a single graphics+present queue, the swapchain
//! and a ring of per-frame fences/semaphores.
//!
//! The renderer draws; this crate only moves each finished image
//! (COLOR_ATTACHMENT_OPTIMAL) to PRESENT_SRC_KHR and queues it for display.
#![deny(unsafe_op_in_unsafe_fn)]

mod ash_gpu;
mod config;
mod device;
mod error;
mod frame;
mod gpu;
mod instance;
mod names;
mod presenter;
mod selector;
mod swapchain;
mod sync;

#[cfg(test)]
mod fake;

pub use config::{EngineConfig, DEFAULT_FRAMES_IN_FLIGHT};
pub use device::{create_logical_device, unique_queue_families, LogicalDeviceContext};
pub use error::{PresentError, PresentResult};
pub use frame::FramePhase;
pub use gpu::SwapchainPlan;
pub use presenter::{RendererHandles, VkPresenter};
pub use selector::{
    evaluate, select_best, DeviceInfo, DeviceScore, PhysicalDeviceCandidate, QueueFamilySupport,
    PORTABILITY_SUBSET,
};
pub use swapchain::{
    choose_present_mode, choose_surface_format, extent_from_caps, image_count, plan_swapchain,
};
