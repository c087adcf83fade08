// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Construction-time failures. Once any of these is returned the engine is
/// unusable; per-frame anomalies never surface through this type.
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("window handle unavailable: {0}")]
    WindowHandle(String),

    #[error("instance creation failed: {0:?}")]
    InstanceCreation(vk::Result),

    #[error("surface creation failed: {0:?}")]
    SurfaceCreation(vk::Result),

    #[error("no compatible vulkan physical device (need graphics+present on one queue family and VK_KHR_swapchain)")]
    NoCompatibleDevice,

    #[error("device enumeration failed: {0:?}")]
    Enumeration(vk::Result),

    #[error("logical device creation failed: {0:?}")]
    DeviceCreation(vk::Result),

    #[error("synchronization object creation failed: {0:?}")]
    SyncCreation(vk::Result),

    #[error("swapchain creation failed: {0:?}")]
    SwapchainCreation(vk::Result),

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type PresentResult<T> = Result<T, PresentError>;
