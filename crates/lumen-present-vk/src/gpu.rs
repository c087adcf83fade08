// SPDX-License-Identifier: CEPL-1.0
//! The device operations the presentation core needs, behind one trait so the
//! sync pool, swapchain manager and frame controller can run against either
//! the real ash device ([`crate::ash_gpu::AshGpu`]) or a scripted fake in tests.
//!
//! Every handle passed in must have been created through the same `Gpu`.
use ash::prelude::VkResult;
use ash::vk;

/// Swapchain creation parameters, fully resolved from surface capabilities.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

pub(crate) trait Gpu {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;

    fn create_swapchain(&self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// `Ok((index, suboptimal))`, mirroring `vkAcquireNextImageKHR` with an
    /// infinite timeout and no semaphore.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Fence,
    ) -> VkResult<(u32, bool)>;
    /// `Ok(suboptimal)`.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    fn create_command_pool(&self) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    /// Records COLOR_ATTACHMENT_OPTIMAL -> PRESENT_SRC_KHR for `image` into `cmd`.
    fn record_present_transition(&self, cmd: vk::CommandBuffer, image: vk::Image)
        -> VkResult<()>;
    fn queue_submit(
        &self,
        cmd: vk::CommandBuffer,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn fence_signaled(&self, fence: vk::Fence) -> VkResult<bool>;
    /// Blocks until every fence is signaled. No timeout.
    fn wait_for_fences(&self, fences: &[vk::Fence]) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn device_wait_idle(&self) -> VkResult<()>;
}
