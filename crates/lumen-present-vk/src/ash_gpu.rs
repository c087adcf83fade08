// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::vk;

use crate::gpu::{Gpu, SwapchainPlan};

/// [`Gpu`] over a live ash device. Holds clones of the function tables only;
/// the device, surface and instance are owned and destroyed by
/// [`crate::presenter::VkPresenter`], which drops this after everything that
/// uses it.
pub(crate) struct AshGpu {
    pub(crate) device: ash::Device,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) surface_loader: surface::Instance,
    pub(crate) phys: vk::PhysicalDevice,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) queue: vk::Queue,
    pub(crate) queue_family: u32,
}

// SAFETY (all methods): handles passed in were created by this device, and the
// frame controller is the only user of `queue`, from a single thread.
impl Gpu for AshGpu {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
        }
    }

    fn create_swapchain(&self, plan: &SwapchainPlan) -> VkResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: plan.min_image_count,
            image_format: plan.surface_format.format,
            image_color_space: plan.surface_format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: plan.image_usage,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE, // single queue family
            pre_transform: plan.pre_transform,
            composite_alpha: plan.composite_alpha,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            // The previous swapchain is always destroyed before a new one is made.
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                signal,
            )
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.queue_present(self.queue, &present) }
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: self.queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&pool_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn record_present_transition(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
    ) -> VkResult<()> {
        // Replayed every time its image is presented.
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
            ..Default::default()
        };
        let subrange = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        // The renderer hands the image back in COLOR_ATTACHMENT_OPTIMAL.
        let barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::MEMORY_READ,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image,
            subresource_range: subrange,
            ..Default::default()
        };
        unsafe {
            self.device.begin_command_buffer(cmd, &begin)?;
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            );
            self.device.end_command_buffer(cmd)
        }
    }

    fn queue_submit(
        &self,
        cmd: vk::CommandBuffer,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), fence)
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&fence_ci, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VkResult<bool> {
        unsafe { self.device.get_fence_status(fence) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        if fences.is_empty() {
            return Ok(());
        }
        unsafe { self.device.wait_for_fences(fences, true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence)) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let sem_ci = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&sem_ci, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}
