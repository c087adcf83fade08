// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ash::vk::Handle;
use lumen_present::SurfaceSize;
use tracing::{debug, info};

use crate::error::{PresentError, PresentResult};
use crate::gpu::{Gpu, SwapchainPlan};
use crate::names::{color_space_name, format_name, present_mode_name};

/// 8-bit BGRA sRGB if the surface offers it, else whatever it lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// FIFO (vsync, never tears) if listed, else the first reported mode.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::FIFO) {
        vk::PresentModeKHR::FIFO
    } else {
        // An empty list would be a driver bug; FIFO is the one mode every surface must support.
        modes.first().copied().unwrap_or(vk::PresentModeKHR::FIFO)
    }
}

/// A fixed `current_extent` wins over the request; `u32::MAX` means the
/// surface size follows the swapchain, so clamp the request instead.
pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: SurfaceSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by max (0 == "no max").
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

fn composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&a| caps.supported_composite_alpha.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

fn image_usage(caps: &vk::SurfaceCapabilitiesKHR) -> vk::ImageUsageFlags {
    // TRANSFER_DST lets the renderer clear or blit straight into the image.
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    if caps
        .supported_usage_flags
        .contains(vk::ImageUsageFlags::TRANSFER_DST)
    {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    usage
}

pub fn plan_swapchain(
    caps: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    modes: &[vk::PresentModeKHR],
    want: SurfaceSize,
) -> PresentResult<SwapchainPlan> {
    let surface_format = choose_surface_format(formats).ok_or(PresentError::NoSurfaceFormats)?;
    Ok(SwapchainPlan {
        surface_format,
        present_mode: choose_present_mode(modes),
        extent: extent_from_caps(caps, want),
        min_image_count: image_count(caps),
        image_usage: image_usage(caps),
        pre_transform: caps.current_transform,
        composite_alpha: composite_alpha(caps),
    })
}

/// A live swapchain plus the per-image command buffers that move an image
/// into PRESENT_SRC_KHR. `images` and `transitions` are index-aligned.
///
/// Never patched in place: recreation destroys the whole state and builds a
/// new one.
pub(crate) struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub image_usage: vk::ImageUsageFlags,
    /// The size that was asked for, which may differ from `extent`.
    pub requested: SurfaceSize,
    command_pool: vk::CommandPool,
    transitions: Vec<vk::CommandBuffer>,
}

impl SwapchainState {
    pub fn create<G: Gpu>(gpu: &G, requested: SurfaceSize) -> PresentResult<Self> {
        let caps = gpu
            .surface_capabilities()
            .map_err(PresentError::SwapchainCreation)?;
        let formats = gpu
            .surface_formats()
            .map_err(PresentError::SwapchainCreation)?;
        let modes = gpu
            .surface_present_modes()
            .map_err(PresentError::SwapchainCreation)?;

        let plan = plan_swapchain(&caps, &formats, &modes, requested)?;

        let handle = gpu
            .create_swapchain(&plan)
            .map_err(PresentError::SwapchainCreation)?;

        // From here on partial state is torn down through `destroy`.
        let mut state = SwapchainState {
            handle,
            images: Vec::new(),
            surface_format: plan.surface_format,
            extent: plan.extent,
            present_mode: plan.present_mode,
            image_usage: plan.image_usage,
            requested,
            command_pool: vk::CommandPool::null(),
            transitions: Vec::new(),
        };
        if let Err(e) = state.populate(gpu) {
            state.destroy(gpu);
            return Err(PresentError::SwapchainCreation(e));
        }

        info!(
            "swapchain: format {} / {}, present_mode {}, extent {}x{} (requested {}x{}), images(min={} → asked={} → got={})",
            format_name(state.surface_format.format),
            color_space_name(state.surface_format.color_space),
            present_mode_name(state.present_mode),
            state.extent.width,
            state.extent.height,
            requested.width,
            requested.height,
            caps.min_image_count,
            plan.min_image_count,
            state.images.len(),
        );
        Ok(state)
    }

    fn populate<G: Gpu>(&mut self, gpu: &G) -> ash::prelude::VkResult<()> {
        self.images = gpu.swapchain_images(self.handle)?;
        self.command_pool = gpu.create_command_pool()?;
        self.transitions =
            gpu.allocate_command_buffers(self.command_pool, self.images.len() as u32)?;
        for (&cmd, &image) in self.transitions.iter().zip(&self.images) {
            gpu.record_present_transition(cmd, image)?;
        }
        debug!(
            "recorded {} present-transition command buffers",
            self.transitions.len()
        );
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn transition(&self, image_index: u32) -> vk::CommandBuffer {
        self.transitions[image_index as usize]
    }

    pub fn image_index_of(&self, raw: u64) -> Option<u32> {
        self.images
            .iter()
            .position(|i| i.as_raw() == raw)
            .map(|i| i as u32)
    }

    /// Frees the transition buffers and their pool, then the swapchain itself
    /// (which takes the driver-owned images with it). The device must be idle.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if self.command_pool != vk::CommandPool::null() {
            gpu.free_command_buffers(self.command_pool, &self.transitions);
            gpu.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }
        self.transitions.clear();
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            gpu.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}
