// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CString;

use anyhow::Result;
use ash::khr::swapchain;
use ash::vk;
use lumen_present::{FrameHints, PresentImage, Presenter, SurfaceSize};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::ash_gpu::AshGpu;
use crate::config::EngineConfig;
use crate::device::{create_logical_device, LogicalDeviceContext};
use crate::error::{PresentError, PresentResult};
use crate::frame::{FrameCycle, FramePhase};
use crate::instance::{InstanceContext, API_VERSION};
use crate::names::format_name;
use crate::selector::select_physical_device;

/// Everything a renderer needs to record work against the presenter's device.
/// The handles stay owned by the [`VkPresenter`]; do not destroy them.
#[derive(Clone)]
pub struct RendererHandles {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    pub enabled_device_extensions: Vec<CString>,
    pub api_version: u32,
}

/// Vulkan presentation engine for one window surface.
///
/// STRICT DROP ORDER (field order): frame cycle (sync objects, transition
/// buffers, swapchain), then the logical device, then surface/messenger/instance.
pub struct VkPresenter {
    cycle: FrameCycle<AshGpu>,
    device: LogicalDeviceContext,
    physical_device: vk::PhysicalDevice,
    enabled_extensions: Vec<CString>,
    instance: InstanceContext,
}

impl VkPresenter {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: SurfaceSize,
        config: EngineConfig,
    ) -> PresentResult<Self> {
        config.validate()?;
        let rwh = window
            .window_handle()
            .map_err(|e| PresentError::WindowHandle(e.to_string()))?
            .as_raw();
        let rdh = display
            .display_handle()
            .map_err(|e| PresentError::WindowHandle(e.to_string()))?
            .as_raw();

        // Locals drop in reverse on any early return: device, then instance.
        let instance = unsafe { InstanceContext::new(rdh, rwh, config.validation)? };
        let candidate = unsafe {
            select_physical_device(&instance.instance, &instance.surface_loader, instance.surface)?
        };
        let device = unsafe { create_logical_device(&instance.instance, &candidate)? };

        let gpu = AshGpu {
            device: device.device.clone(),
            swapchain_loader: swapchain::Device::new(&instance.instance, &device.device),
            surface_loader: instance.surface_loader.clone(),
            phys: candidate.handle,
            surface: instance.surface,
            queue: device.queue,
            queue_family: device.queue_family,
        };
        let cycle = FrameCycle::new(gpu, config.frames_in_flight, size)?;

        info!(
            "presenter ready on '{}': {}x{} {}, {} image(s), {} frame(s) in flight",
            candidate.name(),
            cycle.extent().width,
            cycle.extent().height,
            format_name(cycle.format()),
            cycle.image_count(),
            config.frames_in_flight
        );
        Ok(VkPresenter {
            cycle,
            device,
            physical_device: candidate.handle,
            enabled_extensions: candidate.enabled_extensions,
            instance,
        })
    }

    pub fn handles(&self) -> RendererHandles {
        RendererHandles {
            instance: self.instance.instance.clone(),
            physical_device: self.physical_device,
            device: self.device.device.clone(),
            queue: self.device.queue,
            queue_family_index: self.device.queue_family,
            enabled_device_extensions: self.enabled_extensions.clone(),
            api_version: API_VERSION,
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.cycle.extent()
    }

    pub fn format(&self) -> vk::Format {
        self.cycle.format()
    }

    pub fn image_count(&self) -> usize {
        self.cycle.image_count()
    }

    /// Usage the swapchain images were created with. Always includes
    /// COLOR_ATTACHMENT; TRANSFER_DST when the surface allows it.
    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        self.cycle.image_usage()
    }

    pub fn phase(&self) -> FramePhase {
        self.cycle.phase()
    }

    pub fn frames_presented(&self) -> u64 {
        self.cycle.frames_presented()
    }

    pub fn recreations(&self) -> u64 {
        self.cycle.recreations()
    }
}

impl Presenter for VkPresenter {
    fn create_surface(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: SurfaceSize,
    ) -> Result<Self> {
        Ok(Self::new(window, display, size, EngineConfig::from_env())?)
    }

    fn on_resize(&mut self, size: SurfaceSize) {
        self.cycle.on_resize(size);
    }

    fn acquire_next_image(&mut self, hints: FrameHints) -> PresentImage {
        self.cycle.acquire(hints)
    }

    fn present_image(&mut self, image: &PresentImage) -> bool {
        self.cycle.present(image)
    }

    fn is_valid(&self) -> bool {
        self.cycle.is_valid()
    }
}
