// SPDX-License-Identifier: CEPL-1.0
use std::collections::BTreeSet;

use ash::vk;
use tracing::info;

use crate::error::{PresentError, PresentResult};
use crate::selector::PhysicalDeviceCandidate;

/// Logical device and the one queue used for both the transition submits and
/// presentation. Destroys the device on drop; everything created from it must
/// be gone by then.
pub struct LogicalDeviceContext {
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,
}

impl Drop for LogicalDeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}

/// One queue per distinct family. Graphics and present share a family by
/// construction, so this is always a single entry today.
pub fn unique_queue_families(candidate: &PhysicalDeviceCandidate) -> BTreeSet<u32> {
    [
        candidate.graphics_queue_family,
        candidate.present_queue_family,
    ]
    .into_iter()
    .collect()
}

/// # Safety
/// `candidate.handle` must be a physical device enumerated from `instance`.
pub unsafe fn create_logical_device(
    instance: &ash::Instance,
    candidate: &PhysicalDeviceCandidate,
) -> PresentResult<LogicalDeviceContext> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = unique_queue_families(candidate)
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts: Vec<*const std::ffi::c_char> = candidate
        .enabled_extensions
        .iter()
        .map(|e| e.as_ptr())
        .collect();

    // No optional features are needed to present.
    let features = vk::PhysicalDeviceFeatures::default();
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    let device = unsafe { instance.create_device(candidate.handle, &dinfo, None) }
        .map_err(PresentError::DeviceCreation)?;
    let queue = unsafe { device.get_device_queue(candidate.graphics_queue_family, 0) };

    info!(
        "logical device ready: queue family {}, {} extension(s)",
        candidate.graphics_queue_family,
        device_exts.len()
    );
    Ok(LogicalDeviceContext {
        device,
        queue,
        queue_family: candidate.graphics_queue_family,
    })
}
