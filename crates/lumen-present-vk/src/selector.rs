// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection.
//!
//! Querying the driver ([`query_devices`]) is kept apart from the decision
//! ([`evaluate`], [`select_best`]) so the scoring rules are plain functions.
use std::ffi::{CStr, CString};

use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, info};

use crate::error::{PresentError, PresentResult};
use crate::names::device_type_name;

pub const PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// Everything the selector looks at for one physical device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
    pub queue_families: Vec<QueueFamilySupport>,
}

/// Compared field by field: a discrete GPU beats any integrated one, then
/// VK_KHR_get_memory_requirements2 support, then the larger max 2D image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeviceScore {
    pub discrete: bool,
    pub memory_requirements2: bool,
    pub max_image_dimension_2d: u32,
}

impl DeviceScore {
    pub const DISCRETE_BONUS: u64 = 1 << 30;
    pub const MEMORY_REQUIREMENTS2_BONUS: u64 = 1 << 29;

    /// Single-integer form of the score, for logs.
    pub fn packed(&self) -> u64 {
        let mut score = u64::from(self.max_image_dimension_2d);
        if self.discrete {
            score += Self::DISCRETE_BONUS;
        }
        if self.memory_requirements2 {
            score += Self::MEMORY_REQUIREMENTS2_BONUS;
        }
        score
    }
}

#[derive(Clone, Debug)]
pub struct PhysicalDeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    /// Extensions to enable on the logical device.
    pub enabled_extensions: Vec<CString>,
    pub graphics_queue_family: u32,
    /// Always equal to `graphics_queue_family`; kept separate so the device
    /// manager can dedupe families the usual way.
    pub present_queue_family: u32,
    pub score: DeviceScore,
}

impl PhysicalDeviceCandidate {
    pub fn name(&self) -> String {
        device_name(&self.properties)
    }
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string())
}

/// Scores one device, or `None` if it cannot present to the surface.
pub fn evaluate(info: &DeviceInfo) -> Option<PhysicalDeviceCandidate> {
    // Graphics and present must share a family; the swapchain is EXCLUSIVE.
    let family = info
        .queue_families
        .iter()
        .position(|q| q.graphics && q.present)? as u32;

    let has = |name: &CStr| info.extensions.iter().any(|e| e.as_c_str() == name);
    if !has(swapchain::NAME) {
        return None;
    }

    let mut enabled_extensions = vec![swapchain::NAME.to_owned()];
    // Must be enabled whenever the device exposes it (MoltenVK and friends).
    if has(PORTABILITY_SUBSET) {
        enabled_extensions.push(PORTABILITY_SUBSET.to_owned());
    }
    let memory_requirements2 = has(ash::khr::get_memory_requirements2::NAME);
    if memory_requirements2 {
        enabled_extensions.push(ash::khr::get_memory_requirements2::NAME.to_owned());
    }

    Some(PhysicalDeviceCandidate {
        handle: info.handle,
        properties: info.properties,
        features: info.features,
        enabled_extensions,
        graphics_queue_family: family,
        present_queue_family: family,
        score: DeviceScore {
            discrete: info.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            memory_requirements2,
            max_image_dimension_2d: info.properties.limits.max_image_dimension2_d,
        },
    })
}

/// Highest score wins; on a tie the device enumerated first is kept.
pub fn select_best(devices: &[DeviceInfo]) -> PresentResult<PhysicalDeviceCandidate> {
    let mut best: Option<PhysicalDeviceCandidate> = None;
    for info in devices {
        let name = device_name(&info.properties);
        let Some(candidate) = evaluate(info) else {
            debug!("device '{}': not eligible", name);
            continue;
        };
        debug!(
            "device '{}' ({}): score {} {:?}",
            name,
            device_type_name(info.properties.device_type),
            candidate.score.packed(),
            candidate.score
        );
        if best.as_ref().map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }
    best.ok_or(PresentError::NoCompatibleDevice)
}

/// # Safety
/// `surface` must belong to `instance`, and `surface_loader` must be loaded from it.
pub(crate) unsafe fn query_devices(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> PresentResult<Vec<DeviceInfo>> {
    let physical = unsafe { instance.enumerate_physical_devices() }
        .map_err(PresentError::Enumeration)?;
    debug!("{} physical device(s)", physical.len());

    let mut out = Vec::with_capacity(physical.len());
    for phys in physical {
        let (properties, features, qprops, ext_props) = unsafe {
            (
                instance.get_physical_device_properties(phys),
                instance.get_physical_device_features(phys),
                instance.get_physical_device_queue_family_properties(phys),
                // A device that cannot list extensions is treated as having none.
                instance
                    .enumerate_device_extension_properties(phys)
                    .unwrap_or_default(),
            )
        };

        let queue_families = qprops
            .iter()
            .enumerate()
            .map(|(i, q)| QueueFamilySupport {
                graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: unsafe {
                    surface_loader.get_physical_device_surface_support(phys, i as u32, surface)
                }
                .unwrap_or(false),
            })
            .collect();

        let extensions = ext_props
            .iter()
            .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect();

        out.push(DeviceInfo {
            handle: phys,
            properties,
            features,
            extensions,
            queue_families,
        });
    }
    Ok(out)
}

/// # Safety
/// See [`query_devices`].
pub(crate) unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> PresentResult<PhysicalDeviceCandidate> {
    let devices = unsafe { query_devices(instance, surface_loader, surface)? };
    let best = select_best(&devices)?;
    info!(
        "selected '{}' ({}), queue family {}, score {}, extensions {:?}",
        best.name(),
        device_type_name(best.properties.device_type),
        best.graphics_queue_family,
        best.score.packed(),
        best.enabled_extensions
    );
    Ok(best)
}
