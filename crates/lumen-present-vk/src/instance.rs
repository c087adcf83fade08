// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr};

use ash::ext::debug_utils;
use ash::khr::{portability_enumeration, surface};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, warn};

use crate::error::{PresentError, PresentResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"lumen";

pub(crate) const API_VERSION: u32 = vk::API_VERSION_1_1;

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {}", msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {}", msg);
    } else {
        debug!("[vulkan] {}", msg);
    }
    vk::FALSE
}

/// Instance, debug messenger and window surface.
///
/// STRICT TEARDOWN ORDER (drop): surface, then messenger, then instance. The
/// logical device and swapchain must already be gone.
pub(crate) struct InstanceContext {
    entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn has_instance_extension(props: &[vk::ExtensionProperties], name: &CStr) -> bool {
    props
        .iter()
        .any(|e| e.extension_name_as_c_str().map_or(false, |n| n == name))
}

impl InstanceContext {
    /// Creates the instance with the WSI extensions this display needs, then
    /// the surface for `window` from that same instance.
    ///
    /// # Safety
    /// The handles must refer to a live window/display that outlives the
    /// returned context.
    pub unsafe fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        validation: bool,
    ) -> PresentResult<Self> {
        let entry = Entry::linked();

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(PresentError::InstanceCreation)?;

        let mut ext_vec: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .map_err(PresentError::InstanceCreation)?
            .to_vec();

        let mut flags = vk::InstanceCreateFlags::empty();
        if has_instance_extension(&available, portability_enumeration::NAME) {
            ext_vec.push(portability_enumeration::NAME.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let layer_present = validation
            && unsafe { entry.enumerate_instance_layer_properties() }
                .unwrap_or_default()
                .iter()
                .any(|l| l.layer_name_as_c_str().map_or(false, |n| n == VALIDATION_LAYER));
        let debug_ext = layer_present && has_instance_extension(&available, debug_utils::NAME);
        if validation && !layer_present {
            warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
        if debug_ext {
            ext_vec.push(debug_utils::NAME.as_ptr());
        }
        let layers = [VALIDATION_LAYER.as_ptr()];

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: APP_NAME.as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: APP_NAME.as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: API_VERSION,
            ..Default::default()
        };
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            flags,
            p_application_info: &app_info,
            enabled_extension_count: ext_vec.len() as u32,
            pp_enabled_extension_names: ext_vec.as_ptr(),
            enabled_layer_count: if layer_present { layers.len() as u32 } else { 0 },
            pp_enabled_layer_names: layers.as_ptr(),
            ..Default::default()
        };

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(PresentError::InstanceCreation)?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        // Owned from here on, so any later failure still destroys the instance.
        let mut ctx = InstanceContext {
            entry,
            instance,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
            debug: None,
        };

        if debug_ext {
            let loader = debug_utils::Instance::new(&ctx.entry, &ctx.instance);
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            // A missing messenger only costs diagnostics.
            match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
                Ok(m) => ctx.debug = Some((loader, m)),
                Err(e) => warn!("debug messenger unavailable: {:?}", e),
            }
        }

        ctx.surface = unsafe {
            ash_window::create_surface(&ctx.entry, &ctx.instance, display, window, None)
        }
        .map_err(PresentError::SurfaceCreation)?;

        info!(
            "instance ready: {} extension(s), validation={}",
            ext_vec.len(),
            ctx.debug.is_some()
        );
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &CStr) -> vk::ExtensionProperties {
        let mut p = vk::ExtensionProperties::default();
        for (dst, &src) in p.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as c_char;
        }
        p
    }

    #[test]
    fn finds_listed_instance_extensions() {
        let props = [ext(surface::NAME), ext(debug_utils::NAME)];
        assert!(has_instance_extension(&props, debug_utils::NAME));
        assert!(!has_instance_extension(&props, portability_enumeration::NAME));
    }
}
