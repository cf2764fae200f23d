//! Vulkan context management
//!
//! Instance, debug messenger, surface, physical device selection and the
//! logical device. Everything else in the renderer borrows from a single
//! [`VulkanContext`] that is created first and dropped last.

use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Device, Entry, Instance};
use thiserror::Error;

use crate::render::vulkan::window::Window;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Memory allocation failed
    #[error("Out of memory: {requested} bytes ({result:?})")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
        /// Result code returned by the allocator
        result: vk::Result,
    },

    /// A buffer or image with no extent was requested
    #[error("Refusing to create zero-sized {resource}")]
    ZeroSizedResource {
        /// Kind of resource that was requested
        resource: &'static str,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A SPIR-V file could not be read
    #[error("Failed to read shader {path}: {source}")]
    ShaderLoad {
        /// Shader path as configured
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The device was lost; nothing can be recovered
    #[error("Device lost")]
    DeviceLost,
}

impl VulkanError {
    /// Classify an API result, separating device loss from ordinary failures
    pub fn from_result(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Api(other),
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, optionally with the validation layer
    pub fn new(app_name: &str, required_extensions: &[String], enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".to_string()))?;
        let engine_name_cstr = c"SceneRenderer";
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Extension name contains NUL".to_string()))?;

        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let validation = enable_validation && Self::validation_layer_available(&entry);
        if enable_validation && !validation {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let mut layer_names: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layer_names.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let debug_utils = if validation {
            let loader = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!("Vulkan instance created (validation: {})", validation);

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name == VALIDATION_LAYER
                })
            })
            .unwrap_or(false)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(debug_message_severities())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(VulkanError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Every severity is subscribed; the `log` filter decides what is shown
fn debug_message_severities() -> vk::DebugUtilsMessageSeverityFlagsEXT {
    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
}

/// `log` level for a validation message severity
fn debug_log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::Level::Error
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::Level::Warn
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::Level::Debug
    } else {
        log::Level::Trace
    }
}

/// Routes validation messages into the `log` facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    log::log!(debug_log_level(message_severity), "[Vulkan] {:?} - {}", message_type, message);

    vk::FALSE
}

/// What a queue family can do, as far as device selection cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySupport {
    /// Family supports graphics (and therefore transfer) work
    pub graphics: bool,
    /// Family can present to the target surface
    pub present: bool,
}

/// Graphics and present family indices; equal when one family does both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for rendering and uploads
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Distinct family indices, in the order graphics, present
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Pick queue families: one family doing both wins, otherwise the first
/// graphics family and the first present-capable family are recorded separately.
pub fn select_queue_families(families: &[QueueFamilySupport]) -> Option<QueueFamilyIndices> {
    if let Some(index) = families.iter().position(|f| f.graphics && f.present) {
        let index = index as u32;
        return Some(QueueFamilyIndices { graphics: index, present: index });
    }

    let graphics = families.iter().position(|f| f.graphics)?;
    let present = families.iter().position(|f| f.present)?;
    Some(QueueFamilyIndices {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Device facts that feed the suitability score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Physical device type reported by the driver
    pub device_type: vk::PhysicalDeviceType,
    /// Highest API version the device supports
    pub api_version: u32,
    /// `VK_KHR_swapchain` is available (ignored for headless contexts)
    pub has_swapchain: bool,
    /// Non-uniform sampled image indexing, runtime arrays and partial binding
    pub has_descriptor_indexing: bool,
    /// A usable graphics/present family pair exists
    pub has_queue_families: bool,
}

/// Score a device; `None` means unusable
pub fn score_device(candidate: &DeviceCandidate) -> Option<u32> {
    let version_ok = vk::api_version_major(candidate.api_version) > 1
        || vk::api_version_minor(candidate.api_version) >= 2;

    if !version_ok || !candidate.has_swapchain || !candidate.has_descriptor_indexing || !candidate.has_queue_families {
        return None;
    }

    let score = match candidate.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 500,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        _ => 1,
    };
    Some(score)
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Chosen queue families
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Select the highest scoring device; `surface` is `None` for headless use
    pub fn select_suitable_device(
        instance: &Instance,
        surface: Option<(vk::SurfaceKHR, &Surface)>,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let mut best: Option<(u32, Self)> = None;
        for device in devices {
            let Some((score, info)) = Self::evaluate_device(instance, device, surface)? else {
                continue;
            };
            log::debug!("GPU candidate {} scored {}", info.name(), score);
            if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                best = Some((score, info));
            }
        }

        let (_, info) = best.ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;
        log::info!(
            "Selected GPU: {} (graphics family {}, present family {})",
            info.name(),
            info.queue_families.graphics,
            info.queue_families.present
        );
        Ok(info)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<(vk::SurfaceKHR, &Surface)>,
    ) -> VulkanResult<Option<(u32, Self)>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut support = Vec::with_capacity(families.len());
        for (index, family) in families.iter().enumerate() {
            let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let present = match surface {
                Some((surface, loader)) => unsafe {
                    loader.get_physical_device_surface_support(device, index as u32, surface)
                }
                .map_err(VulkanError::Api)?,
                None => graphics,
            };
            support.push(QueueFamilySupport { graphics, present });
        }
        let queue_families = select_queue_families(&support);

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }.map_err(VulkanError::Api)?;
        let has_swapchain = surface.is_none()
            || extensions.iter().any(|available| {
                let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                name == SwapchainLoader::name()
            });

        let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut indexing).build();
        if properties.api_version >= vk::API_VERSION_1_1 {
            unsafe { instance.get_physical_device_features2(device, &mut features2) };
        }
        let has_descriptor_indexing = indexing.shader_sampled_image_array_non_uniform_indexing == vk::TRUE
            && indexing.runtime_descriptor_array == vk::TRUE
            && indexing.descriptor_binding_partially_bound == vk::TRUE;

        let candidate = DeviceCandidate {
            device_type: properties.device_type,
            api_version: properties.api_version,
            has_swapchain,
            has_descriptor_indexing,
            has_queue_families: queue_families.is_some(),
        };

        Ok(score_device(&candidate).zip(queue_families).map(|(score, queue_families)| {
            (
                score,
                Self {
                    device,
                    properties,
                    features,
                    memory_properties,
                    queue_families,
                },
            )
        }))
    }

    /// Driver-reported device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Whether anisotropic filtering can be enabled
    pub fn supports_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    /// Anisotropic filtering was enabled at creation
    pub anisotropy_enabled: bool,
}

impl LogicalDevice {
    /// Create a new logical device with required queues and features
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo, with_swapchain: bool) -> VulkanResult<Self> {
        let families = physical_device_info.queue_families;
        let unique_families: HashSet<u32> = families.unique().into_iter().collect();

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let mut required_extensions = Vec::new();
        if with_swapchain {
            required_extensions.push(SwapchainLoader::name().as_ptr());
        }

        let anisotropy_enabled = physical_device_info.supports_anisotropy();
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(anisotropy_enabled)
            .build();

        let mut indexing_features = vk::PhysicalDeviceDescriptorIndexingFeatures::builder()
            .shader_sampled_image_array_non_uniform_indexing(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features)
            .push_next(&mut indexing_features);

        let device = unsafe { instance.create_device(physical_device_info.device, &create_info, None) }
            .map_err(VulkanError::Api)?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            anisotropy_enabled,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Field order is drop order: the surface is destroyed in `Drop`, then the
/// device, then the instance.
pub struct VulkanContext {
    surface: Option<vk::SurfaceKHR>,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context presenting to `window`
    pub fn new(window: &mut Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let required_extensions = window
            .get_required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e)))?;

        let instance = VulkanInstance::new(app_name, &required_extensions, enable_validation)?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device =
            match PhysicalDeviceInfo::select_suitable_device(&instance.instance, Some((surface, &surface_loader))) {
                Ok(info) => info,
                Err(e) => {
                    unsafe { surface_loader.destroy_surface(surface, None) };
                    return Err(e);
                }
            };

        let device = match LogicalDevice::new(&instance.instance, &physical_device, true) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        Ok(Self {
            surface: Some(surface),
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Create a context with no surface, for uploads and read-backs without a window
    pub fn new_headless(app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(app_name, &[], enable_validation)?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance, None)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device, false)?;

        Ok(Self {
            surface: None,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface handle, if this context presents
    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the raw Device handle
    pub fn raw_device(&self) -> &Device {
        &self.device.device
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the chosen queue family indices
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(VulkanError::from_result)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            if let Some(surface) = self.surface.take() {
                self.surface_loader.destroy_surface(surface, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_messages_map_to_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        let subscribed = debug_message_severities();
        for severity in [Severity::VERBOSE, Severity::INFO, Severity::WARNING, Severity::ERROR] {
            assert!(subscribed.contains(severity));
        }

        assert_eq!(debug_log_level(Severity::ERROR), log::Level::Error);
        assert_eq!(debug_log_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(debug_log_level(Severity::INFO), log::Level::Debug);
        assert_eq!(debug_log_level(Severity::VERBOSE), log::Level::Trace);
    }

    fn family(graphics: bool, present: bool) -> QueueFamilySupport {
        QueueFamilySupport { graphics, present }
    }

    fn candidate(device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            device_type,
            api_version: vk::make_api_version(0, 1, 3, 0),
            has_swapchain: true,
            has_descriptor_indexing: true,
            has_queue_families: true,
        }
    }

    #[test]
    fn test_single_family_preferred_when_it_does_both() {
        let families = [family(true, false), family(false, true), family(true, true)];
        let indices = select_queue_families(&families).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn test_split_families_recorded_separately() {
        let families = [family(false, true), family(true, false)];
        let indices = select_queue_families(&families).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 0 });
        assert_eq!(indices.unique(), vec![1, 0]);
    }

    #[test]
    fn test_no_present_family_is_unsuitable() {
        assert!(select_queue_families(&[family(true, false)]).is_none());
        assert!(select_queue_families(&[]).is_none());
    }

    #[test]
    fn test_discrete_outscores_integrated() {
        let discrete = score_device(&candidate(vk::PhysicalDeviceType::DISCRETE_GPU)).unwrap();
        let integrated = score_device(&candidate(vk::PhysicalDeviceType::INTEGRATED_GPU)).unwrap();
        let cpu = score_device(&candidate(vk::PhysicalDeviceType::CPU)).unwrap();
        assert!(discrete > integrated);
        assert!(integrated > cpu);
    }

    #[test]
    fn test_missing_requirements_reject_device() {
        let mut old = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        old.api_version = vk::make_api_version(0, 1, 1, 0);
        assert_eq!(score_device(&old), None);

        let mut no_swapchain = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.has_swapchain = false;
        assert_eq!(score_device(&no_swapchain), None);

        let mut no_indexing = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_indexing.has_descriptor_indexing = false;
        assert_eq!(score_device(&no_indexing), None);
    }

    #[test]
    fn test_device_lost_is_classified() {
        assert!(matches!(
            VulkanError::from_result(vk::Result::ERROR_DEVICE_LOST),
            VulkanError::DeviceLost
        ));
        assert!(matches!(
            VulkanError::from_result(vk::Result::ERROR_INITIALIZATION_FAILED),
            VulkanError::Api(_)
        ));
    }
}
