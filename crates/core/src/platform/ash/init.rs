use crate::platform::ash::{AshCreateInfo, AshExtensions};
use anyhow::anyhow;
use ash::Entry;
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::vk::{
	ApplicationInfo, Bool32, DebugUtilsMessageSeverityFlagsEXT, DebugUtilsMessageTypeFlagsEXT,
	DebugUtilsMessengerCallbackDataEXT, DebugUtilsMessengerCreateInfoEXT, DeviceCreateInfo, DeviceQueueCreateInfo,
	InstanceCreateInfo, PhysicalDeviceFeatures, PhysicalDeviceType, PhysicalDeviceVulkan13Features, QueueFlags,
	ValidationFeatureEnableEXT, ValidationFeaturesEXT,
};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::ffi::{CStr, CString, c_void};

pub fn required_features() -> PhysicalDeviceFeatures {
	PhysicalDeviceFeatures::default()
}

pub fn required_features_vk13() -> PhysicalDeviceVulkan13Features<'static> {
	PhysicalDeviceVulkan13Features::default().synchronization2(true)
}

pub const LAYER_VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Debuggers {
	#[default]
	None,
	RenderDoc,
	Validation,
	GpuAssistedValidation,
	DebugPrintf,
}

#[derive(Copy, Clone, Debug)]
pub struct AppConfig<'a> {
	pub name: &'a str,
	pub version: u32,
}

impl Default for AppConfig<'_> {
	fn default() -> Self {
		Self {
			name: "Unknown App",
			version: 0,
		}
	}
}

pub const fn compile_time_parse(input: &'static str) -> u32 {
	match konst::primitive::parse_u32(input) {
		Ok(e) => e,
		Err(_) => panic!("cargo version component is not a number"),
	}
}

/// An [`AppConfig`] named and versioned after the calling crate.
#[macro_export]
macro_rules! app_config_from_cargo {
	() => {
		$crate::platform::ash::init::AppConfig {
			name: env!("CARGO_PKG_NAME"),
			version: $crate::__private::make_api_version(
				0,
				$crate::platform::ash::init::compile_time_parse(env!("CARGO_PKG_VERSION_MAJOR")),
				$crate::platform::ash::init::compile_time_parse(env!("CARGO_PKG_VERSION_MINOR")),
				$crate::platform::ash::init::compile_time_parse(env!("CARGO_PKG_VERSION_PATCH")),
			),
		}
	};
}

pub struct AshSingleGraphicsQueueCreateInfo<'a> {
	pub app: AppConfig<'a>,
	pub instance_extensions: &'a [&'a CStr],
	pub extensions: &'a [&'a CStr],
	pub features: PhysicalDeviceFeatures,
	pub features_vk13: PhysicalDeviceVulkan13Features<'static>,
	pub debug: Debuggers,
	pub debug_callback: Option<&'a DebugUtilsMessengerCreateInfoEXT<'a>>,
}

impl Default for AshSingleGraphicsQueueCreateInfo<'_> {
	fn default() -> Self {
		Self {
			app: Default::default(),
			instance_extensions: &[],
			extensions: &[swapchain::NAME],
			features: required_features(),
			features_vk13: required_features_vk13(),
			debug: Debuggers::default(),
			debug_callback: None,
		}
	}
}

/// Creates an [`AshCreateInfo`] with any GPU (preferring dedicated) and its single graphics queue. Pass the surface
/// extensions of your windowing system as `instance_extensions` to be able to present.
///
/// If any of the steps were to fail during initialization, this method currently does not clean up after itself
/// correctly. It will only destroy itself correctly if the entire initialization succeeds.
pub fn ash_init_single_graphics_queue(mut create_info: AshSingleGraphicsQueueCreateInfo) -> anyhow::Result<AshCreateInfo> {
	unsafe {
		if matches!(create_info.debug, Debuggers::RenderDoc) {
			// renderdoc does not yet support wayland
			std::env::remove_var("WAYLAND_DISPLAY");
			std::env::set_var("ENABLE_VULKAN_RENDERDOC_CAPTURE", "1");
		}
		let entry = Entry::load()?;

		let instance = {
			let mut layers = SmallVec::<[_; 1]>::new();
			let mut validation_features = SmallVec::<[_; 4]>::new();

			let (debug_enable, validation_feature) = match create_info.debug {
				Debuggers::Validation => (true, None),
				Debuggers::GpuAssistedValidation => (true, Some(ValidationFeatureEnableEXT::GPU_ASSISTED)),
				Debuggers::DebugPrintf => (true, Some(ValidationFeatureEnableEXT::DEBUG_PRINTF)),
				_ => (false, None),
			};
			if debug_enable {
				layers.push(LAYER_VALIDATION.as_ptr());
				if let Some(validation_feature) = validation_feature {
					validation_features.extend_from_slice(&[
						validation_feature,
						ValidationFeatureEnableEXT::GPU_ASSISTED_RESERVE_BINDING_SLOT,
					]);
				}
			}

			let extensions = create_info
				.instance_extensions
				.iter()
				.copied()
				.chain([debug_utils::NAME])
				.map(|c| c.as_ptr())
				.collect::<SmallVec<[_; 3]>>();

			let app_name = CString::new(create_info.app.name)?;
			entry.create_instance(
				&InstanceCreateInfo::default()
					.application_info(
						&ApplicationInfo::default()
							.application_name(&app_name)
							.application_version(create_info.app.version)
							.engine_name(c"framekeeper")
							.engine_version(1)
							.api_version(ash::vk::make_api_version(0, 1, 3, 0)),
					)
					.enabled_extension_names(&extensions)
					.enabled_layer_names(&layers)
					.push_next(&mut ValidationFeaturesEXT::default().enabled_validation_features(&validation_features)),
				None,
			)?
		};

		let debug_instance = debug_utils::Instance::new(&entry, &instance);
		let debug_messager = {
			let default_callback = DebugUtilsMessengerCreateInfoEXT::default()
				.message_severity(
					DebugUtilsMessageSeverityFlagsEXT::ERROR
						| DebugUtilsMessageSeverityFlagsEXT::WARNING
						| DebugUtilsMessageSeverityFlagsEXT::INFO,
				)
				.message_type(
					DebugUtilsMessageTypeFlagsEXT::GENERAL
						| DebugUtilsMessageTypeFlagsEXT::VALIDATION
						| DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
				)
				.pfn_user_callback(Some(default_debug_callback));
			debug_instance
				.create_debug_utils_messenger(create_info.debug_callback.unwrap_or(&default_callback), None)?
		};

		let physical_device = {
			instance
				.enumerate_physical_devices()?
				.into_iter()
				.min_by_key(|phy| match instance.get_physical_device_properties(*phy).device_type {
					PhysicalDeviceType::DISCRETE_GPU => 1,
					PhysicalDeviceType::VIRTUAL_GPU => 2,
					PhysicalDeviceType::INTEGRATED_GPU => 3,
					PhysicalDeviceType::CPU => 4,
					_ => 5,
				})
				.ok_or(anyhow!("No physical devices available"))?
		};
		log::info!(
			"Selected physical device {:?}",
			instance
				.get_physical_device_properties(physical_device)
				.device_name_as_c_str()
				.unwrap_or(c"unknown")
		);

		let queue_family_index = {
			instance
				.get_physical_device_queue_family_properties(physical_device)
				.into_iter()
				.enumerate()
				.find(|(_, prop)| prop.queue_flags.contains(QueueFlags::GRAPHICS))
				.ok_or(anyhow!("No graphics queues on physical device available"))?
				.0 as u32
		};

		let device = {
			let extensions = create_info.extensions.iter().map(|x| x.as_ptr()).collect::<Vec<_>>();
			instance.create_device(
				physical_device,
				&DeviceCreateInfo::default()
					.enabled_features(&create_info.features)
					.enabled_extension_names(&extensions)
					.push_next(&mut create_info.features_vk13)
					.queue_create_infos(&[DeviceQueueCreateInfo::default()
						.queue_family_index(queue_family_index)
						.queue_priorities(&[1.])]),
				None,
			)?
		};

		let queue = device.get_device_queue(queue_family_index, 0);
		let memory_allocator = Allocator::new(&AllocatorCreateDesc {
			instance: instance.clone(),
			device: device.clone(),
			physical_device,
			debug_settings: AllocatorDebugSettings::default(),
			buffer_device_address: false,
			allocation_sizes: AllocationSizes::default(),
		})?;

		let debug_utils = Some(debug_utils::Device::new(&instance, &device));

		let surface = create_info
			.instance_extensions
			.contains(&surface::NAME)
			.then(|| surface::Instance::new(&entry, &instance));

		let swapchain = create_info
			.extensions
			.contains(&swapchain::NAME)
			.then(|| swapchain::Device::new(&instance, &device));

		Ok(AshCreateInfo {
			entry,
			instance,
			physical_device,
			device,
			queue_family_index,
			queue: Mutex::new(queue),
			memory_allocator: Some(Mutex::new(memory_allocator)),
			extensions: AshExtensions {
				debug_utils,
				surface,
				swapchain,
			},
			destroy: Some(Box::new(move |create_info| {
				let instance = &create_info.instance;
				let device = &create_info.device;

				create_info.extensions = AshExtensions::default();
				drop(create_info.memory_allocator.take());
				device.destroy_device(None);
				debug_instance.destroy_debug_utils_messenger(debug_messager, None);
				instance.destroy_instance(None);
			})),
		})
	}
}

/// All child objects created on device must have been destroyed prior to destroying device
/// https://vulkan.lunarg.com/doc/view/1.3.296.0/linux/1.3-extensions/vkspec.html#VUID-vkDestroyDevice-device-05137
const VUID_VK_DESTROY_DEVICE_DEVICE_05137: i32 = 0x4872eaa0;

const IGNORED_MSG_IDS: &[i32] = &[VUID_VK_DESTROY_DEVICE_DEVICE_05137];

unsafe extern "system" fn default_debug_callback(
	message_severity: DebugUtilsMessageSeverityFlagsEXT,
	message_type: DebugUtilsMessageTypeFlagsEXT,
	callback_data: *const DebugUtilsMessengerCallbackDataEXT<'_>,
	_p_user_data: *mut c_void,
) -> Bool32 {
	unsafe {
		let callback_data = *callback_data;
		let message_id_number = callback_data.message_id_number;
		if IGNORED_MSG_IDS.contains(&message_id_number) {
			return false.into();
		}
		let message_id_name = callback_data
			.message_id_name_as_c_str()
			.map_or(Cow::Borrowed(""), CStr::to_string_lossy);
		let message = callback_data
			.message_as_c_str()
			.map_or(Cow::Borrowed("No message"), CStr::to_string_lossy);
		let args = format!("{message_type:?} [{message_id_name} ({message_id_number:#x})]: {message}");

		if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::ERROR) {
			log::error!("{}", args);
		} else if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::WARNING) {
			log::warn!("{}", args);
		} else if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::INFO) {
			log::info!("{}", args);
		} else {
			log::debug!("{}", args);
		}

		false.into()
	}
}
