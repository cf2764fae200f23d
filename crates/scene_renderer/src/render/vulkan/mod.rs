//! Vulkan rendering backend
//!
//! Every handle class has an RAII wrapper here. Owners hold their children
//! in reverse dependency order so the default drop order is a valid teardown.

pub mod allocator;
pub mod barriers;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod frame;
pub mod framebuffer;
pub mod pipeline;
pub mod render_pass;
pub mod renderer;
pub mod resources;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex_layout;
pub mod window;

pub use allocator::{AllocationStats, MemoryAllocator, MemoryIntent};
pub use context::{VulkanContext, VulkanError, VulkanResult};
pub use frame::{FrameBackend, FrameLoop, FramePhase, FrameReport};
pub use renderer::SceneRenderer;
pub use resources::{BufferSet, ImageDescription, ImageSet};
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain, SwapchainChanges};
pub use upload::StagedUploader;
pub use window::{Window, WindowError};
