//! Per-frame control flow
//!
//! [`FrameLoop`] drives one iteration of acquire, wait, record, submit and
//! present against a [`FrameBackend`], and owns the resize flag. The GPU work
//! behind each step lives in the backend, so the control flow itself can be
//! exercised with a mock.

use crate::render::vulkan::swapchain::{AcquireOutcome, PresentOutcome};
use crate::render::vulkan::VulkanResult;

/// The GPU operations one frame is made of
pub trait FrameBackend {
    /// Acquire the next swapchain image
    fn acquire(&mut self) -> VulkanResult<AcquireOutcome>;

    /// Wait on the image slot's fence, then unsignal it
    fn wait_and_reset(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Record the slot's command buffer from scratch
    fn record(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Submit the slot's command buffer, signaling its fence
    fn submit(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Present the rendered image
    fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Rebuild the swapchain and everything that depends on it
    ///
    /// Returns `false` when the window has no drawable area (minimised), in
    /// which case nothing was rebuilt and the caller should try again later.
    fn recreate_swapchain(&mut self) -> VulkanResult<bool>;
}

/// Where the loop is within an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames
    Idle,
    /// Waiting for a swapchain image
    Acquiring,
    /// Recording the command buffer
    Recording,
    /// Command buffer handed to the queue
    Submitted,
    /// Image handed to the presentation engine
    Presenting,
}

/// What an iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameReport {
    /// A frame was recorded, submitted and presented
    Rendered,
    /// The swapchain was out of date; nothing was submitted
    Skipped,
    /// The window has no drawable area; the caller should block on events
    Deferred,
}

/// Frame state machine
#[derive(Debug)]
pub struct FrameLoop {
    phase: FramePhase,
    resize_requested: bool,
    frames_rendered: u64,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    /// Start idle with no resize pending
    pub fn new() -> Self {
        Self {
            phase: FramePhase::Idle,
            resize_requested: false,
            frames_rendered: 0,
        }
    }

    /// Ask for the swapchain to be rebuilt before the next frame
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Whether a rebuild is pending
    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Current phase
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frames presented so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Run one iteration
    ///
    /// A pending resize is handled first. An out-of-date acquire ends the
    /// iteration without recording and leaves a resize pending; a present
    /// that reports the chain stale does the same for the next iteration.
    pub fn run_frame<B: FrameBackend>(&mut self, backend: &mut B) -> VulkanResult<FrameReport> {
        if self.resize_requested {
            if !backend.recreate_swapchain()? {
                return Ok(FrameReport::Deferred);
            }
            self.resize_requested = false;
        }

        self.phase = FramePhase::Acquiring;
        let image_index = match backend.acquire() {
            Ok(AcquireOutcome::Ready(index)) => index,
            Ok(AcquireOutcome::OutOfDate) => {
                log::debug!("Swapchain out of date at acquire");
                self.phase = FramePhase::Idle;
                self.resize_requested = true;
                return Ok(FrameReport::Skipped);
            }
            Err(e) => {
                self.phase = FramePhase::Idle;
                return Err(e);
            }
        };

        let result = self.render_acquired(backend, image_index);
        self.phase = FramePhase::Idle;
        result
    }

    fn render_acquired<B: FrameBackend>(&mut self, backend: &mut B, image_index: u32) -> VulkanResult<FrameReport> {
        backend.wait_and_reset(image_index)?;

        self.phase = FramePhase::Recording;
        backend.record(image_index)?;

        self.phase = FramePhase::Submitted;
        backend.submit(image_index)?;

        self.phase = FramePhase::Presenting;
        if backend.present(image_index)? == PresentOutcome::NeedsResize {
            log::debug!("Swapchain stale at present");
            self.resize_requested = true;
        }

        self.frames_rendered += 1;
        Ok(FrameReport::Rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::VulkanError;

    #[derive(Default)]
    struct MockBackend {
        calls: Vec<String>,
        acquire_results: Vec<AcquireOutcome>,
        present_results: Vec<PresentOutcome>,
        drawable: bool,
        fail_submit: bool,
    }

    impl MockBackend {
        fn drawable() -> Self {
            Self {
                drawable: true,
                ..Self::default()
            }
        }

        fn names(&self) -> Vec<&str> {
            self.calls.iter().map(String::as_str).collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn acquire(&mut self) -> VulkanResult<AcquireOutcome> {
            self.calls.push("acquire".into());
            Ok(if self.acquire_results.is_empty() {
                AcquireOutcome::Ready(0)
            } else {
                self.acquire_results.remove(0)
            })
        }

        fn wait_and_reset(&mut self, image_index: u32) -> VulkanResult<()> {
            self.calls.push(format!("wait {image_index}"));
            Ok(())
        }

        fn record(&mut self, image_index: u32) -> VulkanResult<()> {
            self.calls.push(format!("record {image_index}"));
            Ok(())
        }

        fn submit(&mut self, image_index: u32) -> VulkanResult<()> {
            self.calls.push(format!("submit {image_index}"));
            if self.fail_submit {
                return Err(VulkanError::DeviceLost);
            }
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
            self.calls.push(format!("present {image_index}"));
            Ok(if self.present_results.is_empty() {
                PresentOutcome::Presented
            } else {
                self.present_results.remove(0)
            })
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<bool> {
            self.calls.push("recreate".into());
            Ok(self.drawable)
        }
    }

    #[test]
    fn test_normal_frame_runs_every_step_in_order() {
        let mut backend = MockBackend::drawable();
        backend.acquire_results.push(AcquireOutcome::Ready(2));
        let mut frame_loop = FrameLoop::new();

        let report = frame_loop.run_frame(&mut backend).unwrap();

        assert_eq!(report, FrameReport::Rendered);
        assert_eq!(backend.names(), vec!["acquire", "wait 2", "record 2", "submit 2", "present 2"]);
        assert_eq!(frame_loop.phase(), FramePhase::Idle);
        assert_eq!(frame_loop.frames_rendered(), 1);
    }

    #[test]
    fn test_out_of_date_acquire_skips_record_submit_present() {
        let mut backend = MockBackend::drawable();
        backend.acquire_results.push(AcquireOutcome::OutOfDate);
        let mut frame_loop = FrameLoop::new();

        let report = frame_loop.run_frame(&mut backend).unwrap();

        assert_eq!(report, FrameReport::Skipped);
        assert_eq!(backend.names(), vec!["acquire"]);
        assert!(frame_loop.resize_requested());
        assert_eq!(frame_loop.phase(), FramePhase::Idle);
        assert_eq!(frame_loop.frames_rendered(), 0);

        // The next iteration rebuilds first, then renders
        let report = frame_loop.run_frame(&mut backend).unwrap();
        assert_eq!(report, FrameReport::Rendered);
        assert_eq!(backend.calls[1], "recreate");
        assert!(!frame_loop.resize_requested());
    }

    #[test]
    fn test_stale_present_requests_resize_for_next_frame() {
        let mut backend = MockBackend::drawable();
        backend.present_results.push(PresentOutcome::NeedsResize);
        let mut frame_loop = FrameLoop::new();

        assert_eq!(frame_loop.run_frame(&mut backend).unwrap(), FrameReport::Rendered);
        assert!(frame_loop.resize_requested());
        assert!(!backend.names().contains(&"recreate"));

        frame_loop.run_frame(&mut backend).unwrap();
        assert_eq!(backend.names()[5], "recreate");
    }

    #[test]
    fn test_minimised_window_defers_until_drawable() {
        let mut backend = MockBackend::default();
        let mut frame_loop = FrameLoop::new();
        frame_loop.request_resize();

        assert_eq!(frame_loop.run_frame(&mut backend).unwrap(), FrameReport::Deferred);
        assert_eq!(frame_loop.run_frame(&mut backend).unwrap(), FrameReport::Deferred);
        assert!(frame_loop.resize_requested());
        assert_eq!(backend.names(), vec!["recreate", "recreate"]);

        backend.drawable = true;
        assert_eq!(frame_loop.run_frame(&mut backend).unwrap(), FrameReport::Rendered);
        assert!(!frame_loop.resize_requested());
    }

    #[test]
    fn test_fatal_error_propagates_and_returns_to_idle() {
        let mut backend = MockBackend::drawable();
        backend.fail_submit = true;
        let mut frame_loop = FrameLoop::new();

        let result = frame_loop.run_frame(&mut backend);

        assert!(matches!(result, Err(VulkanError::DeviceLost)));
        assert_eq!(frame_loop.phase(), FramePhase::Idle);
        assert!(!backend.names().iter().any(|c| c.starts_with("present")));
    }
}
