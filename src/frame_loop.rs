// Frame loop - acquire, record, submit, present
//
// One frame in flight. The in-flight fence keeps the CPU from re-recording
// the command buffer while the GPU still reads it; the two semaphores order
// acquire -> render -> present on the GPU.
//
// The loop only sees the `FrameBackend` and `EventSource` traits, so the
// sequencing can be exercised without a GPU.

use ash::prelude::VkResult;
use ash::vk;

use crate::backend::FrameSync;
use crate::error::{RendererError, Result, VkResultExt};

/// Step of a frame, carried by frame errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    WaitPreviousFrame,
    AcquireImage,
    RecordCommands,
    Submit,
    Present,
}

/// The Vulkan calls a frame is made of.
pub trait FrameBackend {
    /// Block until the fence is signaled (no timeout).
    fn wait_for_fence(&mut self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()>;
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VkResult<u32>;
    fn record_commands(&mut self, image_index: u32) -> VkResult<()>;
    fn submit(
        &mut self,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VkResult<()>;
    fn wait_idle(&mut self) -> VkResult<()>;
}

/// Window events between frames.
pub trait EventSource {
    fn poll_events(&mut self);
    fn should_close(&self) -> bool;
}

/// Render and present one frame.
pub fn draw_frame(backend: &mut impl FrameBackend, sync: &FrameSync) -> Result<()> {
    backend
        .wait_for_fence(sync.in_flight)
        .map_err(RendererError::frame(FrameStage::WaitPreviousFrame))?;
    backend
        .reset_fence(sync.in_flight)
        .map_err(RendererError::frame(FrameStage::WaitPreviousFrame))?;

    let image_index = backend
        .acquire_next_image(sync.image_available)
        .map_err(RendererError::frame(FrameStage::AcquireImage))?;

    backend
        .record_commands(image_index)
        .map_err(RendererError::frame(FrameStage::RecordCommands))?;

    backend
        .submit(
            sync.image_available,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            sync.render_finished,
            sync.in_flight,
        )
        .map_err(RendererError::frame(FrameStage::Submit))?;

    backend
        .present(image_index, sync.render_finished)
        .map_err(RendererError::frame(FrameStage::Present))?;

    Ok(())
}

/// Draw frames until the window asks to close, then wait for the GPU to
/// finish. Returns the number of frames drawn.
pub fn run(
    events: &mut impl EventSource,
    backend: &mut impl FrameBackend,
    sync: &FrameSync,
) -> Result<u64> {
    log::info!("Entering the frame loop");
    let mut frames = 0u64;

    while !events.should_close() {
        draw_frame(backend, sync)?;
        frames += 1;
        events.poll_events();
    }

    backend
        .wait_idle()
        .or_fail("wait for the device to go idle")?;
    log::info!("Frame loop finished after {} frames", frames);

    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        WaitFence,
        ResetFence,
        Acquire(u32),
        Record(u32),
        Submit,
        Present(u32),
        WaitIdle,
    }

    /// Models the fence and the two binary semaphores the way the GPU would.
    struct RecordingBackend {
        sync: FrameSync,
        image_count: u32,
        next_image: u32,
        fence_signaled: bool,
        gpu_work_pending: bool,
        image_available_signaled: bool,
        render_finished_signaled: bool,
        calls: Vec<Call>,
        fail_acquire: Option<vk::Result>,
    }

    impl RecordingBackend {
        fn new(sync: FrameSync) -> Self {
            Self {
                sync,
                image_count: 3,
                next_image: 0,
                // Created signaled.
                fence_signaled: true,
                gpu_work_pending: false,
                image_available_signaled: false,
                render_finished_signaled: false,
                calls: Vec::new(),
                fail_acquire: None,
            }
        }

        /// The GPU finishes the submitted work and signals the fence.
        fn complete_gpu_work(&mut self) {
            if self.gpu_work_pending {
                self.gpu_work_pending = false;
                self.fence_signaled = true;
            }
        }
    }

    impl FrameBackend for RecordingBackend {
        fn wait_for_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
            assert_eq!(fence, self.sync.in_flight);
            self.calls.push(Call::WaitFence);
            // An infinite wait returns once the GPU is done.
            self.complete_gpu_work();
            if self.fence_signaled {
                Ok(())
            } else {
                // Nothing will ever signal it: the real wait would hang.
                Err(vk::Result::TIMEOUT)
            }
        }

        fn reset_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
            assert_eq!(fence, self.sync.in_flight);
            assert!(!self.gpu_work_pending, "reset while the GPU still uses the fence");
            self.calls.push(Call::ResetFence);
            self.fence_signaled = false;
            Ok(())
        }

        fn acquire_next_image(&mut self, signal: vk::Semaphore) -> VkResult<u32> {
            assert_eq!(signal, self.sync.image_available);
            if let Some(result) = self.fail_acquire {
                return Err(result);
            }
            assert!(!self.image_available_signaled, "semaphore signaled twice");
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            self.image_available_signaled = true;
            self.calls.push(Call::Acquire(index));
            Ok(index)
        }

        fn record_commands(&mut self, image_index: u32) -> VkResult<()> {
            assert!(!self.gpu_work_pending, "recording while the buffer is in flight");
            self.calls.push(Call::Record(image_index));
            Ok(())
        }

        fn submit(
            &mut self,
            wait: vk::Semaphore,
            wait_stage: vk::PipelineStageFlags,
            signal: vk::Semaphore,
            fence: vk::Fence,
        ) -> VkResult<()> {
            assert_eq!(wait, self.sync.image_available);
            assert_eq!(wait_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
            assert_eq!(signal, self.sync.render_finished);
            assert_eq!(fence, self.sync.in_flight);
            assert!(self.image_available_signaled, "submit would wait forever");
            assert!(!self.fence_signaled, "submitting with a signaled fence");

            self.image_available_signaled = false;
            self.render_finished_signaled = true;
            self.gpu_work_pending = true;
            self.calls.push(Call::Submit);
            Ok(())
        }

        fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> VkResult<()> {
            assert_eq!(wait, self.sync.render_finished);
            assert!(self.render_finished_signaled, "present before rendering finished");
            self.render_finished_signaled = false;
            self.calls.push(Call::Present(image_index));
            Ok(())
        }

        fn wait_idle(&mut self) -> VkResult<()> {
            self.complete_gpu_work();
            self.calls.push(Call::WaitIdle);
            Ok(())
        }
    }

    /// Asks to close after a fixed number of polls.
    struct ClosingAfter {
        polls_left: u32,
        polled: u32,
    }

    impl ClosingAfter {
        fn new(polls: u32) -> Self {
            Self {
                polls_left: polls,
                polled: 0,
            }
        }
    }

    impl EventSource for ClosingAfter {
        fn poll_events(&mut self) {
            self.polled += 1;
            self.polls_left = self.polls_left.saturating_sub(1);
        }

        fn should_close(&self) -> bool {
            self.polls_left == 0
        }
    }

    fn frame_sync() -> FrameSync {
        FrameSync {
            image_available: vk::Semaphore::from_raw(1),
            render_finished: vk::Semaphore::from_raw(2),
            in_flight: vk::Fence::from_raw(3),
        }
    }

    #[test]
    fn first_frame_does_not_block_and_runs_in_order() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);

        draw_frame(&mut backend, &sync).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::WaitFence,
                Call::ResetFence,
                Call::Acquire(0),
                Call::Record(0),
                Call::Submit,
                Call::Present(0),
            ]
        );
    }

    #[test]
    fn fence_stays_unsignaled_until_the_gpu_completes() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);

        draw_frame(&mut backend, &sync).unwrap();
        assert!(!backend.fence_signaled);
        assert!(backend.gpu_work_pending);

        backend.complete_gpu_work();
        assert!(backend.fence_signaled);
    }

    #[test]
    fn consecutive_frames_cycle_through_images() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);

        for _ in 0..4 {
            draw_frame(&mut backend, &sync).unwrap();
        }

        let presented: Vec<u32> = backend
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Present(index) => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(presented, vec![0, 1, 2, 0]);
        assert!(!backend.image_available_signaled);
        assert!(!backend.render_finished_signaled);
    }

    #[test]
    fn acquire_failure_names_its_stage_and_submits_nothing() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);
        backend.fail_acquire = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);

        let err = draw_frame(&mut backend, &sync).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Frame {
                stage: FrameStage::AcquireImage,
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
            }
        ));
        assert!(!backend.calls.contains(&Call::Submit));
    }

    #[test]
    fn never_signaled_fence_is_a_wait_error() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);
        backend.fence_signaled = false;

        let err = draw_frame(&mut backend, &sync).unwrap_err();
        assert!(matches!(
            err,
            RendererError::Frame {
                stage: FrameStage::WaitPreviousFrame,
                ..
            }
        ));
    }

    #[test]
    fn run_draws_until_close_then_waits_idle() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);
        let mut events = ClosingAfter::new(5);

        let frames = run(&mut events, &mut backend, &sync).unwrap();

        assert_eq!(frames, 5);
        assert_eq!(events.polled, 5);
        assert_eq!(backend.calls.last(), Some(&Call::WaitIdle));
        assert!(backend.fence_signaled);
    }

    #[test]
    fn closed_window_draws_nothing() {
        let sync = frame_sync();
        let mut backend = RecordingBackend::new(sync);
        let mut events = ClosingAfter::new(0);

        assert_eq!(run(&mut events, &mut backend, &sync).unwrap(), 0);
        assert_eq!(backend.calls, vec![Call::WaitIdle]);
    }
}
