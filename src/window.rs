// Window - winit collaborator for the frame loop
//
// The event loop is pumped from our own loop instead of handing control to
// winit, so the renderer keeps the classic poll-draw structure. The window is
// created hidden and non-resizable; it is shown once Vulkan is ready.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::config::WindowConfig;
use crate::error::{RendererError, Result};
use crate::frame_loop::EventSource;

// Pumps allowed before the platform has delivered `resumed`.
const MAX_STARTUP_PUMPS: usize = 64;

/// Whether an event asks the application to quit.
fn is_close_event(event: &WindowEvent) -> bool {
    match event {
        WindowEvent::CloseRequested => true,
        WindowEvent::KeyboardInput { event, .. } => {
            event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
        }
        _ => false,
    }
}

struct WindowState {
    config: WindowConfig,
    window: Option<Window>,
    creation_error: Option<OsError>,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.creation_error.is_some() {
            return;
        }

        let attributes = WindowAttributes::default()
            .with_title(&self.config.title)
            .with_inner_size(LogicalSize::new(self.config.width, self.config.height))
            .with_resizable(false)
            .with_visible(false);

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                log::error!("[WINDOW] Failed to create window: {}", e);
                self.creation_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if is_close_event(&event) {
            log::info!("Close requested, shutting down...");
            self.close_requested = true;
        }
    }
}

pub struct AppWindow {
    state: WindowState,
    exited: bool,
    event_loop: EventLoop<()>,
}

impl AppWindow {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().map_err(|e| {
            log::error!("[WINDOW] Failed to create the event loop: {}", e);
            e
        })?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut this = Self {
            state: WindowState {
                config: config.clone(),
                window: None,
                creation_error: None,
                close_requested: false,
            },
            exited: false,
            event_loop,
        };

        // The window is created from `resumed`, delivered by the first pumps.
        for _ in 0..MAX_STARTUP_PUMPS {
            if this.state.window.is_some() || this.exited {
                break;
            }
            this.pump();
        }

        if let Some(e) = this.state.creation_error.take() {
            return Err(RendererError::WindowCreation(e));
        }
        if this.state.window.is_none() {
            return Err(RendererError::WindowClosed);
        }

        log::info!(
            "Created window \"{}\" ({}x{})",
            config.title,
            config.width,
            config.height
        );
        Ok(this)
    }

    fn pump(&mut self) {
        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state)
        {
            log::debug!("[WINDOW] Event loop exited with code {}", code);
            self.exited = true;
        }
    }

    pub fn show(&self) {
        if let Some(window) = &self.state.window {
            window.set_visible(true);
        }
    }

    /// Framebuffer size in pixels.
    pub fn framebuffer_size(&self) -> vk::Extent2D {
        let size = self
            .state
            .window
            .as_ref()
            .map(Window::inner_size)
            .unwrap_or_default();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    pub fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let window = self.state.window.as_ref().ok_or(RendererError::WindowClosed)?;
        Ok((window.raw_display_handle(), window.raw_window_handle()))
    }
}

impl EventSource for AppWindow {
    fn poll_events(&mut self) {
        self.pump();
    }

    fn should_close(&self) -> bool {
        self.state.close_requested || self.exited
    }
}
