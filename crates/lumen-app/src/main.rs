// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod clear;
mod config;

use std::time::Instant;

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;
use clap::Parser;
use lumen_core::init_tracing;
use lumen_platform::surface_size;
use lumen_present::{FrameHints, Presenter, SurfaceSize};
use lumen_present_vk::{FramePhase, VkPresenter};
use tracing::{error, info};

use lumen_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::clear::{pulse, ClearRenderer};
use crate::config::{load_cfg, AppCfg, Args};

struct App {
    cfg: AppCfg,
    // Field order is drop order: the clear renderer uses the presenter's device.
    clear: Option<ClearRenderer>,
    presenter: Option<VkPresenter>,
    window: Option<Window>,
    size: SurfaceSize,

    exiting: bool,
    paused: bool,
    frames: u32,
    cycles: u64,
    started: Instant,
    last_fps_instant: Instant,
}

impl App {
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(p) = &self.presenter {
            info!(
                "exiting after {} cycle(s): {} presented, {} swapchain recreation(s)",
                self.cycles,
                p.frames_presented(),
                p.recreations()
            );
        }
        self.exiting = true;
        self.clear = None;
        self.presenter = None;
        self.window = None;
        event_loop.exit();
    }

    fn create_presenter(&mut self, window: &Window) -> Result<()> {
        let presenter = VkPresenter::new(window, window, self.size, self.cfg.engine_config())?;
        let clear = ClearRenderer::new(&presenter.handles(), presenter.image_usage())?;
        self.presenter = Some(presenter);
        self.clear = Some(clear);
        Ok(())
    }

    fn redraw(&mut self) {
        let (Some(presenter), Some(clear)) = (&mut self.presenter, &mut self.clear) else {
            return;
        };

        let image = presenter.acquire_next_image(FrameHints { size: self.size });
        // A skipped acquire hands back the previous image, which is not ours to touch.
        if presenter.phase() == FramePhase::Acquired {
            let color = if self.cfg.render.animate {
                pulse(
                    self.cfg.render.clear_color,
                    self.started.elapsed().as_secs_f32(),
                )
            } else {
                self.cfg.render.clear_color
            };
            if let Err(e) = clear.draw(vk::Image::from_raw(image.image), color) {
                error!("clear failed: {e:#}");
            }
        }
        if presenter.present_image(&image) {
            self.frames = self.frames.saturating_add(1);
        }
        self.cycles += 1;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attrs = Window::default_attributes()
                .with_title("lumen")
                .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height));
            let window = match event_loop.create_window(attrs) {
                Ok(w) => w,
                Err(e) => {
                    error!("create_window: {e}");
                    event_loop.exit();
                    return;
                }
            };
            self.size = surface_size(window.inner_size());

            if let Err(e) = self.create_presenter(&window) {
                error!("presenter init failed: {e:#}");
                event_loop.exit();
                return;
            }
            self.window = Some(window);
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        self.paused = self.size.is_empty();
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.size = surface_size(new_size);
                self.paused = self.size.is_empty();
                info!(
                    "Resized → {}x{} (paused={})",
                    self.size.width, self.size.height, self.paused
                );
                if let Some(p) = &mut self.presenter {
                    p.on_resize(self.size);
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.paused = occluded || self.size.is_empty();
                info!("Occluded={} → paused={}", occluded, self.paused);
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                self.redraw();
                if self.cfg.max_frames.is_some_and(|max| self.cycles >= max) {
                    self.shutdown(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.paused {
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // FIFO present paces the loop; just keep a redraw queued.
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config).with_args(&args);
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        size: cfg.window_size(),
        cfg,
        clear: None,
        presenter: None,
        window: None,
        exiting: false,
        paused: false,
        frames: 0,
        cycles: 0,
        started: Instant::now(),
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    Ok(())
}
