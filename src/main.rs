//! Nozzle Scope - main entry point
//!
//! Parses the command line, then drives the winit event loop: keyboard
//! shortcuts, redraw pacing, and teardown on quit. Move the print head
//! with your machine-control software; this window only shows the nozzle
//! against the reticle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use nozzle_scope::app::AppOptions;
use nozzle_scope::camera::CameraCapture;
use nozzle_scope::view::{Rotation, ViewSettings, MIN_ZOOM};
use nozzle_scope::App;

const WINDOW_TITLE: &str = "Nozzle Scope";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 800;
/// Window redraw rate. Camera refresh is paced separately by --delay.
const UI_FPS: u32 = 60;

#[derive(Parser, Debug)]
#[command(version, about = "Manual nozzle-centering camera viewer with a reticle overlay")]
struct Args {
    /// Index of the USB camera to open. Adjust if the wrong camera shows up
    #[arg(long, default_value_t = 0)]
    camera_index: u32,

    /// Mirror the image in the horizontal axis
    #[arg(long)]
    mirror_h: bool,

    /// Mirror the image in the vertical axis
    #[arg(long)]
    mirror_v: bool,

    /// Swap the image axes
    #[arg(long)]
    swap_xy: bool,

    /// Rotate the image, in degrees. Multiples of 90 only, negatives allowed
    #[arg(
        long,
        default_value = "0",
        value_parser = parse_rotation,
        allow_negative_numbers = true
    )]
    rotate: Rotation,

    /// Initial digital zoom divisor
    #[arg(long, default_value_t = 1)]
    zoom: u32,

    /// Seconds between displayed frame updates
    #[arg(
        long,
        default_value_t = 0.5,
        value_parser = parse_delay,
        allow_negative_numbers = true
    )]
    delay: f64,

    /// List available cameras and exit
    #[arg(long)]
    list_cameras: bool,
}

fn parse_rotation(s: &str) -> Result<Rotation, String> {
    let degrees: i32 = s.parse().map_err(|_| format!("'{s}' is not an integer"))?;
    Rotation::from_degrees(degrees)
        .ok_or_else(|| "rotation must be a multiple of 90 degrees".to_string())
}

fn parse_delay(s: &str) -> Result<f64, String> {
    let delay: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if delay.is_finite() && delay >= 0.0 {
        Ok(delay)
    } else {
        Err("delay must be a non-negative number of seconds".to_string())
    }
}

/// Application state machine
enum AppState {
    /// Initial state before the window is created
    Uninitialized,
    /// Window and graphics context are ready
    Running { window: Arc<Window>, app: App },
}

/// Main application handler implementing winit's ApplicationHandler trait
struct NozzleScope {
    state: AppState,
    options: Option<AppOptions>,
    next_redraw_at: Instant,
}

impl NozzleScope {
    fn new(options: AppOptions) -> Self {
        Self {
            state: AppState::Uninitialized,
            options: Some(options),
            next_redraw_at: Instant::now(),
        }
    }
}

impl ApplicationHandler for NozzleScope {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(options) = self.options.take() else {
            return;
        };

        log::info!("Creating window...");

        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .expect("Failed to create window"),
        );

        log::info!("Initializing wgpu and egui...");
        let app = pollster::block_on(App::new(window.clone(), options));

        log::info!("Nozzle Scope ready");
        log::info!("Keys: H/V mirror, S swap axes, R rotate, +/- or 1-8 zoom, Q quit");

        self.state = AppState::Running { window, app };
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Running { window, app } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } if !egui_consumed => match key_code {
                KeyCode::KeyQ | KeyCode::Escape => {
                    log::info!("Quitting");
                    event_loop.exit();
                }
                KeyCode::F11 => {
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                    } else {
                        window.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                    }
                }
                KeyCode::KeyH => app.toggle_mirror_h(),
                KeyCode::KeyV => app.toggle_mirror_v(),
                KeyCode::KeyS => app.toggle_swap_axes(),
                KeyCode::KeyR => app.step_rotation(),
                KeyCode::Equal | KeyCode::NumpadAdd => app.zoom_in(),
                KeyCode::Minus | KeyCode::NumpadSubtract => app.zoom_out(),
                KeyCode::Digit1 => app.set_zoom(1),
                KeyCode::Digit2 => app.set_zoom(2),
                KeyCode::Digit3 => app.set_zoom(3),
                KeyCode::Digit4 => app.set_zoom(4),
                KeyCode::Digit5 => app.set_zoom(5),
                KeyCode::Digit6 => app.set_zoom(6),
                KeyCode::Digit7 => app.set_zoom(7),
                KeyCode::Digit8 => app.set_zoom(8),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
            }

            WindowEvent::RedrawRequested => {
                app.update_frame();

                match app.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        log::warn!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory!");
                        event_loop.exit();
                    }
                    Err(e) => {
                        log::warn!("Surface error: {e:?}");
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running { window, .. } = &mut self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        let frame_duration = Duration::from_nanos(1_000_000_000u64 / UI_FPS as u64);
        let now = Instant::now();

        if now >= self.next_redraw_at {
            window.request_redraw();
            self.next_redraw_at += frame_duration;

            // Reset if too far behind
            if now > self.next_redraw_at + frame_duration * 2 {
                self.next_redraw_at = now + frame_duration;
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_redraw_at));
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.list_cameras {
        let cameras = CameraCapture::list_cameras();
        if cameras.is_empty() {
            println!("No cameras found");
        } else {
            for cam in cameras {
                println!("{}: {}", cam.index, cam.name);
            }
        }
        return Ok(());
    }

    let mut settings = ViewSettings {
        mirror_h: args.mirror_h,
        mirror_v: args.mirror_v,
        swap_axes: args.swap_xy,
        rotation: args.rotate,
        zoom: MIN_ZOOM,
    };
    settings.set_zoom(args.zoom);

    let options = AppOptions {
        camera_index: args.camera_index,
        settings,
        refresh_interval: Duration::from_secs_f64(args.delay),
    };

    log::info!("Nozzle Scope v{}", env!("CARGO_PKG_VERSION"));

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut handler = NozzleScope::new(options);
    event_loop.run_app(&mut handler).context("event loop error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["nozzle-scope"]).unwrap();
        assert_eq!(args.camera_index, 0);
        assert!(!args.mirror_h);
        assert!(!args.mirror_v);
        assert!(!args.swap_xy);
        assert_eq!(args.rotate, Rotation::R0);
        assert_eq!(args.zoom, 1);
        assert_eq!(args.delay, 0.5);
    }

    #[test]
    fn test_rotate_accepts_multiples_of_90() {
        let args = Args::try_parse_from(["nozzle-scope", "--rotate", "270"]).unwrap();
        assert_eq!(args.rotate, Rotation::R270);

        let args = Args::try_parse_from(["nozzle-scope", "--rotate", "-630"]).unwrap();
        assert_eq!(args.rotate, Rotation::R90);
    }

    #[test]
    fn test_rotate_rejects_other_angles() {
        assert!(Args::try_parse_from(["nozzle-scope", "--rotate", "45"]).is_err());
        assert!(Args::try_parse_from(["nozzle-scope", "--rotate", "ninety"]).is_err());
    }

    #[test]
    fn test_delay_rejects_negative() {
        assert!(Args::try_parse_from(["nozzle-scope", "--delay", "-0.5"]).is_err());
    }
}
