//! Application state holding the wgpu graphics context
//!
//! Owns the surface, device, and queue, the texture the processed camera
//! frame is uploaded to, and the egui overlay with the view controls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::CameraCapture;
use crate::view::{self, reticle, ViewSettings, MAX_ZOOM, MIN_ZOOM};

/// Startup configuration resolved from the command line.
#[derive(Clone, Copy, Debug)]
pub struct AppOptions {
    pub camera_index: u32,
    pub settings: ViewSettings,
    /// Minimum time between displayed frame updates
    pub refresh_interval: Duration,
}

/// Main application state
pub struct App {
    /// Reference to the window
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    /// Current window size in physical pixels
    size: PhysicalSize<u32>,

    // Camera capture
    camera: Option<CameraCapture>,
    frame_texture: Option<wgpu::Texture>,
    frame_bind_group: Option<wgpu::BindGroup>,
    last_seq: u64,

    // Display state
    settings: ViewSettings,
    initial_settings: ViewSettings,
    last_applied: ViewSettings,
    refresh_interval: Duration,
    last_refresh: Instant,
    /// Dimensions of the frame currently on screen, after transforms
    display_size: (u32, u32),

    // Frame blit pipeline
    blit_pipeline: wgpu::RenderPipeline,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Frame timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Create a new App instance with an initialized wgpu context and the
    /// initial camera connected.
    pub async fn new(window: Arc<Window>, options: AppOptions) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find suitable GPU adapter");

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Nozzle Scope Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);

        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        log::info!("Surface format: {:?}", surface_format);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };

        surface.configure(&device, &config);

        // Nearest filtering keeps single-pixel reticle lines crisp when the
        // frame is stretched to the window.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Passthrough Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/passthrough.wgsl").into()),
        });

        let blit_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let blit_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Frame Pipeline Layout"),
                bind_group_layouts: &[&blit_bind_group_layout],
                push_constant_ranges: &[],
            });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Frame Pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let now = Instant::now();

        let mut app = Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            camera: None,
            frame_texture: None,
            frame_bind_group: None,
            last_seq: 0,
            settings: options.settings,
            initial_settings: options.settings,
            last_applied: options.settings,
            refresh_interval: options.refresh_interval,
            // Backdated so the first captured frame shows immediately
            last_refresh: now.checked_sub(options.refresh_interval).unwrap_or(now),
            display_size: (0, 0),
            blit_pipeline,
            blit_bind_group_layout,
            sampler,
            egui_ctx,
            egui_state,
            egui_renderer,
            fps: 0.0,
            last_fps_update: now,
            frames_since_update: 0,
        };

        app.connect_camera(options.camera_index);
        app
    }

    /// Handle a window event, returning true if egui consumed it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Connect to a camera
    pub fn connect_camera(&mut self, camera_index: u32) {
        log::info!("Connecting to camera {camera_index}");

        match CameraCapture::start(camera_index) {
            Ok(capture) => {
                self.camera = Some(capture);
                self.frame_texture = None;
                self.frame_bind_group = None;
                self.last_seq = 0;
            }
            Err(e) => {
                log::error!("Failed to connect camera: {e}");
            }
        }
    }

    /// Disconnect the current camera
    pub fn disconnect_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            camera.stop();
        }
        self.frame_texture = None;
        self.frame_bind_group = None;
        self.display_size = (0, 0);
        log::info!("Camera disconnected");
    }

    pub fn toggle_mirror_h(&mut self) {
        self.settings.mirror_h = !self.settings.mirror_h;
        log::info!("Mirror horizontal: {}", self.settings.mirror_h);
    }

    pub fn toggle_mirror_v(&mut self) {
        self.settings.mirror_v = !self.settings.mirror_v;
        log::info!("Mirror vertical: {}", self.settings.mirror_v);
    }

    pub fn toggle_swap_axes(&mut self) {
        self.settings.swap_axes = !self.settings.swap_axes;
        log::info!("Swap axes: {}", self.settings.swap_axes);
    }

    pub fn step_rotation(&mut self) {
        self.settings.rotation = self.settings.rotation.step_cw();
        log::info!("Rotation: {} degrees", self.settings.rotation.degrees());
    }

    pub fn set_zoom(&mut self, zoom: u32) {
        self.settings.set_zoom(zoom);
        log::info!("Zoom: {}x", self.settings.zoom);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.settings.zoom + 1);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.settings.zoom.saturating_sub(1));
    }

    /// Restore the view settings the program was launched with.
    pub fn reset_view(&mut self) {
        self.settings = self.initial_settings;
        log::info!("View reset");
    }

    /// Poll the capture thread and, if a new frame is due (refresh interval
    /// elapsed, or the view settings changed), run the transform pipeline,
    /// burn the reticle, and upload the result to the frame texture.
    pub fn update_frame(&mut self) {
        let Some(camera) = &self.camera else { return };

        let settings_changed = self.settings != self.last_applied;
        let refresh_due = self.last_refresh.elapsed() >= self.refresh_interval;
        if !refresh_due && !settings_changed {
            return;
        }

        let Some(frame) = camera.latest_frame() else { return };
        if frame.seq == self.last_seq && !settings_changed {
            return;
        }
        self.last_seq = frame.seq;
        self.last_applied = self.settings;
        self.last_refresh = Instant::now();

        let mut processed = view::apply(&self.settings, &frame.image);
        reticle::draw_centered(&mut processed);
        self.display_size = (processed.width, processed.height);
        self.upload_frame(&processed);
    }

    fn upload_frame(&mut self, frame: &view::FrameImage) {
        let needs_new_texture = match &self.frame_texture {
            None => true,
            Some(tex) => {
                let size = tex.size();
                size.width != frame.width || size.height != frame.height
            }
        };

        if needs_new_texture {
            log::debug!("Creating frame texture: {}x{}", frame.width, frame.height);

            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Frame Texture"),
                size: wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Frame Bind Group"),
                layout: &self.blit_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            self.frame_texture = Some(texture);
            self.frame_bind_group = Some(bind_group);
        }

        if let Some(texture) = &self.frame_texture {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &frame.data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.width * 4),
                    rows_per_image: Some(frame.height),
                },
                wgpu::Extent3d {
                    width: frame.width,
                    height: frame.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    /// Render a frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(bind_group) = &self.frame_bind_group {
                render_pass.set_pipeline(&self.blit_pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
        }

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        // Copy state egui will edit, so the closure doesn't borrow self
        let mut mirror_h = self.settings.mirror_h;
        let mut mirror_v = self.settings.mirror_v;
        let mut swap_axes = self.settings.swap_axes;
        let mut zoom = self.settings.zoom;
        let mut refresh_secs = self.refresh_interval.as_secs_f32();
        let rotation_degrees = self.settings.rotation.degrees();
        let (h_label, v_label) = self.settings.axis_labels();

        let fps = self.fps;
        let display_size = self.display_size;
        let camera_connected = self.camera.is_some();
        let capture_running = self.camera.as_ref().map(|c| c.is_running()).unwrap_or(false);
        let camera_frame_count = self.camera.as_ref().map(|c| c.frame_count()).unwrap_or(0);
        let available_cameras = if camera_connected {
            Vec::new()
        } else {
            CameraCapture::list_cameras()
        };

        let mut rotate_clicked = false;
        let mut reset_clicked = false;
        let mut connect_camera_index: Option<u32> = None;
        let mut disconnect_camera = false;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::TopBottomPanel::top("status").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Nozzle Scope");
                    ui.separator();
                    ui.label(format!("FPS: {fps:.1}"));
                    if camera_connected {
                        ui.separator();
                        ui.label(format!("Frames: {camera_frame_count}"));
                    }
                    if display_size.0 > 0 {
                        ui.separator();
                        ui.label(format!("{}x{}", display_size.0, display_size.1));
                    }
                });
            });

            egui::SidePanel::left("controls").show(ctx, |ui| {
                ui.heading("Camera");
                ui.separator();

                if camera_connected {
                    if capture_running {
                        ui.label("Camera connected");
                        ui.label(format!("Frames: {camera_frame_count}"));
                    } else {
                        ui.label("Capture stopped (see log)");
                    }
                    if ui.button("Disconnect").clicked() {
                        disconnect_camera = true;
                    }
                } else if available_cameras.is_empty() {
                    ui.label("No cameras found");
                } else {
                    ui.label("Available cameras:");
                    for cam in &available_cameras {
                        if ui.button(format!("{}: {}", cam.index, cam.name)).clicked() {
                            connect_camera_index = Some(cam.index);
                        }
                    }
                }

                ui.separator();
                ui.heading("View");
                ui.separator();

                ui.checkbox(&mut mirror_h, "Mirror horizontal (H)");
                ui.checkbox(&mut mirror_v, "Mirror vertical (V)");
                ui.checkbox(&mut swap_axes, "Swap axes (S)");

                ui.horizontal(|ui| {
                    ui.label(format!("Rotation: {rotation_degrees}\u{b0}"));
                    if ui.button("Rotate 90\u{b0} (R)").clicked() {
                        rotate_clicked = true;
                    }
                });

                ui.add(egui::Slider::new(&mut zoom, MIN_ZOOM..=MAX_ZOOM).text("Zoom"));

                ui.add(
                    egui::Slider::new(&mut refresh_secs, 0.05..=2.0)
                        .text("Refresh (s)")
                        .logarithmic(true),
                );

                if ui.button("Reset view").clicked() {
                    reset_clicked = true;
                }
            });

            // Axis labels at the window edges, swapped when the effective
            // orientation transposes the image
            let painter = ctx.layer_painter(egui::LayerId::new(
                egui::Order::Foreground,
                egui::Id::new("axis_labels"),
            ));
            let rect = ctx.screen_rect();
            painter.text(
                egui::pos2(rect.center().x, rect.bottom() - 6.0),
                egui::Align2::CENTER_BOTTOM,
                h_label,
                egui::FontId::monospace(18.0),
                egui::Color32::WHITE,
            );
            painter.text(
                egui::pos2(rect.right() - 6.0, rect.center().y),
                egui::Align2::RIGHT_CENTER,
                v_label,
                egui::FontId::monospace(18.0),
                egui::Color32::WHITE,
            );
        });

        // Apply UI actions
        self.settings.mirror_h = mirror_h;
        self.settings.mirror_v = mirror_v;
        self.settings.swap_axes = swap_axes;
        self.settings.set_zoom(zoom);
        self.refresh_interval = Duration::from_secs_f32(refresh_secs.max(0.0));
        if rotate_clicked {
            self.step_rotation();
        }
        if reset_clicked {
            self.reset_view();
        }
        if let Some(index) = connect_camera_index {
            self.connect_camera(index);
        }
        if disconnect_camera {
            self.disconnect_camera();
        }

        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let render_pass_static: &mut wgpu::RenderPass<'static> =
                unsafe { std::mem::transmute(&mut render_pass) };

            self.egui_renderer
                .render(render_pass_static, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}
