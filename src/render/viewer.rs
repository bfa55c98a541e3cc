//! Windowed preview: renders the liquid gradient behind-the-product look
//! with the GPU and exposes the keyboard debug surface.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel as xchan;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::color::adjust_color;
use crate::palette::{ImageRef, Palette};
use crate::tasks::extract::{ExtractRequest, PaletteState};
use crate::tuning::{TuningHandle, TuningParams};

use super::clock::AnimationClock;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    pos: [f32; 2],
    uv: [f32; 2],
}

const QUAD: [Vertex; 4] = [
    Vertex {
        pos: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    Vertex {
        pos: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    Vertex {
        pos: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    Vertex {
        pos: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

// Must match the WGSL Uniforms layout (112 bytes, vec4-aligned).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    colors: [[f32; 4]; 4],
    weights: [f32; 4],
    resolution: [f32; 2],
    time: f32,
    blur: f32,
    noise_scale1: f32,
    noise_scale2: f32,
    distortion: f32,
    _pad: f32,
}

/// Run the preview window for one product image. Returns when the window
/// closes or `cancel` fires.
///
/// # Errors
/// Returns an error if the rendering backend fails to initialize or submit work.
pub fn run_preview(
    image: ImageRef,
    palette_rx: xchan::Receiver<PaletteState>,
    request_tx: tokio::sync::mpsc::Sender<ExtractRequest>,
    tuning: TuningHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new(image, palette_rx, request_tx, tuning, cancel);
    event_loop.run_app(&mut app)?;
    Ok(())
}

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    vbuf: wgpu::Buffer,
    ubuf: wgpu::Buffer,
}

struct App {
    image: ImageRef,
    palette: Option<Palette>,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,

    palette_rx: xchan::Receiver<PaletteState>,
    request_tx: tokio::sync::mpsc::Sender<ExtractRequest>,
    tuning: TuningHandle,
    tuning_rx: tokio::sync::watch::Receiver<TuningParams>,
    cancel: CancellationToken,

    clock: AnimationClock,
    last_frame: Option<Instant>,
    shift: bool,
    uniforms: Uniforms,
}

impl App {
    fn new(
        image: ImageRef,
        palette_rx: xchan::Receiver<PaletteState>,
        request_tx: tokio::sync::mpsc::Sender<ExtractRequest>,
        tuning: TuningHandle,
        cancel: CancellationToken,
    ) -> Self {
        let tuning_rx = tuning.subscribe();
        let time_scale = tuning.current().time_scale;
        Self {
            image,
            palette: None,
            window: None,
            gpu: None,
            palette_rx,
            request_tx,
            tuning,
            tuning_rx,
            cancel,
            clock: AnimationClock::new(time_scale),
            last_frame: None,
            shift: false,
            uniforms: bytemuck::Zeroable::zeroed(),
        }
    }

    /// Recompute the uniform block from the current palette and tuning.
    fn refresh_uniforms(&mut self) {
        let params = self.tuning.current();
        if let Some(palette) = &self.palette {
            let adjust = params.color_adjust();
            for (i, entry) in palette.iter().enumerate() {
                let rgb = adjust_color(entry.base_rgb, &adjust);
                self.uniforms.colors[i] = [rgb[0], rgb[1], rgb[2], 1.0];
                self.uniforms.weights[i] = entry.weight;
            }
        }
        self.uniforms.blur = params.blur;
        self.uniforms.noise_scale1 = params.noise_scale1;
        self.uniforms.noise_scale2 = params.noise_scale2;
        self.uniforms.distortion = params.distortion;
        self.uniforms.time = self.clock.time();
        if let Some(gpu) = &self.gpu {
            self.uniforms.resolution = [gpu.config.width as f32, gpu.config.height as f32];
            gpu.queue
                .write_buffer(&gpu.ubuf, 0, bytemuck::bytes_of(&self.uniforms));
        }
    }

    fn request_extraction(&self) {
        if let Err(err) = self.request_tx.try_send(ExtractRequest(self.image.clone())) {
            warn!("extraction request dropped: {err}");
        }
    }

    fn nudge(&mut self, label: &str, apply: impl FnOnce(&mut TuningParams, f32)) {
        let direction = if self.shift { -1.0 } else { 1.0 };
        self.tuning.update(|p| apply(p, direction));
        let params = self.tuning.current();
        self.clock.set_time_scale(params.time_scale);
        info!(%label, "tuning updated");
        self.refresh_uniforms();
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::KeyS => self.nudge("saturation", |p, d| {
                p.saturation = (p.saturation + d * 0.05).clamp(-1.0, 1.0);
            }),
            KeyCode::KeyL => self.nudge("lightness", |p, d| {
                p.lightness = (p.lightness + d * 0.05).clamp(-1.0, 1.0);
            }),
            KeyCode::KeyC => self.nudge("contrast", |p, d| {
                p.contrast = (p.contrast + d * 0.1).max(0.1);
            }),
            KeyCode::KeyH => self.nudge("hue-shift", |p, d| {
                p.hue_shift += d * 10.0;
            }),
            KeyCode::KeyT => self.nudge("time-scale", |p, d| {
                p.time_scale = (p.time_scale + d * 0.05).max(0.0);
            }),
            KeyCode::KeyN => self.nudge("noise-scale1", |p, d| {
                p.noise_scale1 = (p.noise_scale1 + d * 0.1).max(0.05);
            }),
            KeyCode::KeyM => self.nudge("noise-scale2", |p, d| {
                p.noise_scale2 = (p.noise_scale2 + d * 0.1).max(0.05);
            }),
            KeyCode::KeyD => self.nudge("distortion", |p, d| {
                p.distortion = (p.distortion + d * 0.05).max(0.0);
            }),
            KeyCode::KeyB => self.nudge("blur", |p, d| {
                p.blur = (p.blur + d * 0.05).max(0.0);
            }),
            KeyCode::Digit1 | KeyCode::Digit2 | KeyCode::Digit3 | KeyCode::Digit4 => {
                let idx = match code {
                    KeyCode::Digit1 => 0,
                    KeyCode::Digit2 => 1,
                    KeyCode::Digit3 => 2,
                    _ => 3,
                };
                self.nudge("weight-multiplier", |p, d| {
                    p.weight_multipliers.0[idx] = (p.weight_multipliers.0[idx] + d * 0.1).max(0.0);
                });
                // Multipliers land at extraction time; refresh the palette.
                self.request_extraction();
            }
            KeyCode::KeyR => {
                self.tuning.reset();
                self.clock.set_time_scale(self.tuning.current().time_scale);
                info!("tuning reset to defaults");
                self.refresh_uniforms();
                self.request_extraction();
            }
            KeyCode::KeyP => match serde_yaml::to_string(&self.tuning.current()) {
                Ok(yaml) => info!("current tuning:\n{yaml}"),
                Err(err) => warn!("failed to serialize tuning: {err}"),
            },
            _ => {}
        }
    }

    fn draw(&self) {
        let Some(gpu) = &self.gpu else { return };
        let Ok(frame) = gpu.surface.get_current_texture() else {
            return;
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("rpass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            // Without a palette the backdrop stays a plain white clear.
            if self.palette.is_some() {
                rpass.set_pipeline(&gpu.pipeline);
                rpass.set_bind_group(0, &gpu.bind_group, &[]);
                rpass.set_vertex_buffer(0, gpu.vbuf.slice(..));
                rpass.draw(0..4, 0..1);
            }
        }
        gpu.queue.submit([encoder.finish()]);
        frame.present();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let attrs = WindowAttributes::default()
            .with_title("lure-backdrop preview")
            .with_inner_size(LogicalSize::new(960.0, 540.0));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));
        self.window = Some(window.clone());

        self.gpu = Some(pollster::block_on(init_gpu(window)).expect("GPU init"));
        self.refresh_uniforms();
        self.request_extraction();
        self.last_frame = Some(Instant::now());
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(win) = &self.window else { return };
        if win.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.cancel.cancel();
                event_loop.exit();
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.shift = modifiers.state().shift_key();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && let PhysicalKey::Code(code) = event.physical_key
                {
                    if matches!(code, KeyCode::Escape | KeyCode::KeyQ) {
                        self.cancel.cancel();
                        event_loop.exit();
                    } else {
                        self.handle_key(code);
                    }
                }
            }
            WindowEvent::Occluded(occluded) => {
                self.clock.set_visible(!occluded);
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if let Some(gpu) = &mut self.gpu
                    && width > 0
                    && height > 0
                {
                    gpu.config.width = width;
                    gpu.config.height = height;
                    gpu.surface.configure(&gpu.device, &gpu.config);
                }
                self.refresh_uniforms();
            }
            WindowEvent::RedrawRequested => self.draw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        // Latest extraction outcome (stale results were already suppressed).
        let mut palette_dirty = false;
        while let Ok(state) = self.palette_rx.try_recv() {
            // On error the static white fallback stays up.
            self.palette = if state.error.is_some() {
                None
            } else {
                state.palette
            };
            palette_dirty = true;
        }

        // Tuning updates issued outside the keyboard path.
        let tuning_dirty = self.tuning_rx.has_changed().unwrap_or(false);
        if tuning_dirty {
            let params = *self.tuning_rx.borrow_and_update();
            self.clock.set_time_scale(params.time_scale);
        }
        if palette_dirty || tuning_dirty {
            self.refresh_uniforms();
        }

        let now = Instant::now();
        let delta = self.last_frame.map(|last| now - last).unwrap_or_default();
        self.last_frame = Some(now);
        self.clock.tick(delta);

        if let Some(gpu) = &self.gpu {
            self.uniforms.time = self.clock.time();
            gpu.queue
                .write_buffer(&gpu.ubuf, 0, bytemuck::bytes_of(&self.uniforms));
        }

        if let Some(win) = &self.window {
            win.request_redraw();
        }
    }
}

async fn init_gpu(window: Arc<Window>) -> Result<Gpu> {
    use wgpu::util::DeviceExt;

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("create surface")?;

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        })
        .await
        .context("no compatible GPU adapter found")?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        })
        .await?;

    let caps = surface.get_capabilities(&adapter);
    let format = caps
        .formats
        .iter()
        .copied()
        .find(wgpu::TextureFormat::is_srgb)
        .unwrap_or(caps.formats[0]);
    let PhysicalSize { width, height } = window.inner_size();
    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 1,
    };
    surface.configure(&device, &config);

    let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("quad"),
        contents: bytemuck::cast_slice(&QUAD),
        usage: wgpu::BufferUsages::VERTEX,
    });

    let ubuf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("uniforms"),
        size: std::mem::size_of::<Uniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("liquid"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/liquid.wgsl").into()),
    });

    let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("bind_layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("bind_group"),
        layout: &bind_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: ubuf.as_entire_binding(),
        }],
    });

    let vlayout = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
    };

    let pip_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("pipe_layout"),
        bind_group_layouts: &[&bind_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("pipeline"),
        layout: Some(&pip_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[vlayout],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    Ok(Gpu {
        surface,
        device,
        queue,
        config,
        pipeline,
        bind_group,
        vbuf,
        ubuf,
    })
}
