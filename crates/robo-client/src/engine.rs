use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use robo_core::components::Camera;
use robo_core::panel::speed_label;
use robo_core::viewer::TeleportMeshes;
use robo_core::Viewer;

use crate::assets::{AssetKind, AssetLoader, AssetMessage};
use crate::command::{handle_command, CommandServer};
use crate::input::{load_bindings, InputState};
use crate::mesh::{MeshCache, MeshData};
use crate::project_config::ResolvedConfig;
use crate::renderer::{GpuState, Renderer};

/// Main engine struct implementing winit's ApplicationHandler.
pub struct Engine {
    pub config: ResolvedConfig,
    pub gpu: Option<GpuState>,
    pub renderer: Option<Renderer>,
    pub mesh_cache: MeshCache,
    pub viewer: Viewer,
    pub lens: Camera,
    pub input: InputState,
    pub assets: AssetLoader,
    pub command_server: Option<CommandServer>,
    title: String,
}

impl Engine {
    pub fn new(config: ResolvedConfig) -> Self {
        let input = InputState::new(load_bindings(&config.bindings));
        let viewer = Viewer::new(config.controller.clone());
        Self {
            config,
            gpu: None,
            renderer: None,
            mesh_cache: MeshCache::new(),
            viewer,
            lens: Camera::default(),
            input,
            assets: AssetLoader::new(),
            command_server: None,
            title: String::new(),
        }
    }

    fn start(&mut self) {
        if let Some(gpu) = &self.gpu {
            let device = &gpu.device;
            let meshes = TeleportMeshes {
                particle: self.mesh_cache.add(device, "teleport particle", &MeshData::sphere(1.0, 8, 12)),
                ring: self.mesh_cache.add(device, "teleport ring", &MeshData::ring(0.9, 48)),
                beam: self.mesh_cache.add(device, "teleport beam", &MeshData::beam(0.5, 32)),
            };
            self.viewer.set_teleport_meshes(meshes);
        }

        if let Some(environment) = self.config.environment.clone() {
            self.assets.request(AssetKind::Environment, environment);
        }
        self.assets
            .request(AssetKind::Character, self.config.character.clone());

        match CommandServer::start(&self.config.socket) {
            Ok(server) => {
                tracing::info!("Command socket: {}", server.socket_path);
                self.command_server = Some(server);
            }
            Err(e) => tracing::warn!("Command socket unavailable: {}", e),
        }
    }

    /// Hand finished loads to the viewer. Failures are logged and the viewer carries on.
    fn process_assets(&mut self) {
        for AssetMessage { kind, path, result } in self.assets.poll() {
            let source = path.display().to_string();
            let loaded = match result {
                Ok(loaded) => loaded,
                Err(e) => {
                    self.viewer.asset_failed(kind.as_str(), &source, &e.to_string());
                    continue;
                }
            };
            let Some(gpu) = &self.gpu else {
                continue;
            };
            let base = self.mesh_cache.add_all(&gpu.device, &source, &loaded.meshes);
            let asset = loaded.into_asset(base);
            match kind {
                AssetKind::Character => {
                    self.viewer.load_character(&asset);
                    tracing::info!("Character ready: {} parts", self.viewer.parts().len());
                }
                AssetKind::Environment => {
                    self.viewer.load_environment(&asset);
                }
            }
        }
    }

    /// Process commands from the command socket.
    fn process_commands(&mut self) {
        let Some(server) = &self.command_server else {
            return;
        };
        for pending in server.poll() {
            let response = handle_command(&pending.request, &mut self.viewer, &mut self.input);
            tracing::debug!(
                "Command '{}' -> {}",
                pending.request.cmd,
                response.status
            );
            let _ = pending.responder.send(response);
        }
    }

    fn update_title(&mut self) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        let speed = speed_label(self.viewer.speed_multiplier());
        let title = match self.viewer.readout() {
            Some(r) => format!("{} | {} | {}", self.config.name, r, speed),
            None if self.assets.in_flight() > 0 => format!("{} | loading...", self.config.name),
            None => format!("{} | no model", self.config.name),
        };
        if title != self.title {
            gpu.window.set_title(&title);
            self.title = title;
        }
    }

    fn redraw(&mut self) {
        self.process_assets();
        self.process_commands();

        self.input.begin_frame();
        let snapshot = self.input.snapshot();
        self.viewer.frame(&snapshot);
        self.update_title();

        if let (Some(gpu), Some(renderer)) = (&self.gpu, &mut self.renderer) {
            let follow = self.viewer.camera();
            renderer.render(
                gpu,
                &self.viewer.scene,
                &self.mesh_cache,
                &self.lens,
                follow.view_matrix(),
                follow.position,
            );
            gpu.window.request_redraw();
        }
    }
}

impl ApplicationHandler for Engine {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }

        tracing::info!("Application resumed, initializing GPU");

        let window_attrs = Window::default_attributes()
            .with_title(self.config.name.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        let size = window.inner_size();
        self.lens.resize(size.width, size.height);
        self.input.resize(size.width, size.height, window.scale_factor());

        let gpu_state = pollster::block_on(crate::renderer::init_gpu(Arc::clone(&window)));
        self.renderer = Some(Renderer::new(&gpu_state));
        self.gpu = Some(gpu_state);
        tracing::info!("GPU initialized successfully");

        self.start();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                    self.lens.resize(new_size.width, new_size.height);
                    self.input
                        .resize(new_size.width, new_size.height, gpu.window.scale_factor());
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}
