/// Terminal STL viewer with point annotations
use anyhow::Context;
use crossterm::{
    cursor,
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
    },
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use log::{debug, info, warn};
use nalgebra::Point2;
use std::io::{self, stdout, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use stlpin_core::{
    AnnotationId, Camera, Error, LabelPlacement, LoadOutcome, PendingAnnotation, PointerOutcome,
    ProjectionMode, ScreenPosition, ViewerController, ViewerState, Viewport,
};

pub mod fetch;
pub mod guard;
pub mod renderer;

pub use fetch::{Fetcher, Loader};
pub use guard::TerminalGuard;
pub use renderer::{AsciiRenderer, Scene};

/// Radians per arrow key press
const ROTATE_STEP: f32 = 0.1;
/// Radians per cell of mouse drag
const DRAG_SENSITIVITY: f32 = 0.05;
const ZOOM_IN: f32 = 0.9;
const ZOOM_OUT: f32 = 1.0 / ZOOM_IN;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: Option<String>,
    pub orthographic: bool,
    pub fps: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: None,
            orthographic: false,
            fps: 30,
        }
    }
}

/// What the bottom line is currently asking for
#[derive(Debug, Clone, PartialEq)]
enum PromptKind {
    Annotate(PendingAnnotation),
    Edit(AnnotationId),
    Open,
}

#[derive(Debug, Clone, PartialEq)]
struct Prompt {
    kind: PromptKind,
    buffer: String,
}

impl Prompt {
    fn title(&self) -> &'static str {
        match self.kind {
            PromptKind::Annotate(_) => "Note",
            PromptKind::Edit(_) => "Edit",
            PromptKind::Open => "Open",
        }
    }
}

/// Main application struct for the terminal viewer
pub struct TerminalApp {
    viewer: ViewerController,
    scene: Scene,
    renderer: AsciiRenderer,
    loader: Loader,
    labels: Vec<LabelPlacement>,
    prompt: Option<Prompt>,
    selected: Option<AnnotationId>,
    source: Option<String>,
    status: String,
    running: bool,
    frame_time: Duration,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let (width, height) = terminal::size().context("failed to query terminal size")?;
        Self::with_size(config, width, height)
    }

    pub fn with_size(config: AppConfig, width: u16, height: u16) -> anyhow::Result<Self> {
        let mut camera = Camera::new(width as u32, height as u32);
        if config.orthographic {
            camera.mode = ProjectionMode::Orthographic;
        }
        let renderer = AsciiRenderer::new(width as usize, height as usize);
        let mut scene = Scene::new(camera);
        scene.set_viewport(&renderer.viewport());

        Ok(Self {
            viewer: ViewerController::new(),
            scene,
            renderer,
            loader: Loader::new(Fetcher::new()?),
            labels: Vec::new(),
            prompt: None,
            selected: None,
            source: config.source,
            status: String::from("Press o to open a model"),
            running: true,
            frame_time: Duration::from_millis(1000 / u64::from(config.fps.max(1))),
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    pub fn viewer(&self) -> &ViewerController {
        &self.viewer
    }

    /// Take over the terminal until the user quits
    pub fn run(&mut self) -> anyhow::Result<()> {
        let _guard = TerminalGuard::acquire().context("failed to set up terminal")?;

        if let Some(source) = self.source.clone() {
            self.open(&source);
        }

        self.main_loop().context("terminal event loop failed")
    }

    /// Withdraw the model and its annotations
    pub fn shutdown(&mut self) {
        self.viewer.teardown(&mut self.scene);
    }

    /// Start fetching `source`; it replaces the current model once decoded
    pub fn open(&mut self, source: &str) {
        let ticket = self.viewer.begin_load(source, &mut self.scene);
        self.status = format!("Loading {}...", ticket.url);
        self.source = Some(ticket.url.clone());
        self.selected = None;
        self.loader.start(ticket);
    }

    /// Write the annotations as pretty JSON; returns how many were written
    pub fn export(&self, path: &Path) -> anyhow::Result<usize> {
        let annotations = self.viewer.annotations();
        let document = serde_json::json!({
            "source": self.viewer.session().map(|s| s.url()),
            "annotations": annotations,
        });
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("exported {} annotations to {}", annotations.len(), path.display());
        Ok(annotations.len())
    }

    fn main_loop(&mut self) -> io::Result<()> {
        while self.running {
            let frame_start = Instant::now();

            // Handle input
            while event::poll(Duration::ZERO)? {
                let event = event::read()?;
                self.handle_event(event);
            }

            // Update
            self.update();

            // Render
            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < self.frame_time {
                std::thread::sleep(self.frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(width, height) => {
                self.renderer.resize(width as usize, height as usize);
                self.scene.set_viewport(&self.renderer.viewport());
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.prompt.is_some() {
            self.handle_prompt_key(key.code);
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('w') | KeyCode::Up => self.orbit(0.0, ROTATE_STEP),
            KeyCode::Char('s') | KeyCode::Down => self.orbit(0.0, -ROTATE_STEP),
            KeyCode::Char('a') | KeyCode::Left => self.orbit(-ROTATE_STEP, 0.0),
            KeyCode::Char('d') | KeyCode::Right => self.orbit(ROTATE_STEP, 0.0),
            KeyCode::Char('+') | KeyCode::Char('=') => self.zoom(ZOOM_IN),
            KeyCode::Char('-') => self.zoom(ZOOM_OUT),
            KeyCode::Char('o') => {
                self.prompt = Some(Prompt {
                    kind: PromptKind::Open,
                    buffer: self.source.clone().unwrap_or_default(),
                });
            }
            KeyCode::Char('r') => match self.source.clone() {
                Some(source) => self.open(&source),
                None => self.status = String::from("Nothing to reload"),
            },
            KeyCode::Tab => self.select_next(),
            KeyCode::Char('e') => {
                let selected = self
                    .selected
                    .and_then(|id| self.viewer.annotations().iter().find(|a| a.id == id));
                if let Some(annotation) = selected {
                    self.prompt = Some(Prompt {
                        kind: PromptKind::Edit(annotation.id),
                        buffer: annotation.text.clone(),
                    });
                }
            }
            KeyCode::Char('x') | KeyCode::Delete => self.delete_selected(),
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };

        match code {
            KeyCode::Char(c) => prompt.buffer.push(c),
            KeyCode::Backspace => {
                prompt.buffer.pop();
            }
            KeyCode::Esc => {
                self.prompt = None;
            }
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    self.submit(prompt);
                }
            }
            _ => {}
        }
    }

    fn submit(&mut self, prompt: Prompt) {
        match prompt.kind {
            PromptKind::Annotate(pending) => {
                match self.viewer.commit_annotation(&pending, &prompt.buffer) {
                    Ok(annotation) => {
                        self.status = format!("Added [{}] {}", annotation.label, annotation.text);
                        self.selected = Some(annotation.id);
                    }
                    Err(Error::EmptyInput) => debug!("empty annotation text, nothing created"),
                    Err(e) => self.status = e.to_string(),
                }
            }
            PromptKind::Edit(id) => {
                if prompt.buffer.trim().is_empty() {
                    debug!("empty replacement text for {}, keeping the old one", id);
                    return;
                }
                match self.viewer.update_annotation(id, &prompt.buffer) {
                    Ok(true) => self.status = format!("Updated {}", id),
                    Ok(false) => self.status = format!("Annotation {} no longer exists", id),
                    Err(e) => self.status = e.to_string(),
                }
            }
            PromptKind::Open => {
                let source = prompt.buffer.trim();
                if !source.is_empty() {
                    self.open(source);
                }
            }
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if self.prompt.is_some() {
            return;
        }

        // Cell centers, in the same units as the renderer's viewport
        let pointer = Point2::new(mouse.column as f32 + 0.5, mouse.row as f32 + 0.5);

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.viewer.pointer_down(pointer),
            MouseEventKind::Drag(MouseButton::Left) => {
                if let Some(delta) = self.viewer.pointer_move(pointer) {
                    self.orbit(-delta.x * DRAG_SENSITIVITY, delta.y * DRAG_SENSITIVITY);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let viewport = self.renderer.viewport();
                match self.viewer.pointer_up(pointer, &self.scene.camera, &viewport) {
                    PointerOutcome::Picked(pending) => {
                        self.prompt = Some(Prompt {
                            kind: PromptKind::Annotate(pending),
                            buffer: String::new(),
                        });
                    }
                    PointerOutcome::Missed => debug!("no surface under {:?}", pointer),
                    PointerOutcome::Dragged | PointerOutcome::Ignored => {}
                }
            }
            MouseEventKind::ScrollUp => self.zoom(ZOOM_IN),
            MouseEventKind::ScrollDown => self.zoom(ZOOM_OUT),
            _ => {}
        }
    }

    fn orbit(&mut self, dyaw: f32, dpitch: f32) {
        self.scene.orbit.rotate(dyaw, dpitch);
        self.scene.update_camera();
    }

    fn zoom(&mut self, factor: f32) {
        self.scene.orbit.zoom(factor);
        self.scene.update_camera();
    }

    fn select_next(&mut self) {
        let annotations = self.viewer.annotations();
        if annotations.is_empty() {
            self.selected = None;
            return;
        }
        let next = self
            .selected
            .and_then(|id| annotations.iter().position(|a| a.id == id))
            .map_or(0, |index| (index + 1) % annotations.len());
        self.selected = Some(annotations[next].id);
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.selected.take() else {
            return;
        };
        match self.viewer.delete_annotation(id) {
            Ok(Some(annotation)) => {
                self.status = format!("Deleted [{}] {}", annotation.label, annotation.text);
            }
            Ok(None) => {}
            Err(e) => self.status = e.to_string(),
        }
    }

    /// Apply finished fetches
    fn update(&mut self) {
        while let Some(completion) = self.loader.poll() {
            match self
                .viewer
                .complete_load(&completion.ticket, completion.result, &mut self.scene)
            {
                Ok(LoadOutcome::Loaded { triangles, .. }) => {
                    self.status = format!("{} triangles from {}", triangles, completion.ticket.url);
                }
                Ok(LoadOutcome::Superseded) => {}
                Err(e) => {
                    warn!("giving up on {}", completion.ticket.url);
                    self.status = format!("Load failed: {}", e);
                }
            }
        }
    }

    fn render(&mut self) -> io::Result<()> {
        let viewport = self.renderer.viewport();

        self.renderer.clear();
        if let Some(mesh) = &self.scene.mesh {
            self.renderer.render_mesh(mesh, &self.scene.camera);
        }

        let mut stdout = stdout();
        self.renderer.draw(&mut stdout)?;

        // Label markers follow the model every frame
        self.viewer
            .project_labels(&self.scene.camera, &viewport, &mut self.labels);
        for placement in &self.labels {
            let Some((column, row)) = label_cell(&placement.screen, &viewport) else {
                continue;
            };
            let color = if self.selected == Some(placement.id) {
                Color::Magenta
            } else {
                Color::Yellow
            };
            queue!(
                stdout,
                cursor::MoveTo(column, row),
                SetForegroundColor(color),
                Print(format!("[{}]", placement.label))
            )?;
        }

        // Annotation list under the header
        let (width, height) = (viewport.width as usize, viewport.height as usize);
        let rows = height.saturating_sub(2);
        for (row, annotation) in self.viewer.annotations().iter().take(rows).enumerate() {
            let marker = if self.selected == Some(annotation.id) { '>' } else { ' ' };
            let line = format!("{}{:>3} {}", marker, annotation.label, annotation.text);
            queue!(
                stdout,
                cursor::MoveTo(0, row as u16 + 1),
                SetForegroundColor(Color::Yellow),
                Print(fit(&line, width / 3))
            )?;
        }

        // Draw UI overlay
        let state = match self.viewer.state() {
            ViewerState::Idle => "idle",
            ViewerState::Loading { .. } => "loading",
            ViewerState::Ready => "ready",
            ViewerState::Failed { .. } => "failed",
        };
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            SetForegroundColor(Color::Yellow),
            Print(fit(
                &format!(
                    "stlpin | {} | FPS: {:.1} | Click=Note Drag/WASD=Orbit +/-=Zoom O=Open R=Reload Tab/E/X=Select/Edit/Delete Q=Quit",
                    state, self.fps
                ),
                width,
            ))
        )?;

        let bottom = match &self.prompt {
            Some(prompt) => format!("{}: {}_", prompt.title(), prompt.buffer),
            None => self.status.clone(),
        };
        queue!(
            stdout,
            cursor::MoveTo(0, height.saturating_sub(1) as u16),
            Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::White),
            Print(fit(&bottom, width)),
            ResetColor
        )?;

        stdout.flush()
    }
}

/// Cell for a label anchor; anchors outside the viewport are clipped
fn label_cell(screen: &ScreenPosition, viewport: &Viewport) -> Option<(u16, u16)> {
    let point = screen.on_screen()?;
    viewport
        .contains(&point)
        .then(|| (point.x as u16, point.y as u16))
}

/// Truncate to at most `width` characters
fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use stlpin_core::TriangleBuffer;

    fn cube_ascii() -> String {
        let mut text = String::from("solid cube\n");
        for triangle in &TriangleBuffer::cube(2.0).triangles {
            let n = triangle.normal();
            text.push_str(&format!("facet normal {} {} {}\nouter loop\n", n.x, n.y, n.z));
            for v in &triangle.vertices {
                let p = v.position;
                text.push_str(&format!("vertex {} {} {}\n", p.x, p.y, p.z));
            }
            text.push_str("endloop\nendfacet\n");
        }
        text.push_str("endsolid cube\n");
        text
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut TerminalApp, text: &str) {
        for c in text.chars() {
            app.handle_event(key(KeyCode::Char(c)));
        }
        app.handle_event(key(KeyCode::Enter));
    }

    fn loaded_app(name: &str) -> (TerminalApp, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("stlpin-{}-{}.stl", name, std::process::id()));
        std::fs::write(&path, cube_ascii()).unwrap();

        let mut app = TerminalApp::with_size(AppConfig::default(), 80, 24).unwrap();
        app.open(&path.display().to_string());

        let deadline = Instant::now() + Duration::from_secs(5);
        while *app.viewer().state() != ViewerState::Ready {
            assert!(Instant::now() < deadline, "load did not finish");
            std::thread::sleep(Duration::from_millis(5));
            app.update();
        }
        (app, path)
    }

    #[test]
    fn test_click_prompts_then_commits_and_exports() {
        let (mut app, path) = loaded_app("click");

        app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 40, 12));
        app.handle_event(mouse(MouseEventKind::Up(MouseButton::Left), 40, 12));
        assert!(matches!(
            app.prompt.as_ref().map(|p| &p.kind),
            Some(PromptKind::Annotate(_))
        ));

        type_text(&mut app, "top");
        assert!(app.prompt.is_none());
        let annotations = app.viewer().annotations();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].label, 1);
        assert_eq!(annotations[0].text, "top");
        assert!((annotations[0].position.z - 1.0).abs() < 1e-5);
        assert_eq!(app.selected, Some(annotations[0].id));

        let export = path.with_extension("json");
        assert_eq!(app.export(&export).unwrap(), 1);
        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(document["annotations"][0]["label"], 1);
        assert_eq!(document["annotations"][0]["text"], "top");
        assert_eq!(document["source"], path.display().to_string());

        std::fs::remove_file(export).unwrap();
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_escape_and_empty_text_create_nothing() {
        let (mut app, path) = loaded_app("cancel");

        for _ in 0..2 {
            app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 40, 12));
            app.handle_event(mouse(MouseEventKind::Up(MouseButton::Left), 40, 12));
        }
        app.handle_event(key(KeyCode::Char('a')));
        app.handle_event(key(KeyCode::Esc));
        assert!(app.prompt.is_none());
        assert!(app.running);

        app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 40, 12));
        app.handle_event(mouse(MouseEventKind::Up(MouseButton::Left), 40, 12));
        type_text(&mut app, "  ");
        assert!(app.viewer().annotations().is_empty());

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_labels_outside_the_view_are_clipped() {
        let (mut app, path) = loaded_app("clip");

        app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 45, 12));
        app.handle_event(mouse(MouseEventKind::Up(MouseButton::Left), 45, 12));
        type_text(&mut app, "edge");

        let viewport = app.renderer.viewport();
        let mut placements = Vec::new();
        app.viewer.project_labels(&app.scene.camera, &viewport, &mut placements);
        assert_eq!(label_cell(&placements[0].screen, &viewport), Some((45, 12)));

        // Close enough that the anchor is in front of the eye but right of the view
        app.scene.orbit.distance = 1.2;
        app.scene.update_camera();
        app.viewer.project_labels(&app.scene.camera, &viewport, &mut placements);
        let screen = placements[0].screen.on_screen().unwrap();
        assert!(screen.x > viewport.width);
        assert_eq!(label_cell(&placements[0].screen, &viewport), None);
        assert_eq!(label_cell(&ScreenPosition::OffScreen, &viewport), None);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_drag_orbits_without_prompting() {
        let (mut app, path) = loaded_app("drag");
        let yaw = app.scene.orbit.yaw;

        app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), 30, 12));
        app.handle_event(mouse(MouseEventKind::Drag(MouseButton::Left), 40, 12));
        app.handle_event(mouse(MouseEventKind::Up(MouseButton::Left), 40, 12));

        assert!(app.prompt.is_none());
        assert!((app.scene.orbit.yaw - (yaw - 0.5)).abs() < 1e-5);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_select_edit_and_delete_keys() {
        let (mut app, path) = loaded_app("keys");

        for (column, text) in [(38, "a"), (42, "b")] {
            app.handle_event(mouse(MouseEventKind::Down(MouseButton::Left), column, 12));
            app.handle_event(mouse(MouseEventKind::Up(MouseButton::Left), column, 12));
            type_text(&mut app, text);
        }
        let ids: Vec<_> = app.viewer().annotations().iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), 2);

        // Selection wraps around
        app.handle_event(key(KeyCode::Tab));
        assert_eq!(app.selected, Some(ids[0]));

        app.handle_event(key(KeyCode::Char('e')));
        app.handle_event(key(KeyCode::Backspace));
        type_text(&mut app, "first");
        assert_eq!(app.viewer().annotations()[0].text, "first");

        app.handle_event(key(KeyCode::Char('x')));
        let labels: Vec<u32> = app.viewer().annotations().iter().map(|a| a.label).collect();
        assert_eq!(labels, vec![2]);
        assert_eq!(app.selected, None);

        app.shutdown();
        assert!(app.viewer().annotations().is_empty());
        assert!(app.scene.mesh.is_none());

        std::fs::remove_file(path).unwrap();
    }
}
