//! Windows system tray implementation.

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tray_icon::{
    menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem},
    TrayIcon, TrayIconBuilder,
};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use super::TrayContext;
use crate::config::paths;
use crate::types::APP_NAME;

/// Menu item IDs
mod menu_ids {
    pub const VERSION: &str = "version";
    pub const STATUS: &str = "status";
    pub const OPEN_CONTROL_PAGE: &str = "open_control_page";
    pub const CANCEL_ACTION: &str = "cancel_action";
    pub const OPEN_LOGS: &str = "open_logs";
    pub const OPEN_CONFIG: &str = "open_config";
    pub const EXIT: &str = "exit";
}

/// How often the status line is refreshed.
const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

struct TrayApp {
    ctx: TrayContext,
    tray_icon: Option<TrayIcon>,
    status_item: Option<MenuItem>,
    last_status: String,
}

impl TrayApp {
    fn new(ctx: TrayContext) -> Self {
        Self {
            ctx,
            tray_icon: None,
            status_item: None,
            last_status: String::new(),
        }
    }

    fn create_menu(&mut self) -> Result<Menu> {
        let menu = Menu::new();

        let version = format!("{} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));
        menu.append(&MenuItem::with_id(menu_ids::VERSION, &version, false, None))?;

        self.last_status = self.ctx.coordinator.status().summary();
        let status_item = MenuItem::with_id(menu_ids::STATUS, &self.last_status, false, None);
        menu.append(&status_item)?;
        self.status_item = Some(status_item);

        menu.append(&PredefinedMenuItem::separator())?;

        menu.append(&MenuItem::with_id(
            menu_ids::OPEN_CONTROL_PAGE,
            "Open Control Page",
            true,
            None,
        ))?;
        menu.append(&MenuItem::with_id(
            menu_ids::CANCEL_ACTION,
            "Cancel Pending Action",
            true,
            None,
        ))?;

        menu.append(&PredefinedMenuItem::separator())?;

        menu.append(&MenuItem::with_id(menu_ids::OPEN_LOGS, "View Logs...", true, None))?;
        menu.append(&MenuItem::with_id(
            menu_ids::OPEN_CONFIG,
            "Edit Configuration...",
            true,
            None,
        ))?;

        menu.append(&PredefinedMenuItem::separator())?;

        menu.append(&MenuItem::with_id(menu_ids::EXIT, "Exit", true, None))?;

        Ok(menu)
    }

    fn handle_menu_event(&self, event: MenuEvent) {
        let result = match event.id.0.as_str() {
            menu_ids::OPEN_CONTROL_PAGE => self.open_control_page(),
            menu_ids::CANCEL_ACTION => {
                info!("Cancel requested from tray");
                self.ctx.coordinator.cancel_pending_action();
                Ok(())
            }
            menu_ids::OPEN_LOGS => self.open_logs(),
            menu_ids::OPEN_CONFIG => self.open_config(),
            menu_ids::EXIT => {
                info!("Exit requested from tray");
                self.ctx.stop.store(true, Ordering::SeqCst);
                Ok(())
            }
            other => {
                debug!(id = other, "Unhandled menu event");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(item = %event.id.0, error = %e, "Tray action failed");
        }
    }

    fn open_control_page(&self) -> Result<()> {
        let url = self.ctx.control_url();
        std::process::Command::new("cmd")
            .args(["/c", "start", "", &url])
            .spawn()?;
        Ok(())
    }

    fn open_logs(&self) -> Result<()> {
        let log_dir = paths::log_dir()?;
        std::process::Command::new("explorer").arg(&log_dir).spawn()?;
        Ok(())
    }

    fn open_config(&self) -> Result<()> {
        let config_path = &self.ctx.config.path;
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(config_path, self.ctx.config.to_toml()?)?;
            info!(path = %config_path.display(), "Wrote default configuration");
        }
        std::process::Command::new("notepad").arg(config_path).spawn()?;
        Ok(())
    }

    fn refresh_status(&mut self) {
        let summary = self.ctx.coordinator.status().summary();
        if summary == self.last_status {
            return;
        }
        if let Some(item) = &self.status_item {
            item.set_text(&summary);
        }
        if let Some(icon) = &self.tray_icon {
            let tooltip = format!("{APP_NAME} - {summary}");
            if let Err(e) = icon.set_tooltip(Some(tooltip)) {
                debug!(error = %e, "Failed to update tray tooltip");
            }
        }
        self.last_status = summary;
    }
}

impl ApplicationHandler for TrayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.tray_icon.is_some() {
            return;
        }

        let menu = match self.create_menu() {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "Failed to create tray menu");
                event_loop.exit();
                return;
            }
        };

        let icon = match create_icon() {
            Ok(i) => i,
            Err(e) => {
                error!(error = %e, "Failed to create tray icon image");
                event_loop.exit();
                return;
            }
        };

        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(format!("{APP_NAME} - {}", self.last_status))
            .with_icon(icon)
            .build();

        match tray_icon {
            Ok(ti) => {
                self.tray_icon = Some(ti);
                info!("System tray icon created");
            }
            Err(e) => {
                error!(error = %e, "Failed to create tray icon");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        _event: WindowEvent,
    ) {
        // No windows, only the tray icon
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        while let Ok(event) = MenuEvent::receiver().try_recv() {
            self.handle_menu_event(event);
        }

        if self.ctx.stop.load(Ordering::SeqCst) {
            event_loop.exit();
            return;
        }

        self.refresh_status();
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + REFRESH_INTERVAL));
    }
}

/// A white power glyph on a blue disc.
fn create_icon() -> Result<tray_icon::Icon> {
    const SIZE: u32 = 32;
    let c = (SIZE as f32 - 1.0) / 2.0;

    let img = image::RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        let dx = x as f32 - c;
        let dy = y as f32 - c;
        let r = (dx * dx + dy * dy).sqrt();

        if r > 15.5 {
            return image::Rgba([0, 0, 0, 0]);
        }

        let in_ring = (7.0..=10.0).contains(&r) && !(dy < 0.0 && dx.abs() < 4.0);
        let in_bar = dx.abs() <= 1.5 && (5.0..=16.0).contains(&(y as f32));
        if in_ring || in_bar {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([0x1e, 0x88, 0xe5, 255])
        }
    });

    let (width, height) = img.dimensions();
    tray_icon::Icon::from_rgba(img.into_raw(), width, height)
        .map_err(|e| anyhow::anyhow!("Failed to create icon: {}", e))
}

/// Run the tray until Exit is chosen or `ctx.stop` is set.
///
/// Must be called on the main thread.
pub fn run_tray(ctx: TrayContext) -> Result<()> {
    info!("Starting system tray");

    let event_loop = EventLoop::new()?;
    let mut app = TrayApp::new(ctx);
    event_loop.run_app(&mut app)?;

    info!("System tray closed");
    Ok(())
}
