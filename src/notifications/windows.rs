//! Windows notification GUI thread.
//!
//! One thread owns every countdown popup. Other threads post commands through
//! a channel; the thread drains it between message-pump passes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, error, warn};
use windows_sys::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows_sys::Win32::Graphics::Gdi::{
    BeginPaint, CreateSolidBrush, DeleteObject, DrawTextW, EndPaint, FillRect, GetStockObject,
    InvalidateRect, SelectObject, SetBkMode, SetTextColor, DEFAULT_GUI_FONT, DT_END_ELLIPSIS,
    DT_LEFT, DT_NOPREFIX, DT_SINGLELINE, DT_WORDBREAK, HDC, PAINTSTRUCT, TRANSPARENT,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetClientRect, KillTimer,
    LoadCursorW, PeekMessageW, RegisterClassExW, SetLayeredWindowAttributes, SetTimer,
    ShowWindow, SystemParametersInfoW, TranslateMessage, IDC_HAND, LWA_ALPHA, MSG, PM_REMOVE,
    SPI_GETWORKAREA, SW_SHOWNOACTIVATE, WM_DESTROY, WM_LBUTTONDOWN, WM_PAINT, WM_TIMER,
    WNDCLASSEXW, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_POPUP,
};

use super::{CancellablePrompt, NotificationSink, PromptHandle};
use crate::types::APP_NAME;

const CLASS_NAME: &str = "BealinkCountdownPrompt";
const POPUP_WIDTH: i32 = 380;
const POPUP_HEIGHT: i32 = 118;
const POPUP_GAP: i32 = 10;
const MARGIN_X: i32 = 40;
const MARGIN_Y: i32 = 70;
const PADDING: i32 = 18;
const BAR_HEIGHT: i32 = 8;
const ALPHA: u8 = 235;

const TIMER_ID: usize = 1;
const FRAME_MS: u32 = 33;
const PUMP_INTERVAL: Duration = Duration::from_millis(15);
/// How long a finished countdown stays on screen.
const LINGER: Duration = Duration::from_millis(200);

const BG_COLOR: u32 = rgb(0x33, 0x33, 0x33);
const FG_COLOR: u32 = rgb(0xff, 0xff, 0xff);
const TROUGH_COLOR: u32 = rgb(0x55, 0x55, 0x55);
const BAR_COLOR: u32 = rgb(0xdc, 0x35, 0x45);

const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    r as u32 | (g as u32) << 8 | (b as u32) << 16
}

enum GuiCommand {
    Prompt(PromptHandle, CancellablePrompt),
    Transient { title: String, body: String },
    Dismiss(PromptHandle),
    Shutdown,
}

struct Popup {
    handle: PromptHandle,
    prompt: CancellablePrompt,
    clicked: bool,
}

thread_local! {
    static POPUPS: RefCell<HashMap<HWND, Popup>> = RefCell::new(HashMap::new());
}

/// Notification sink backed by the GUI thread.
pub struct DesktopNotifier {
    tx: Sender<GuiCommand>,
    next_id: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DesktopNotifier {
    pub fn start() -> std::io::Result<Self> {
        let (tx, rx) = async_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("bealink-gui".into())
            .spawn(move || run_gui_loop(rx))?;

        Ok(Self {
            tx,
            next_id: AtomicU64::new(1),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn send(&self, command: GuiCommand) {
        if self.tx.try_send(command).is_err() {
            warn!("Notification thread is gone, dropping notification");
        }
    }

    pub fn stop(&self) {
        let _ = self.tx.try_send(GuiCommand::Shutdown);
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("Notification thread panicked");
            }
        }
    }
}

impl NotificationSink for DesktopNotifier {
    fn show_cancellable(&self, prompt: CancellablePrompt) -> PromptHandle {
        let handle = PromptHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(GuiCommand::Prompt(handle, prompt));
        handle
    }

    fn show_transient(&self, title: &str, body: &str) {
        self.send(GuiCommand::Transient {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    fn dismiss(&self, handle: PromptHandle) {
        self.send(GuiCommand::Dismiss(handle));
    }
}

fn run_gui_loop(rx: Receiver<GuiCommand>) {
    debug!("Notification thread started");

    let instance = unsafe { GetModuleHandleW(std::ptr::null()) };
    if !unsafe { register_class(instance) } {
        error!("Failed to register countdown window class; prompts will not be shown");
    }

    loop {
        loop {
            match rx.try_recv() {
                Ok(GuiCommand::Shutdown) | Err(TryRecvError::Closed) => {
                    destroy_all();
                    debug!("Notification thread stopped");
                    return;
                }
                Ok(command) => handle_command(instance, command),
                Err(TryRecvError::Empty) => break,
            }
        }

        unsafe {
            let mut msg: MSG = std::mem::zeroed();
            while PeekMessageW(&mut msg, 0, 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        std::thread::sleep(PUMP_INTERVAL);
    }
}

fn handle_command(instance: HINSTANCE, command: GuiCommand) {
    match command {
        GuiCommand::Prompt(handle, prompt) => {
            let slot = POPUPS.with(|p| p.borrow().len()) as i32;
            if unsafe { create_popup(instance, slot, handle, prompt) }.is_none() {
                warn!(prompt = handle.0, "Failed to create countdown window");
            }
        }
        GuiCommand::Transient { title, body } => show_toast(&title, &body),
        GuiCommand::Dismiss(handle) => {
            let hwnd = POPUPS.with(|p| {
                p.borrow()
                    .iter()
                    .find(|(_, popup)| popup.handle == handle)
                    .map(|(hwnd, _)| *hwnd)
            });
            if let Some(hwnd) = hwnd {
                unsafe { DestroyWindow(hwnd) };
            }
        }
        GuiCommand::Shutdown => {}
    }
}

fn destroy_all() {
    let windows: Vec<HWND> = POPUPS.with(|p| p.borrow().keys().copied().collect());
    for hwnd in windows {
        unsafe { DestroyWindow(hwnd) };
    }
}

fn show_toast(title: &str, body: &str) {
    use winrt_notification::{Duration as ToastDuration, Sound, Toast};

    let result = Toast::new(Toast::POWERSHELL_APP_ID)
        .title(title)
        .text1(body)
        .text2(APP_NAME)
        .sound(Some(Sound::Default))
        .duration(ToastDuration::Short)
        .show();

    if let Err(e) = result {
        warn!(error = %e, "Failed to show toast notification");
    }
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

unsafe fn register_class(instance: HINSTANCE) -> bool {
    let class_name = wide(CLASS_NAME);
    let mut class: WNDCLASSEXW = std::mem::zeroed();
    class.cbSize = std::mem::size_of::<WNDCLASSEXW>() as u32;
    class.lpfnWndProc = Some(popup_proc);
    class.hInstance = instance;
    class.hCursor = LoadCursorW(0, IDC_HAND);
    class.lpszClassName = class_name.as_ptr();
    RegisterClassExW(&class) != 0
}

unsafe fn create_popup(
    instance: HINSTANCE,
    slot: i32,
    handle: PromptHandle,
    prompt: CancellablePrompt,
) -> Option<HWND> {
    let (x, y) = popup_position(slot);
    let class_name = wide(CLASS_NAME);
    let window_title = wide(&prompt.title);

    let hwnd = CreateWindowExW(
        WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE | WS_EX_LAYERED,
        class_name.as_ptr(),
        window_title.as_ptr(),
        WS_POPUP,
        x,
        y,
        POPUP_WIDTH,
        POPUP_HEIGHT,
        0,
        0,
        instance,
        std::ptr::null(),
    );
    if hwnd == 0 {
        return None;
    }

    SetLayeredWindowAttributes(hwnd, 0, ALPHA, LWA_ALPHA);
    POPUPS.with(|p| {
        p.borrow_mut().insert(
            hwnd,
            Popup {
                handle,
                prompt,
                clicked: false,
            },
        )
    });
    SetTimer(hwnd, TIMER_ID, FRAME_MS, None);
    ShowWindow(hwnd, SW_SHOWNOACTIVATE);
    Some(hwnd)
}

/// Bottom-right of the work area, stacking upwards.
unsafe fn popup_position(slot: i32) -> (i32, i32) {
    let mut work: RECT = std::mem::zeroed();
    let ok = SystemParametersInfoW(
        SPI_GETWORKAREA,
        0,
        &mut work as *mut RECT as *mut std::ffi::c_void,
        0,
    );
    if ok == 0 {
        work = RECT {
            left: 0,
            top: 0,
            right: 1280,
            bottom: 720,
        };
    }
    let x = work.right - POPUP_WIDTH - MARGIN_X;
    let y = work.bottom - POPUP_HEIGHT - MARGIN_Y - slot * (POPUP_HEIGHT + POPUP_GAP);
    (x, y)
}

unsafe extern "system" fn popup_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_PAINT => {
            paint(hwnd);
            0
        }
        WM_TIMER => {
            let finished = POPUPS.with(|p| {
                p.borrow()
                    .get(&hwnd)
                    .map(|popup| Instant::now() >= popup.prompt.deadline + LINGER)
            });
            match finished {
                Some(true) => {
                    DestroyWindow(hwnd);
                }
                Some(false) => {
                    InvalidateRect(hwnd, std::ptr::null(), 0);
                }
                None => {}
            }
            0
        }
        WM_LBUTTONDOWN => {
            let trigger = POPUPS.with(|p| {
                p.borrow_mut().get_mut(&hwnd).and_then(|popup| {
                    if popup.clicked {
                        None
                    } else {
                        popup.clicked = true;
                        Some(Arc::clone(&popup.prompt.on_click))
                    }
                })
            });
            if let Some(trigger) = trigger {
                debug!("Countdown prompt clicked");
                trigger();
            }
            0
        }
        WM_DESTROY => {
            KillTimer(hwnd, TIMER_ID);
            POPUPS.with(|p| p.borrow_mut().remove(&hwnd));
            0
        }
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

unsafe fn paint(hwnd: HWND) {
    let mut ps: PAINTSTRUCT = std::mem::zeroed();
    let hdc = BeginPaint(hwnd, &mut ps);

    let mut client: RECT = std::mem::zeroed();
    GetClientRect(hwnd, &mut client);
    fill(hdc, &client, BG_COLOR);

    let now = Instant::now();
    let content = POPUPS.with(|p| {
        p.borrow().get(&hwnd).map(|popup| {
            (
                popup.prompt.title.clone(),
                popup.prompt.render_body(now),
                popup.prompt.progress(now),
            )
        })
    });

    if let Some((title, body, progress)) = content {
        SelectObject(hdc, GetStockObject(DEFAULT_GUI_FONT));
        SetBkMode(hdc, TRANSPARENT);
        SetTextColor(hdc, FG_COLOR);

        let inner_right = client.right - PADDING;
        let mut title_rect = RECT {
            left: PADDING,
            top: PADDING,
            right: inner_right,
            bottom: PADDING + 20,
        };
        draw_text(
            hdc,
            &title,
            &mut title_rect,
            DT_LEFT | DT_SINGLELINE | DT_END_ELLIPSIS | DT_NOPREFIX,
        );

        let bar_top = client.bottom - PADDING - BAR_HEIGHT;
        let mut body_rect = RECT {
            left: PADDING,
            top: PADDING + 26,
            right: inner_right,
            bottom: bar_top - 6,
        };
        draw_text(
            hdc,
            &body,
            &mut body_rect,
            DT_LEFT | DT_WORDBREAK | DT_END_ELLIPSIS | DT_NOPREFIX,
        );

        let trough = RECT {
            left: PADDING,
            top: bar_top,
            right: inner_right,
            bottom: bar_top + BAR_HEIGHT,
        };
        fill(hdc, &trough, TROUGH_COLOR);

        let filled = ((trough.right - trough.left) as f32 * progress) as i32;
        if filled > 0 {
            let bar = RECT {
                right: trough.left + filled,
                ..trough
            };
            fill(hdc, &bar, BAR_COLOR);
        }
    }

    EndPaint(hwnd, &ps);
}

unsafe fn fill(hdc: HDC, rect: &RECT, color: u32) {
    let brush = CreateSolidBrush(color);
    FillRect(hdc, rect, brush);
    DeleteObject(brush);
}

unsafe fn draw_text(hdc: HDC, text: &str, rect: &mut RECT, format: u32) {
    let mut buf: Vec<u16> = text.encode_utf16().collect();
    DrawTextW(hdc, buf.as_mut_ptr(), buf.len() as i32, rect, format);
}
