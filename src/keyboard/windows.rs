//! Low-level keyboard hook on a dedicated thread.
//!
//! `WH_KEYBOARD_LL` callbacks are delivered to the installing thread's
//! message loop, so each listener owns a thread that installs the hook, pumps
//! messages until told to quit, then unhooks.

use std::cell::RefCell;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostQuitMessage,
    PostThreadMessageW, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, MSG,
    PM_NOREMOVE, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
};

use crate::coordinator::{CancelSource, StopHandle, Trigger};
use crate::error::ActionError;

const SOURCE_NAME: &str = "keyboard";

thread_local! {
    static TRIGGER: RefCell<Option<Trigger>> = const { RefCell::new(None) };
}

/// Fires on the first key-down anywhere in the session. The key itself is
/// passed through.
pub struct KeyboardHook;

impl CancelSource for KeyboardHook {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn start(&self, trigger: Trigger) -> Result<Box<dyn StopHandle>, ActionError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("bealink-keyhook".into())
            .spawn(move || hook_thread(trigger, ready_tx))
            .map_err(|e| listener_error(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                debug!(thread_id, "Keyboard hook installed");
                Ok(Box::new(HookHandle {
                    thread_id,
                    thread: Some(thread),
                }))
            }
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(listener_error(reason))
            }
            Err(_) => {
                let _ = thread.join();
                Err(listener_error("hook thread exited during startup".into()))
            }
        }
    }
}

fn listener_error(reason: String) -> ActionError {
    ActionError::ListenerStart {
        source_name: SOURCE_NAME,
        reason,
    }
}

struct HookHandle {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl StopHandle for HookHandle {
    fn stop(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for HookHandle {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Fails harmlessly when the hook already fired and the thread quit.
        unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
        if thread.join().is_err() {
            warn!("Keyboard hook thread panicked");
        }
        debug!(thread_id = self.thread_id, "Keyboard hook removed");
    }
}

fn hook_thread(trigger: Trigger, ready: mpsc::Sender<Result<u32, String>>) {
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        // Create the message queue before anyone can post WM_QUIT to it.
        PeekMessageW(&mut msg, 0, 0, 0, PM_NOREMOVE);

        TRIGGER.with(|t| *t.borrow_mut() = Some(trigger));

        let instance = GetModuleHandleW(std::ptr::null());
        let hook = SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), instance, 0);
        if hook == 0 {
            let err = std::io::Error::last_os_error();
            TRIGGER.with(|t| t.borrow_mut().take());
            let _ = ready.send(Err(format!("SetWindowsHookExW failed: {err}")));
            return;
        }

        let _ = ready.send(Ok(GetCurrentThreadId()));

        while GetMessageW(&mut msg, 0, 0, 0) > 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        UnhookWindowsHookEx(hook);
        TRIGGER.with(|t| t.borrow_mut().take());
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let message = wparam as u32;
    if code >= 0 && (message == WM_KEYDOWN || message == WM_SYSKEYDOWN) {
        if let Some(trigger) = TRIGGER.with(|t| t.borrow_mut().take()) {
            debug!("Key press detected, cancelling");
            trigger();
            PostQuitMessage(0);
        }
    }
    CallNextHookEx(0, code, wparam, lparam)
}
