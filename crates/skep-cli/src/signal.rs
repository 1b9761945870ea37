use std::sync::OnceLock;

use skep_types::CancelFlag;

/// Flag shared with the signal handler. Set once by
/// [`install_signal_handlers`] before any handler can fire.
static CANCEL: OnceLock<CancelFlag> = OnceLock::new();

/// Install SIGINT/SIGTERM handlers and return the flag they trip.
///
/// The first signal cancels cooperatively and restores the default
/// disposition, so a second signal terminates the process immediately.
pub(crate) fn install_signal_handlers() -> CancelFlag {
    let flag = CANCEL.get_or_init(CancelFlag::new).clone();

    #[cfg(unix)]
    {
        // Safety: the handler only flips an atomic and restores the default
        // disposition, both async-signal-safe.
        unsafe {
            libc::signal(
                libc::SIGTERM,
                unix_signal_handler as *const () as libc::sighandler_t,
            );
            libc::signal(
                libc::SIGINT,
                unix_signal_handler as *const () as libc::sighandler_t,
            );
        }
    }

    #[cfg(windows)]
    {
        unsafe {
            windows_sys::Win32::System::Console::SetConsoleCtrlHandler(
                Some(windows_console_handler),
                1, // TRUE
            );
        }
    }

    flag
}

#[cfg(unix)]
extern "C" fn unix_signal_handler(sig: libc::c_int) {
    if let Some(flag) = CANCEL.get() {
        flag.cancel();
    }
    // Restore the default handler so a second signal kills immediately.
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

#[cfg(windows)]
unsafe extern "system" fn windows_console_handler(ctrl_type: u32) -> i32 {
    // CTRL_C_EVENT (0), CTRL_BREAK_EVENT (1), CTRL_CLOSE_EVENT (2)
    if ctrl_type <= 2 {
        if let Some(flag) = CANCEL.get() {
            flag.cancel();
        }
        // Unregister this handler so a second signal terminates immediately.
        windows_sys::Win32::System::Console::SetConsoleCtrlHandler(
            Some(windows_console_handler),
            0, // FALSE = remove
        );
        return 1; // TRUE = handled this time
    }
    0 // FALSE = not handled
}
