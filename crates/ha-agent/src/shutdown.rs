//! SIGINT/SIGTERM handling: flips a shared flag instead of doing any
//! async-signal-unsafe work in the handler itself, grounded in
//! `Agent._handle_quit`/`shutdown_requested`.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_quit(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs `SIGINT`/`SIGTERM` handlers that set the shutdown flag.
pub fn install_handlers() {
    // SAFETY: handle_quit only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handle_quit as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_quit as *const () as libc::sighandler_t);
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_out_not_requested() {
        assert!(!shutdown_requested());
    }
}
