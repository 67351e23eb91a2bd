//! The fatal error path.
//!
//! Failed graphics calls and a missing graphics device are treated as
//! environment errors, not steady-state conditions. They end up here: the
//! reason is logged, the log file is flushed, the user is shown a message box
//! and the process is aborted.

use std::fmt::Display;

use crate::logging;

/// Title of the message box shown on a fatal error.
pub const CRASH_TITLE: &str = "Critical error";

/// Log `reason`, flush the log, notify the user and abort the process.
pub fn crash(reason: impl Display) -> ! {
    tracing::error!("{reason}");
    tracing::error!("Engine requested a crash, see the log file for details");
    logging::flush();

    show_dialog(&reason.to_string());

    std::process::abort()
}

#[cfg(feature = "dialog")]
fn show_dialog(reason: &str) {
    let _ = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(CRASH_TITLE)
        .set_description(format!("{reason}\n\nCheck the log file for details."))
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

#[cfg(not(feature = "dialog"))]
fn show_dialog(reason: &str) {
    eprintln!("{CRASH_TITLE}: {reason}");
}
