//! Clipboard copy for the output transcript.

use anyhow::{anyhow, Result};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// How long the clipboard owner stays alive after a copy. On X11/Wayland the
/// owning process serves paste requests, so dropping it at once loses the text.
const HOLD: Duration = Duration::from_secs(2);

/// Queue `text` for the clipboard thread. Never blocks the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    CLIPBOARD_SENDER
        .get_or_init(spawn_clipboard_thread)
        .send(text.to_string())
        .map_err(|_| anyhow!("Clipboard thread stopped"))
}

fn spawn_clipboard_thread() -> std_mpsc::Sender<String> {
    let (tx, rx) = std_mpsc::channel::<String>();
    std::thread::spawn(move || {
        for text in rx {
            let mut clipboard = match arboard::Clipboard::new() {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "clipboard unavailable");
                    continue;
                }
            };
            match clipboard.set_text(text) {
                Ok(()) => std::thread::sleep(HOLD),
                Err(e) => tracing::warn!(error = %e, "clipboard copy failed"),
            }
        }
    });
    tx
}
