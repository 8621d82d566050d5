//! Terminal rendering of progress events

use std::io::Write;

use gitsync_core::progress::{CheckoutProgress, ProgressEvent};
use gitsync_core::TransferProgress;
use tokio::sync::mpsc::UnboundedReceiver;

/// Draw progress on stderr until the sending side goes away
pub async fn render_progress(mut rx: UnboundedReceiver<ProgressEvent>, verbose: bool) {
    let mut stderr = std::io::stderr();
    let mut line_open = false;

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::Phase { phase } => {
                if verbose {
                    end_line(&mut stderr, &mut line_open);
                    let _ = writeln!(stderr, "[{}]", phase);
                }
            }
            ProgressEvent::Transfer(progress) => {
                let _ = write!(stderr, "\r{}", transfer_line(&progress));
                line_open = true;
            }
            ProgressEvent::Remote { message } => {
                end_line(&mut stderr, &mut line_open);
                let _ = writeln!(stderr, "remote: {}", message);
            }
            ProgressEvent::Checkout(progress) => {
                let _ = write!(stderr, "\r{}", checkout_line(&progress));
                line_open = true;
            }
            ProgressEvent::Cleared => end_line(&mut stderr, &mut line_open),
        }
        let _ = stderr.flush();
    }
    end_line(&mut stderr, &mut line_open);
}

fn end_line(stderr: &mut std::io::Stderr, line_open: &mut bool) {
    if *line_open {
        let _ = writeln!(stderr);
        *line_open = false;
    }
}

fn transfer_line(progress: &TransferProgress) -> String {
    format!(
        "Receiving objects: {:>3}% ({}/{}), {}",
        progress.percent(),
        progress.received_objects,
        progress.total_objects,
        human_bytes(progress.received_bytes)
    )
}

fn checkout_line(progress: &CheckoutProgress) -> String {
    format!(
        "Checking out files: {:>3}% ({}/{})",
        (progress.fraction() * 100.0).round() as u8,
        progress.completed,
        progress.total
    )
}

fn human_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= KIB * KIB {
        format!("{:.2} MiB", bytes / (KIB * KIB))
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}
