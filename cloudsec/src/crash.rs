//! Panic guard for resource and data source entry points
//!
//! Panics become error diagnostics. When a crash directory is configured the
//! guard also writes a report with the captured backtrace.

use futures::FutureExt;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tfplug::Diagnostic;

#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

/// Record panic details for [`guard`]. Installed once at start-up.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let report = PanicReport {
            message: payload_message(info.payload()),
            location: info.location().map(ToString::to_string),
            backtrace: Backtrace::force_capture().to_string(),
        };
        tracing::error!(
            message = %report.message,
            location = report.location.as_deref().unwrap_or("unknown"),
            "provider panicked"
        );
        LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(report));
    }));
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `future`, converting a panic into an error diagnostic
pub async fn guard<F, T>(operation: &str, crash_dir: Option<&Path>, future: F) -> Result<T, Diagnostic>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(payload) => {
            let report = LAST_PANIC
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| PanicReport {
                    message: payload_message(&*payload),
                    location: None,
                    backtrace: String::new(),
                });

            let mut detail = format!(
                "The provider panicked during {}: {}",
                operation, report.message
            );
            if let Some(dir) = crash_dir {
                match write_crash_report(dir, operation, &report) {
                    Ok(path) => {
                        detail.push_str(&format!("\n\nCrash report written to {}", path.display()))
                    }
                    Err(e) => tracing::error!(error = %e, dir = %dir.display(), "failed to write crash report"),
                }
            }

            Err(Diagnostic::error("Provider crashed", detail))
        }
    }
}

/// Write a crash report into `dir`, returning the file path
pub fn write_crash_report(
    dir: &Path,
    operation: &str,
    report: &PanicReport,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!(
        "terraform-provider-cloudsec-crash-{}-{}.log",
        std::process::id(),
        timestamp
    ));

    let contents = format!(
        "operation: {}\npanic: {}\nlocation: {}\n\n{}\n",
        operation,
        report.message,
        report.location.as_deref().unwrap_or("unknown"),
        report.backtrace
    );
    std::fs::write(&path, contents)?;

    Ok(path)
}
