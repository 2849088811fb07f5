//! Global failure capture
//!
//! Routes panics and failed background tasks into `Monitoring::report_error`.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::Monitoring;
use crate::models::ErrorReport;

/// Reports every panic in the process, then runs the previously installed hook.
pub fn install_panic_hook(monitoring: Arc<Monitoring>) {
    monitoring.mark_panic_hook_installed();
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let mut report = ErrorReport::new("panic", panic_message(info.payload()));
        if let Some(location) = info.location() {
            report = report.with_context(
                "location",
                format!("{}:{}:{}", location.file(), location.line(), location.column()),
            );
        }
        if let Some(thread) = std::thread::current().name() {
            report = report.with_context("thread", thread);
        }
        monitoring.report_error(report);

        previous(info);
    }));
}

/// Spawns `future` and reports it if it returns an error or panics.
///
/// Panics are left to the panic hook when one is installed, so each failure
/// is reported once.
pub fn spawn_monitored<F>(monitoring: Arc<Monitoring>, name: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let task = tokio::spawn(future);

    tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => monitoring.report_error(
                ErrorReport::new("unhandled_task_error", format!("{:#}", err))
                    .with_context("task", name),
            ),
            Err(join_err) if join_err.is_panic() => {
                if !monitoring.panic_hook_installed() {
                    let payload = join_err.into_panic();
                    monitoring.report_error(
                        ErrorReport::new("task_panic", panic_message(&*payload))
                            .with_context("task", name),
                    );
                }
            }
            // Cancelled
            Err(_) => {}
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
