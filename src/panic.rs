//! Panic containment for user code.
//!
//! Handlers and lifecycle callbacks are application code running inside
//! session and runtime tasks. A panic in one of them is caught at the call
//! boundary, turned into a [`PanicMessage`] for logging, and never unwinds
//! into the task that invoked it.

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
};

use futures::FutureExt;

/// Wrapper that formats a panic payload when logged or displayed.
///
/// The payload is downcast to `String` or `&'static str` if possible and falls
/// back to `Debug` formatting otherwise.
///
/// ```
/// use playwire::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(
///     format_panic(Box::new(String::from("boom"))).to_string(),
///     "boom"
/// );
/// assert!(format_panic(Box::new(5_u32)).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

/// Run `f`, converting a panic into an error.
///
/// # Errors
///
/// Returns the formatted panic payload if `f` panicked.
pub fn call_guarded<R>(f: impl FnOnce() -> R) -> Result<R, PanicMessage> {
    catch_unwind(AssertUnwindSafe(f)).map_err(format_panic)
}

/// Await `future`, converting a panic during any poll into an error.
///
/// # Errors
///
/// Returns the formatted panic payload if `future` panicked.
pub async fn await_guarded<F: Future>(future: F) -> Result<F::Output, PanicMessage> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(format_panic)
}
