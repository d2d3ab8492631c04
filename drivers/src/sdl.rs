//! The SDL context shared by the SDL video, audio and input drivers.
//!
//! SDL may only be initialized once at a time and its handles are bound to
//! the thread that created them, so the context and the single event pump
//! live in thread-local storage on the run-loop thread. Every SDL driver
//! holds a [`Lease`] on it; when the last lease is released the pump and
//! the context are dropped, and SDL quits once the drivers' own subsystem
//! handles are gone too.

use std::cell::RefCell;

use ardubridge_core::driver::DriverError;
use sdl2::{EventPump, Sdl};

struct Context {
    sdl: Sdl,
    events: Option<EventPump>,
    leases: usize,
}

thread_local! {
    static CONTEXT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

fn unavailable(what: &str, e: impl std::fmt::Display) -> DriverError {
    DriverError::Unavailable(format!("SDL {what}: {e}"))
}

/// One driver's hold on the thread's SDL context.
pub(crate) struct Lease {
    sdl: Sdl,
    held: bool,
}

impl Lease {
    /// Take a lease, initializing SDL on the first one.
    pub(crate) fn acquire() -> Result<Self, DriverError> {
        CONTEXT.with(|cell| {
            let mut slot = cell.borrow_mut();
            if let Some(ctx) = slot.as_mut() {
                ctx.leases += 1;
                return Ok(Self {
                    sdl: ctx.sdl.clone(),
                    held: true,
                });
            }
            let sdl = sdl2::init().map_err(|e| unavailable("init", e))?;
            log::debug!("SDL {} initialized", sdl2::version::version());
            *slot = Some(Context {
                sdl: sdl.clone(),
                events: None,
                leases: 1,
            });
            Ok(Self { sdl, held: true })
        })
    }

    pub(crate) fn sdl(&self) -> &Sdl {
        &self.sdl
    }

    /// Give the lease back. The last one drops the event pump and context.
    /// Releasing twice is a no-op.
    pub(crate) fn release(&mut self) {
        if !std::mem::take(&mut self.held) {
            return;
        }
        // The thread-local may already be gone while the thread exits.
        let _ = CONTEXT.try_with(|cell| {
            let mut slot = cell.borrow_mut();
            let last = match slot.as_mut() {
                Some(ctx) => {
                    ctx.leases = ctx.leases.saturating_sub(1);
                    ctx.leases == 0
                }
                None => false,
            };
            if last {
                *slot = None;
                log::debug!("SDL context released");
            }
        });
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run `f` with the thread's event pump, creating it on first use.
///
/// Only valid while some driver holds a [`Lease`].
pub(crate) fn with_events<T>(f: impl FnOnce(&mut EventPump) -> T) -> Result<T, DriverError> {
    CONTEXT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let ctx = slot
            .as_mut()
            .ok_or_else(|| unavailable("context", "not initialized"))?;
        if ctx.events.is_none() {
            ctx.events = Some(
                ctx.sdl
                    .event_pump()
                    .map_err(|e| unavailable("event pump", e))?,
            );
        }
        match ctx.events.as_mut() {
            Some(pump) => Ok(f(pump)),
            None => Err(unavailable("event pump", "missing")),
        }
    })
}

#[cfg(test)]
fn leases() -> Option<usize> {
    CONTEXT.with(|cell| cell.borrow().as_ref().map(|ctx| ctx.leases))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_lease_drops_the_context() {
        let mut first = Lease::acquire().unwrap();
        let second = Lease::acquire().unwrap();
        assert_eq!(leases(), Some(2));

        first.release();
        first.release();
        assert_eq!(leases(), Some(1));

        drop(second);
        assert_eq!(leases(), None);
        assert!(with_events(|_| ()).is_err());
    }
}
