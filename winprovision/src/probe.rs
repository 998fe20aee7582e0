//! Adapters that turn everyday checks into [`ReadinessProbe`]s.

use crate::waiter::{Readiness, ReadinessProbe};
use std::convert::Infallible;
use std::fmt::Display;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

/// Ready with `()` once `check` returns true.
pub fn until(
    mut check: impl FnMut() -> bool,
) -> impl ReadinessProbe<Output = (), Error = Infallible> {
    move || -> Readiness<(), Infallible> {
        if check() {
            Readiness::Ready(())
        } else {
            Readiness::NotReadyYet
        }
    }
}

/// Ready with the value once `lookup` returns `Some`.
pub fn present<T>(
    mut lookup: impl FnMut() -> Option<T>,
) -> impl ReadinessProbe<Output = T, Error = Infallible> {
    move || -> Readiness<T, Infallible> { Readiness::from(lookup()) }
}

/// `Ok(Some)` is ready, `Ok(None)` is not yet, `Err` is a fault.
pub fn fallible<T, E>(
    mut lookup: impl FnMut() -> Result<Option<T>, E>,
) -> impl ReadinessProbe<Output = T, Error = E> {
    move || -> Readiness<T, E> {
        match lookup() {
            Ok(value) => Readiness::from(value),
            Err(e) => Readiness::Fault(e),
        }
    }
}

/// Like [`fallible`], but errors accepted by `is_transient` are retried.
pub fn transient_when<T, E: Display>(
    mut lookup: impl FnMut() -> Result<Option<T>, E>,
    is_transient: impl Fn(&E) -> bool,
) -> impl ReadinessProbe<Output = T, Error = E> {
    move || -> Readiness<T, E> {
        match lookup() {
            Ok(value) => Readiness::from(value),
            Err(e) if is_transient(&e) => {
                debug!("transient probe error, retrying: {}", e);
                Readiness::NotReadyYet
            }
            Err(e) => Readiness::Fault(e),
        }
    }
}

/// Retry on every error.
///
/// This hides genuine failures until the deadline; prefer [`transient_when`]
/// unless the check is known to only fail while the target is absent.
pub fn absorb_errors<T, E: Display>(
    mut lookup: impl FnMut() -> Result<Option<T>, E>,
) -> impl ReadinessProbe<Output = T, Error = E> {
    move || -> Readiness<T, E> {
        match lookup() {
            Ok(value) => Readiness::from(value),
            Err(e) => {
                debug!("ignoring probe error: {}", e);
                Readiness::NotReadyYet
            }
        }
    }
}

/// Run each call of `probe` through [`tokio::task::block_in_place`].
///
/// For probes that block for a noticeable time (screen capture, CPU sampling).
/// Outside a multi-threaded runtime the probe runs inline.
pub fn blocking<P: ReadinessProbe>(
    mut probe: P,
) -> impl ReadinessProbe<Output = P::Output, Error = P::Error> {
    move || -> Readiness<P::Output, P::Error> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| probe.probe())
            }
            _ => probe.probe(),
        }
    }
}
