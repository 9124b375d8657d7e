//! # Fatal invariant checks.
//!
//! Process-wide assertion facility for **programmer errors**: violated
//! preconditions, impossible states, corrupt fixtures. On failure it flushes
//! every registered flushable, writes a structured record (message, key-value
//! pairs, registered diagnostic dumps, backtrace) to stderr, and terminates
//! the process with a non-zero exit code.
//!
//! This is deliberately not an error type: invariant violations indicate a
//! bug in the caller, not a runtime condition to recover from. Operational
//! failures travel as `Result` values (see [`crate::error`]).
//!
//! ## Rules
//! - `ensure` / `not_none` / `no_error` / `never` terminate on failure.
//! - Diagnostic state can be registered up front with [`add_dump`] and is
//!   included in the failure record.
//! - Flushables registered with [`add_flush`] run before the record is
//!   written, so buffered log output is not lost.
//!
//! Both registries are init-on-first-use singletons with no teardown.

use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, OnceLock};

/// Diagnostic state that can be dumped into an assertion failure record.
pub trait DumpState: Send + Sync {
    /// Renders the current state as a human-readable string.
    fn dump(&self) -> String;
}

/// Sink that buffers output and can be flushed before the process exits.
pub trait Flush: Send + Sync {
    /// Flushes any buffered output.
    fn flush(&self);
}

fn flushes() -> &'static Mutex<Vec<Box<dyn Flush>>> {
    static FLUSHES: OnceLock<Mutex<Vec<Box<dyn Flush>>>> = OnceLock::new();
    FLUSHES.get_or_init(|| Mutex::new(Vec::new()))
}

fn dumps() -> &'static Mutex<HashMap<String, Box<dyn DumpState>>> {
    static DUMPS: OnceLock<Mutex<HashMap<String, Box<dyn DumpState>>>> = OnceLock::new();
    DUMPS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers diagnostic state to include in failure records.
pub fn add_dump(key: impl Into<String>, value: Box<dyn DumpState>) {
    if let Ok(mut map) = dumps().lock() {
        map.insert(key.into(), value);
    }
}

/// Removes previously registered diagnostic state.
pub fn remove_dump(key: &str) {
    if let Ok(mut map) = dumps().lock() {
        map.remove(key);
    }
}

/// Registers a flushable to run before the process exits on failure.
pub fn add_flush(flusher: Box<dyn Flush>) {
    if let Ok(mut list) = flushes().lock() {
        list.push(flusher);
    }
}

fn fail(msg: &str, kv: &[(&str, String)]) -> ! {
    if let Ok(list) = flushes().lock() {
        for f in list.iter() {
            f.flush();
        }
    }

    let mut err = std::io::stderr().lock();
    let _ = writeln!(err, "INVARIANT VIOLATION");
    let _ = writeln!(err, "    msg={msg}");
    for (k, v) in kv {
        let _ = writeln!(err, "    {k}={v}");
    }
    if let Ok(map) = dumps().lock() {
        for (k, v) in map.iter() {
            let _ = writeln!(err, "    {k}={}", v.dump());
        }
    }
    let _ = writeln!(err, "{}", Backtrace::force_capture());
    drop(err);

    std::process::exit(1);
}

/// Terminates the process unless `truth` holds.
pub fn ensure(truth: bool, msg: &str) {
    if truth {
        return;
    }
    fail(msg, &[]);
}

/// Like [`ensure`], with extra key-value context in the failure record.
pub fn ensure_with(truth: bool, msg: &str, kv: &[(&str, String)]) {
    if truth {
        return;
    }
    fail(msg, kv);
}

/// Unwraps an `Option`, terminating the process if it is `None`.
pub fn not_none<T>(item: Option<T>, msg: &str) -> T {
    match item {
        Some(v) => v,
        None => fail(msg, &[]),
    }
}

/// Unwraps a `Result`, terminating the process on `Err`.
pub fn no_error<T, E: std::fmt::Display>(res: Result<T, E>, msg: &str) -> T {
    match res {
        Ok(v) => v,
        Err(e) => fail(msg, &[("error", e.to_string())]),
    }
}

/// Marks unreachable code; always terminates the process.
pub fn never(msg: &str) -> ! {
    fail(msg, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl DumpState for Dummy {
        fn dump(&self) -> String {
            "dummy-state".to_string()
        }
    }

    #[test]
    fn passing_checks_do_not_terminate() {
        ensure(true, "must not fire");
        ensure_with(1 < 2, "must not fire", &[("a", "b".to_string())]);
        assert_eq!(not_none(Some(7), "must not fire"), 7);
        let ok: Result<&str, std::convert::Infallible> = Ok("fine");
        assert_eq!(no_error(ok, "must not fire"), "fine");
    }

    #[test]
    fn dump_registry_roundtrip() {
        add_dump("dummy", Box::new(Dummy));
        remove_dump("dummy");
    }
}
