//! Logging sink.
//!
//! Every module that changes VFS state (mount, unmount, teardown, backend
//! registration) logs through here, the same `fn log(msg: &str)` forwarding
//! convention repeated per module throughout this crate. Unlike a real
//! kernel console there is no UART to bind to in this crate's scope (§1
//! treats hardware as an external collaborator), so the transport is a sink
//! function pointer installed once at boot instead of a hardwired MMIO
//! address.

use spin::Mutex;

type Sink = fn(&str);

fn default_sink(_msg: &str) {}

static SINK: Mutex<Sink> = Mutex::new(default_sink);

/// Install the console's print sink. Intended to be called once at boot,
/// before any mount activity.
pub fn set_sink(sink: Sink) {
    *SINK.lock() = sink;
}

/// Write a line to the installed sink.
pub fn print(msg: &str) {
    (SINK.lock())(msg);
}
