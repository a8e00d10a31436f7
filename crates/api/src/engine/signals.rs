//! Unix process signal helpers.
//!
//! Used by the singleton guard and the worker table to manage processes
//! the current task does not hold a `Child` handle for.

use std::io;

/// Ask `pid` to terminate gracefully (SIGTERM).
pub fn send_term(pid: u32) -> io::Result<()> {
    send(pid, libc::SIGTERM)
}

/// Force-kill `pid` (SIGKILL).
pub fn send_kill(pid: u32) -> io::Result<()> {
    send(pid, libc::SIGKILL)
}

/// Whether a process with `pid` currently exists.
///
/// Signal 0 performs the existence check without delivering anything;
/// `EPERM` still means the process exists.
pub fn is_alive(pid: u32) -> bool {
    // SAFETY: kill(2) with signal 0 probes for existence, no memory involved.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn send(pid: u32, sig: libc::c_int) -> io::Result<()> {
    // SAFETY: plain kill(2) call on a known pid.
    let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
