//! Worker-process liveness.
//!
//! The cancel path compares the worker identity recorded at launch against
//! the live process table; a mismatch means the worker died and the stored
//! status must be forced to FAILED.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use sysinfo::{Pid, ProcessStatus, System};

/// Identity of the process hosting the scheduler worker, recorded in the
/// apply row at launch.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub pid: i32,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

impl WorkerIdentity {
    /// Identity of the current process.
    pub fn current() -> Self {
        let pid = std::process::id();
        let command = std::env::args().collect::<Vec<_>>().join(" ");
        let started_at = process_start_time(pid).unwrap_or_else(Utc::now);
        WorkerIdentity {
            pid: pid as i32,
            command,
            started_at,
        }
    }
}

fn process_start_time(pid: u32) -> Option<DateTime<Utc>> {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_process(pid);
    let process = system.process(pid)?;
    Utc.timestamp_opt(process.start_time() as i64, 0).single()
}

/// Returns `true` when the recorded pid is a live, non-zombie process whose
/// executable matches the recorded command line. PID reuse by an unrelated
/// process reads as dead.
pub fn probe(pid: i32, expected_command: &str) -> bool {
    if pid <= 0 {
        return false;
    }
    let mut system = System::new();
    let pid = Pid::from_u32(pid as u32);
    system.refresh_process(pid);
    let Some(process) = system.process(pid) else {
        return false;
    };
    if matches!(process.status(), ProcessStatus::Zombie) {
        return false;
    }

    let expected_argv0 = expected_command.split_whitespace().next().unwrap_or("");
    let actual_argv0 = process
        .cmd()
        .first()
        .map(String::as_str)
        .unwrap_or_else(|| process.name());

    actual_argv0 == expected_argv0
        || Path::new(actual_argv0).file_name() == Path::new(expected_argv0).file_name()
}
