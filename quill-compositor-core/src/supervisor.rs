//! Interface to the process supervisor that launches and pauses client
//! applications.

use nix::errno::Errno;
use nix::sys::signal::killpg;
use nix::unistd::Pid;

/// Lifecycle changes of a client process group, as reported by the
/// supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    Paused(i32),
    Resumed(i32),
    Exited(i32),
    Foreground(i32),
    Background(i32),
}

impl SupervisorEvent {
    pub fn pgid(&self) -> i32 {
        match *self {
            SupervisorEvent::Paused(pgid)
            | SupervisorEvent::Resumed(pgid)
            | SupervisorEvent::Exited(pgid)
            | SupervisorEvent::Foreground(pgid)
            | SupervisorEvent::Background(pgid) => pgid,
        }
    }
}

pub trait ProcessSupervisor: Send + Sync {
    fn process_group_exists(&self, pgid: i32) -> bool;

    fn is_paused(&self, pgid: i32) -> bool;

    /// Whether `pgid` holds the named permission. Everyone may use the GUI
    /// unless the supervisor says otherwise.
    fn has_permission(&self, _pgid: i32, _permission: &str) -> bool {
        true
    }
}

/// Supervisor backed by the kernel's view of process groups. It never
/// reports a group as paused.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSupervisor;

impl ProcessSupervisor for SystemSupervisor {
    fn process_group_exists(&self, pgid: i32) -> bool {
        if pgid <= 0 {
            return false;
        }
        // Signal 0 performs the existence and permission checks only.
        match killpg(Pid::from_raw(pgid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn is_paused(&self, _pgid: i32) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::getpgrp;

    #[test]
    fn test_own_process_group_exists() {
        let supervisor = SystemSupervisor;
        assert!(supervisor.process_group_exists(getpgrp().as_raw()));
        assert!(!supervisor.process_group_exists(0));
        assert!(!supervisor.process_group_exists(-5));
        assert!(supervisor.has_permission(1, "gui"));
    }

    #[test]
    fn test_event_pgid() {
        assert_eq!(SupervisorEvent::Exited(42).pgid(), 42);
        assert_eq!(SupervisorEvent::Background(7).pgid(), 7);
    }
}
