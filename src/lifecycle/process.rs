//! Process control over `sysinfo` and `std::process`.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Snapshot of one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
}

impl ProcessInfo {
    /// Case-insensitive substring match against name or executable path.
    pub fn matches_any(&self, markers: &[String]) -> bool {
        let name = self.name.to_lowercase();
        let exe = self
            .exe
            .as_ref()
            .map(|p| p.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        markers.iter().any(|marker| {
            let marker = marker.to_lowercase();
            !marker.is_empty() && (name.contains(&marker) || exe.contains(&marker))
        })
    }
}

/// Query, terminate and launch processes.
pub trait ProcessControl: Send {
    fn find(&mut self, pid: u32) -> Option<ProcessInfo>;

    fn is_alive(&mut self, pid: u32) -> bool {
        self.find(pid).is_some()
    }

    /// Returns true if a kill signal was delivered.
    fn terminate(&mut self, pid: u32) -> bool;

    /// Spawns `program` and returns its pid.
    fn launch(&mut self, program: &Path, args: &[String]) -> std::io::Result<u32>;
}

/// `ProcessControl` backed by `sysinfo`.
///
/// Launched children are kept and reaped once they exit, so relaunches do
/// not leave zombies behind.
pub struct SysinfoProcessControl {
    system: System,
    children: Vec<Child>,
}

impl SysinfoProcessControl {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            children: Vec::new(),
        }
    }

    /// Waits on every launched child that has exited.
    fn reap(&mut self) {
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl Default for SysinfoProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SysinfoProcessControl {
    fn find(&mut self, pid: u32) -> Option<ProcessInfo> {
        self.reap();
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        self.system.process(pid).map(|process| ProcessInfo {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            exe: process.exe().map(Path::to_path_buf),
        })
    }

    fn terminate(&mut self, pid: u32) -> bool {
        if let Some(idx) = self.children.iter().position(|c| c.id() == pid) {
            let mut child = self.children.swap_remove(idx);
            let killed = child.kill().is_ok();
            let _ = child.wait();
            return killed;
        }
        self.reap();
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        self.system
            .process(pid)
            .map(|process| process.kill())
            .unwrap_or(false)
    }

    fn launch(&mut self, program: &Path, args: &[String]) -> std::io::Result<u32> {
        self.reap();
        let child = Command::new(program).args(args).spawn()?;
        let pid = child.id();
        self.children.push(child);
        Ok(pid)
    }
}
