use mcbot_protocol::status::PerformanceCounter;
use std::io;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[cfg(windows)]
use winapi::shared::minwindef::{DWORD, FALSE};
#[cfg(windows)]
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
#[cfg(windows)]
use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
#[cfg(windows)]
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Process32First, Process32Next, PROCESSENTRY32, TH32CS_SNAPPROCESS,
};
#[cfg(windows)]
use winapi::um::winnt::PROCESS_TERMINATE;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

pub struct ProcessHelper;

impl ProcessHelper {
    /// Forcefully kills the process and everything it spawned.
    /// On Unix the process must lead its own process group (see `process::spawn`).
    #[cfg(unix)]
    pub fn kill_tree(pid: u32) -> io::Result<()> {
        killpg(NixPid::from_raw(pid as i32), Signal::SIGKILL)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Forcefully kills the process and its descendants with TerminateProcess.
    #[cfg(windows)]
    pub fn kill_tree(pid: u32) -> io::Result<()> {
        let mut targets = vec![pid];
        let mut index = 0;
        while index < targets.len() {
            let children = Self::child_ids(targets[index])?;
            targets.extend(children);
            index += 1;
        }
        // leaves first, so parents cannot respawn anything
        let mut result = Ok(());
        for target in targets.into_iter().rev() {
            if let Err(err) = Self::terminate(target) {
                if target == pid {
                    result = Err(err);
                }
            }
        }
        result
    }

    #[cfg(windows)]
    fn terminate(pid: u32) -> io::Result<()> {
        let handle = unsafe { OpenProcess(PROCESS_TERMINATE, FALSE, pid) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        let result = unsafe { TerminateProcess(handle, 1) };
        unsafe { CloseHandle(handle) };
        if result == 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(windows)]
    fn child_ids(parent_pid: u32) -> io::Result<Vec<u32>> {
        let mut result = Vec::new();
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }

        let mut entry: PROCESSENTRY32 = unsafe { std::mem::zeroed() };
        entry.dwSize = std::mem::size_of::<PROCESSENTRY32>() as DWORD;

        if unsafe { Process32First(snapshot, &mut entry) } != 0 {
            loop {
                if entry.th32ParentProcessID == parent_pid && entry.th32ProcessID != parent_pid {
                    result.push(entry.th32ProcessID);
                }
                if unsafe { Process32Next(snapshot, &mut entry) } == 0 {
                    break;
                }
            }
        }

        unsafe { CloseHandle(snapshot) };
        Ok(result)
    }

    /// CPU and memory of a live process, `None` if it is gone.
    pub async fn sample(pid: u32) -> Option<PerformanceCounter> {
        let pid = Pid::from_u32(pid);
        let refresh = ProcessRefreshKind::nothing().with_cpu().with_memory();
        let mut system = System::new();

        // cpu usage is a delta between two refreshes
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh);
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh);

        system.process(pid).map(|process| PerformanceCounter {
            cpu: process.cpu_usage(),
            memory: process.memory(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn kill_tree_terminates_group() {
        use std::os::unix::process::CommandExt;

        let mut child = Command::new("sh")
            .args(["-c", "sleep 30 & sleep 30"])
            .process_group(0)
            .spawn()
            .unwrap();

        ProcessHelper::kill_tree(child.id()).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn kill_missing_group_is_error() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(ProcessHelper::kill_tree(pid).is_err());
    }

    #[tokio::test]
    async fn sample_own_process() {
        let counter = ProcessHelper::sample(std::process::id()).await.unwrap();
        assert!(counter.memory > 0);
    }
}
