// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Procfs lookups backing the last-resort kill steps.

use crate::errors::ControlError;
use crate::ports::ProcessKiller;
use async_trait::async_trait;
use log::{debug, trace};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::env;
use std::fs::{self, read_dir, read_link};
use std::path::{Path, PathBuf};

const TCP_LISTEN: u8 = 0x0A;

pub fn root_path() -> PathBuf {
    env::var("HOST_PROC")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/proc"))
}

fn pids(root: &Path) -> Result<Vec<u32>, ControlError> {
    let entries = read_dir(root)
        .map_err(|e| ControlError::Io(format!("reading {}: {e}", root.display())))?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect())
}

/// Pids whose `comm` is exactly `name`.
pub fn pids_by_name(root: &Path, name: &str) -> Result<Vec<u32>, ControlError> {
    let mut found: Vec<u32> = pids(root)?
        .into_iter()
        .filter(|pid| {
            fs::read_to_string(root.join(pid.to_string()).join("comm"))
                .is_ok_and(|comm| comm.trim_end() == name)
        })
        .collect();
    found.sort_unstable();
    Ok(found)
}

/// Socket inodes listening on `port`, from the tcp and tcp6 tables.
pub fn listening_inodes(root: &Path, port: u16) -> HashSet<u64> {
    let mut inodes = HashSet::new();
    for table in ["tcp", "tcp6"] {
        let Ok(contents) = fs::read_to_string(root.join("net").join(table)) else {
            continue;
        };
        // First line is the header.
        for line in contents.lines().skip(1) {
            if let Some((local_port, state, inode)) = parse_socket_line(line)
                && state == TCP_LISTEN
                && local_port == port
            {
                inodes.insert(inode);
            }
        }
    }
    inodes
}

fn parse_socket_line(line: &str) -> Option<(u16, u8, u64)> {
    let mut fields = line.split_whitespace();
    let local_address = fields.nth(1)?;
    let state = fields.nth(1)?;
    let inode = fields.nth(5)?;

    let (_, port) = local_address.rsplit_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;
    let state = u8::from_str_radix(state, 16).ok()?;
    let inode = inode.parse().ok()?;
    Some((port, state, inode))
}

/// Pids holding any of `inodes` open.
pub fn socket_owners(root: &Path, inodes: &HashSet<u64>) -> Result<Vec<u32>, ControlError> {
    if inodes.is_empty() {
        return Ok(Vec::new());
    }
    let mut owners: Vec<u32> = pids(root)?
        .into_iter()
        .filter(|pid| {
            let Ok(fds) = read_dir(root.join(pid.to_string()).join("fd")) else {
                return false;
            };
            fds.filter_map(|fd| fd.ok())
                .filter_map(|fd| read_link(fd.path()).ok())
                .filter_map(|link| socket_inode(&link))
                .any(|inode| inodes.contains(&inode))
        })
        .collect();
    owners.sort_unstable();
    Ok(owners)
}

fn socket_inode(link: &Path) -> Option<u64> {
    link.to_str()?
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn send(pid: u32, sig: Signal) -> Result<bool, ControlError> {
    let raw = i32::try_from(pid).map_err(|_| ControlError::Io(format!("invalid pid {pid}")))?;
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => Ok(true),
        // Already gone.
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(ControlError::Io(format!("sending {sig} to {pid}: {e}"))),
    }
}

/// Signals processes found through procfs.
pub struct ProcfsKiller {
    root: PathBuf,
}

impl ProcfsKiller {
    pub fn new() -> Self {
        Self::with_root(root_path())
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for ProcfsKiller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessKiller for ProcfsKiller {
    async fn signal_by_name(&self, name: &str, force: bool) -> Result<usize, ControlError> {
        let root = self.root.clone();
        let name = name.to_string();
        let sig = if force { Signal::SIGKILL } else { Signal::SIGTERM };

        tokio::task::spawn_blocking(move || {
            let own = std::process::id();
            let mut signalled = 0;
            let mut last_error = None;
            for pid in pids_by_name(&root, &name)? {
                if pid == own {
                    continue;
                }
                trace!("[{name}] sending {sig} to pid {pid}");
                match send(pid, sig) {
                    Ok(true) => signalled += 1,
                    Ok(false) => {}
                    Err(e) => last_error = Some(e),
                }
            }
            match last_error {
                Some(e) if signalled == 0 => Err(e),
                _ => Ok(signalled),
            }
        })
        .await
        .map_err(|e| ControlError::Io(format!("signal task failed: {e}")))?
    }

    async fn kill_port_owner(&self, port: u16) -> Result<Vec<u32>, ControlError> {
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || {
            let inodes = listening_inodes(&root, port);
            let owners = socket_owners(&root, &inodes)?;
            debug!("port {port} is held by {owners:?}");
            let mut killed = Vec::new();
            for pid in owners {
                if pid != std::process::id() && send(pid, Signal::SIGKILL)? {
                    killed.push(pid);
                }
            }
            Ok(killed)
        })
        .await
        .map_err(|e| ControlError::Io(format!("port kill task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    const TCP_TABLE: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:EE48 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 4242 1 0000000000000000 100 0 0 10 0
   1: 0100007F:EE49 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 4343 1 0000000000000000 100 0 0 10 0
   2: 0100007F:EE48 0100007F:9C40 01 00000000:00000000 00:00000000 00000000     0        0 4444 1 0000000000000000 20 4 30 10 -1
";

    fn fake_proc() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        for (pid, comm) in [(100, "xray"), (200, "nginx"), (300, "xray-helper")] {
            let proc_dir = root.join(pid.to_string());
            fs::create_dir_all(proc_dir.join("fd")).unwrap();
            fs::write(proc_dir.join("comm"), format!("{comm}\n")).unwrap();
        }
        symlink("socket:[4242]", root.join("100/fd/3")).unwrap();
        symlink("/dev/null", root.join("100/fd/0")).unwrap();
        symlink("socket:[4343]", root.join("200/fd/3")).unwrap();

        fs::create_dir_all(root.join("net")).unwrap();
        fs::write(root.join("net/tcp"), TCP_TABLE).unwrap();
        fs::create_dir_all(root.join("self")).unwrap();
        dir
    }

    #[test]
    fn test_pids_by_name_exact_match() {
        let dir = fake_proc();
        assert_eq!(pids_by_name(dir.path(), "xray").unwrap(), vec![100]);
        assert!(pids_by_name(dir.path(), "sing-box").unwrap().is_empty());
    }

    #[test]
    fn test_pids_by_name_missing_root() {
        assert!(pids_by_name(Path::new("/nonexistent/proc"), "xray").is_err());
    }

    #[test]
    fn test_listening_inodes_filters_state_and_port() {
        let dir = fake_proc();
        // 0xEE48 = 61000; the established socket on the same port is ignored.
        let inodes = listening_inodes(dir.path(), 61000);
        assert_eq!(inodes, HashSet::from([4242]));
    }

    #[test]
    fn test_listening_inodes_missing_tables() {
        let dir = tempfile::tempdir().unwrap();
        assert!(listening_inodes(dir.path(), 61000).is_empty());
    }

    #[test]
    fn test_socket_owners() {
        let dir = fake_proc();
        let inodes = listening_inodes(dir.path(), 61000);
        assert_eq!(socket_owners(dir.path(), &inodes).unwrap(), vec![100]);
        assert!(socket_owners(dir.path(), &HashSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_socket_line_rejects_garbage() {
        assert_eq!(parse_socket_line("garbage"), None);
        assert_eq!(
            parse_socket_line(
                "   0: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 77 1"
            ),
            Some((8080, TCP_LISTEN, 77))
        );
    }

    #[test]
    fn test_socket_inode() {
        assert_eq!(socket_inode(Path::new("socket:[123]")), Some(123));
        assert_eq!(socket_inode(Path::new("pipe:[123]")), None);
        assert_eq!(socket_inode(Path::new("/dev/null")), None);
    }

    #[tokio::test]
    async fn test_signal_by_name_with_no_match() {
        let dir = fake_proc();
        let killer = ProcfsKiller::with_root(dir.path().to_path_buf());
        assert_eq!(killer.signal_by_name("sing-box", true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_signal_by_name_kills_real_process() {
        let mut child = tokio::process::Command::new("/bin/sleep")
            .arg("60")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join(pid.to_string());
        fs::create_dir_all(&proc_dir).unwrap();
        fs::write(proc_dir.join("comm"), "fake-engine\n").unwrap();

        let killer = ProcfsKiller::with_root(dir.path().to_path_buf());
        assert_eq!(killer.signal_by_name("fake-engine", false).await.unwrap(), 1);

        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}
