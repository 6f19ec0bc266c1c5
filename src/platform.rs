//! OS-specific helpers: platform identifiers, process liveness, detached
//! spawning and executable detection.

use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[cfg(target_os = "windows")]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Returns the release asset identifier for the running platform
/// (`"linux-amd64"`, `"windows-amd64"`, `"darwin-arm64"`, ...).
///
/// Used for substring matching against asset names.
pub fn platform_identifier() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    };
    format!("{os}-{arch}")
}

/// Append the platform executable suffix to a bare binary name.
pub fn executable_name(stem: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{stem}.exe")
    } else {
        stem.to_owned()
    }
}

/// Returns `true` when `path` is a regular file this platform would run
/// directly: `.exe` on Windows, any execute bit on Unix.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
    }
}

/// Mark a file executable (no-op off Unix).
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
#[cfg_attr(not(unix), allow(unused_variables))]
pub fn set_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Probe whether a process with the given PID is still alive.
///
/// Any probe failure is reported as "not alive": the caller treats a
/// missing process and an unanswerable probe the same way.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs error checking only; nothing is delivered.
        let ret = unsafe { libc::kill(raw, 0) };
        if ret == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                stdout.contains(&format!("\"{pid}\""))
            }
            _ => false,
        }
    }
}

/// Spawn `program` so that it outlives the current process.
///
/// Standard streams are detached. On Unix the child gets its own process
/// group so terminal signals aimed at the parent do not reach it; on
/// Windows it is created without a console and in a new process group.
///
/// # Errors
///
/// Returns the spawn error unchanged.
pub fn spawn_detached<I, S>(program: &Path, args: I) -> io::Result<Child>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    cmd.spawn()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn platform_identifier_has_os_and_arch() {
        let id = platform_identifier();
        let (os, arch) = id.split_once('-').unwrap();
        assert!(!os.is_empty());
        assert!(!arch.is_empty());
        assert_ne!(os, "macos");
    }

    #[test]
    fn executable_name_suffix() {
        let name = executable_name("hub-updater");
        if cfg!(target_os = "windows") {
            assert_eq!(name, "hub-updater.exe");
        } else {
            assert_eq!(name, "hub-updater");
        }
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!is_process_alive(0));
    }

    #[cfg(unix)]
    #[test]
    fn exited_child_is_not_alive() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("reap");
        assert!(!is_process_alive(pid));
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_detection() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("readme.txt");
        let bin = dir.path().join("app");
        std::fs::write(&plain, "text").unwrap();
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();
        set_executable(&bin).unwrap();

        assert!(!is_executable(&plain));
        assert!(is_executable(&bin));
        assert!(!is_executable(dir.path()));
        assert!(!is_executable(&dir.path().join("missing")));
    }
}
