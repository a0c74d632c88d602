//! PID file, daemonization, and service-unit installation (§10.1's "long-running service
//! wrapper"). Kept deliberately thin: the authenticator itself has no interactive surface
//! beyond [`crate::dispatcher`], so this module only does what a process manager needs.

use std::path::Path;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, Result};

/// Writes the running process's PID to `path`, creating parent directories as needed.
///
/// # Errors
/// Returns [`DaemonError::Io`] if the file cannot be created or written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pid = std::process::id();
    std::fs::write(path, pid.to_string())?;
    tracing::debug!(pid, ?path, "wrote PID file");
    Ok(())
}

/// Removes the PID file, ignoring a missing file.
pub fn remove_pid_file(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Returns the PID of an already-running instance, if `pid_file` names a live process.
/// A stale PID file (process no longer exists) is removed and `None` is returned.
#[must_use]
pub fn already_running(pid_file: &Path) -> Option<u32> {
    if !pid_file.exists() {
        return None;
    }
    let pid: u32 = std::fs::read_to_string(pid_file).ok()?.trim().parse().ok()?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), Signal::SIGCONT) {
            Ok(()) => Some(pid),
            Err(nix::errno::Errno::ESRCH) => {
                remove_pid_file(pid_file);
                None
            }
            Err(_) => Some(pid),
        }
    }

    #[cfg(windows)]
    {
        Some(pid)
    }
}

/// Sends a graceful-stop signal to the process named by `pid_file`.
///
/// # Errors
/// Returns [`DaemonError::NotRunning`] if no live process is recorded, or
/// [`DaemonError::Platform`] if the signal cannot be delivered.
#[cfg(unix)]
pub fn send_stop_signal(pid_file: &Path) -> Result<u32> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = already_running(pid_file).ok_or(DaemonError::NotRunning)?;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| DaemonError::platform(format!("failed to signal PID {pid}: {e}")))?;
    Ok(pid)
}

/// Stopping by PID is not supported on Windows; the Service Control Manager owns the lifecycle
/// of a registered service instead.
#[cfg(windows)]
pub fn send_stop_signal(_pid_file: &Path) -> Result<u32> {
    Err(DaemonError::platform(
        "stop is not supported on Windows; use the Service Control Manager",
    ))
}

/// Daemonizes the process (Unix only): forks, detaches from the controlling terminal, and
/// redirects standard streams.
///
/// # Errors
/// Returns [`DaemonError::Platform`] if the fork fails.
#[cfg(unix)]
pub fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    Daemonize::new()
        .start()
        .map_err(|e| DaemonError::platform(format!("failed to daemonize: {e}")))
}

/// Daemonization is a no-op on Windows; services are installed instead (see
/// [`install_service`]).
#[cfg(windows)]
pub fn daemonize() -> Result<()> {
    Ok(())
}

/// Installs a launchd job for `config` (macOS).
///
/// # Errors
/// Returns [`DaemonError::Io`] if the plist cannot be written.
#[cfg(target_os = "macos")]
pub fn install_service(config: &DaemonConfig) -> Result<()> {
    let log = config.general.log_file.display();
    let plist = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>net.dot8021x.authd</string>
    <key>ProgramArguments</key>
    <array>
        <string>/usr/local/bin/dot8021x-authd</string>
        <string>run</string>
        <string>--foreground</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{log}</string>
    <key>StandardErrorPath</key>
    <string>{log}</string>
</dict>
</plist>"#
    );
    let path = Path::new("/Library/LaunchDaemons/net.dot8021x.authd.plist");
    std::fs::write(path, plist)?;
    tracing::info!(?path, "installed launchd service");
    Ok(())
}

/// Installs a systemd unit for `config` (Linux).
///
/// # Errors
/// Returns [`DaemonError::Io`] if the unit file cannot be written.
#[cfg(target_os = "linux")]
pub fn install_service(config: &DaemonConfig) -> Result<()> {
    let log = config.general.log_file.display();
    let unit = format!(
        r#"[Unit]
Description=802.1X wired port-access-control authenticator
After=network.target

[Service]
Type=simple
ExecStart=/usr/local/bin/dot8021x-authd run --foreground
Restart=always
RestartSec=10
StandardOutput=append:{log}
StandardError=append:{log}

[Install]
WantedBy=multi-user.target
"#
    );
    let path = Path::new("/etc/systemd/system/dot8021x-authd.service");
    std::fs::write(path, unit)?;
    tracing::info!(?path, "installed systemd unit");
    Ok(())
}

/// Installs a Windows service for `config`.
///
/// # Errors
/// Always returns [`DaemonError::Platform`]: Windows service registration requires the Service
/// Control Manager, which this authenticator does not yet drive.
#[cfg(target_os = "windows")]
pub fn install_service(_config: &DaemonConfig) -> Result<()> {
    Err(DaemonError::platform(
        "Windows service installation is not yet implemented",
    ))
}

/// Service installation is unsupported on platforms other than Linux, macOS, and Windows.
///
/// # Errors
/// Always returns [`DaemonError::Platform`].
#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
pub fn install_service(_config: &DaemonConfig) -> Result<()> {
    Err(DaemonError::platform(
        "service installation is not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dot8021x-authd.pid");
        write_pid_file(&path).unwrap();
        let written: u32 = std::fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(written, std::process::id());
        remove_pid_file(&path);
        assert!(!path.exists());
    }

    #[test]
    fn missing_pid_file_means_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.pid");
        assert_eq!(already_running(&path), None);
    }
}
