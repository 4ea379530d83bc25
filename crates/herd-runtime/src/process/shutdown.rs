//! Interrupt-then-kill shutdown for a generation process.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

#[cfg(unix)]
use tokio::time::timeout;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Stop a child process: SIGINT, then SIGKILL once `grace` runs out.
///
/// llama.cpp treats SIGINT as "stop generating and exit". Always reaps the
/// child before returning.
///
/// # Platform behavior
/// - Unix: SIGINT via nix, then `.kill()`
/// - Elsewhere: `.kill()` straight away
pub async fn interrupt_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        interrupt_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn interrupt_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // already reaped
        return child.wait().await;
    };
    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGINT) {
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result;
    }

    child.kill().await?;
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;
    use tokio::time::sleep;

    #[tokio::test]
    #[cfg(unix)]
    async fn interrupt_stops_sleeping_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let result = interrupt_child(&mut child, Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn interrupt_escalates_when_signal_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' INT; sleep 30")
            .spawn()
            .unwrap();
        sleep(Duration::from_millis(100)).await;

        let status = interrupt_child(&mut child, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn interrupt_handles_already_exited() {
        let mut child = Command::new("true").spawn().unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(interrupt_child(&mut child, Duration::from_secs(1)).await.is_ok());
    }
}
