use std::ffi::OsStr;
use std::io::{Error, ErrorKind, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

/// How long to keep draining pipes once the child is gone. Grandchildren that
/// inherited the pipes can otherwise keep them open forever.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct Execution {
    /// `None` when the deadline expired and the child was killed.
    pub status: Option<ExitStatus>,
    /// stdout and stderr interleaved in arrival order, lossily decoded.
    pub output: String,
    pub elapsed: Duration,
}

impl Execution {
    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }
}

/// Runs `program args..` in `cwd` as the leader of a new process group. Once
/// `limit` has passed the whole group is killed, so anything the program
/// started goes with it.
pub fn run_with_timeout<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    cwd: &Path,
    limit: Duration,
) -> Result<Execution> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let (status, output, elapsed) = runtime.block_on(collect(cmd, limit))?;
    debug!("{} exited with {:?} after {:?}", program, status, elapsed);

    Ok(Execution {
        status,
        output: String::from_utf8_lossy(&output).into_owned(),
        elapsed,
    })
}

async fn collect(mut cmd: Command, limit: Duration) -> Result<(Option<ExitStatus>, Vec<u8>, Duration)> {
    let start = Instant::now();
    let mut child = cmd.spawn()?;
    let group = child.id().map(|id| Pid::from_raw(id as i32));
    let merged = Arc::new(Mutex::new(Vec::new()));

    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, Arc::clone(&merged)));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, Arc::clone(&merged)));
    }

    let status = match timeout(limit, child.wait()).await {
        Ok(status) => Some(status?),
        Err(_) => {
            kill_group(group);
            // The child may have exited on its own in the meantime.
            if let Err(e) = child.start_kill() {
                debug!("Failed to kill timed out child: {}", e);
            }
            child.wait().await?;
            None
        }
    };
    let elapsed = start.elapsed();
    // Background jobs left behind by a script that exited on its own.
    kill_group(group);

    for pump in pumps {
        match timeout(DRAIN_GRACE, pump).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!("Failed to read child output: {}", e),
            Ok(Err(e)) => debug!("Output reader task failed: {}", e),
            Err(_) => debug!("Gave up draining child output after {:?}", DRAIN_GRACE),
        }
    }

    let output = merged
        .lock()
        .map_err(|_| Error::new(ErrorKind::Other, "child output buffer poisoned"))?
        .clone();
    Ok((status, output, elapsed))
}

fn kill_group(group: Option<Pid>) {
    let Some(group) = group else {
        return;
    };
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!("Failed to kill process group {}: {}", group, e),
    }
}

fn pump<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            sink.lock()
                .map_err(|_| Error::new(ErrorKind::Other, "child output buffer poisoned"))?
                .extend_from_slice(&buf[..n]);
        }
    })
}
