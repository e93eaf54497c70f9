use super::error::{Error, Result};
use tokio::process::{Child, ChildStdout};
use tracing::debug;

/// Handle for a child process which ensures that any subprocesses are properly closed
/// on drop.
#[derive(Debug)]
pub struct ChildContainer {
    child: Child,
    stdout: ChildStdout,
}

impl ChildContainer {
    /// Takes ownership of a child process spawned with a piped stdout.
    pub fn new(mut child: Child) -> Result<Self> {
        let stdout = child.stdout.take().ok_or(Error::Stdout)?;

        Ok(Self { child, stdout })
    }

    pub(crate) fn stdout_mut(&mut self) -> &mut ChildStdout {
        &mut self.stdout
    }
}

impl Drop for ChildContainer {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Error killing child process: {:?}", e);
        }
    }
}
