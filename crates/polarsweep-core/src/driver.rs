//! Paced, one-line-at-a-time writes to the tool's command pipe.

use std::time::Duration;

use tracing::{debug, info, trace};

use crate::config::DriverConfig;
use crate::error::{Result, SweepError};
use crate::process::{ChildProcess, ProcessHandle};

/// Sends commands to a live child with a fixed pause after each write.
///
/// The tool's parser is single-threaded and drops input that arrives while
/// it is still handling the previous line, so the pause is not optional.
#[derive(Debug, Clone)]
pub struct PipeDriver {
    pacing: Duration,
    echo: bool,
    sent: u64,
}

impl PipeDriver {
    pub fn new(pacing: Duration, echo: bool) -> Self {
        Self {
            pacing,
            echo,
            sent: 0,
        }
    }

    pub fn from_config(config: &DriverConfig, echo: bool) -> Self {
        Self::new(config.pacing(), echo)
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Commands written successfully so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Write `command` to the child, then wait out the pacing interval.
    ///
    /// Fails with [`SweepError::DeadProcess`] without writing if the child has
    /// already exited.
    pub async fn issue<P: ChildProcess>(
        &mut self,
        handle: &mut ProcessHandle<P>,
        command: &str,
    ) -> Result<()> {
        match handle.poll_exit() {
            Ok(Some(exit)) => {
                tracing::error!(command = %command, exit_code = ?exit.code, "dead process can't accept a command");
                return Err(SweepError::DeadProcess {
                    command: command.to_string(),
                });
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "status poll failed before write"),
        }

        handle.write_line(command).await?;
        self.sent += 1;

        if self.echo {
            info!(event = "command.sent", seq = self.sent, command = %command);
        } else {
            trace!(event = "command.sent", seq = self.sent, command = %command);
        }

        tokio::time::sleep(self.pacing).await;
        Ok(())
    }
}
