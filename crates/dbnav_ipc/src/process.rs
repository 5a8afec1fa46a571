use crate::TransportError;
use dbnav_core::ServiceConfig;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// A metadata service running as a child process, spoken to over its stdio.
///
/// The process is killed when this handle is dropped.
pub struct ServiceProcess {
    program: String,
    child: Child,
}

impl ServiceProcess {
    /// Starts the service and hands back its request and notification pipes.
    pub fn spawn(config: &ServiceConfig) -> Result<(Self, ChildStdin, ChildStdout), TransportError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(config.env.iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(|e| {
            TransportError::Process(format!(
                "Failed to start metadata service '{}': {}",
                config.command, e
            ))
        })?;

        log::info!(
            "Started metadata service '{}' (pid={})",
            config.command,
            child.id()
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let process = Self {
            program: config.command.clone(),
            child,
        };

        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok((process, stdin, stdout)),
            _ => Err(TransportError::Process(format!(
                "Metadata service '{}' has no stdio pipes",
                process.program
            ))),
        }
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for ServiceProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            log::info!("Stopping metadata service '{}'", self.program);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
