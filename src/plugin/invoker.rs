//! One external plugin-host call.
//!
//! The host is launched as `<host> <plugin> <input> <output> <block size>`
//! from the bundle's directory. It reports nothing while it runs; success is
//! exit code 0 plus an output file that did not exist before the call.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use super::registry::PluginHandle;

/// Everything needed to run one plugin over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub handle: PluginHandle,
    pub input: PathBuf,
    pub output: PathBuf,
    pub block_size: u32,
}

impl Invocation {
    /// Host arguments, in order.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            self.handle.plugin.clone().into_os_string(),
            self.input.clone().into_os_string(),
            self.output.clone().into_os_string(),
            OsString::from(self.block_size.to_string()),
        ]
    }

    /// Printable command line for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.handle.host.display().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// What the host process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HostOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stderr, else stdout, else a code-based message.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs the plugin host. Object-safe and `Send + Sync` so invocations can be
/// moved onto a worker thread; tests substitute in-process fakes.
pub trait PluginHost: Send + Sync {
    fn run(&self, invocation: &Invocation) -> io::Result<HostOutput>;
}

impl<H: PluginHost + ?Sized> PluginHost for Box<H> {
    fn run(&self, invocation: &Invocation) -> io::Result<HostOutput> {
        (**self).run(invocation)
    }
}

impl<H: PluginHost + ?Sized> PluginHost for std::sync::Arc<H> {
    fn run(&self, invocation: &Invocation) -> io::Result<HostOutput> {
        (**self).run(invocation)
    }
}

/// Production host: a child process per invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHost;

/// Relative paths would be reinterpreted once the working directory changes.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl PluginHost for ProcessHost {
    fn run(&self, invocation: &Invocation) -> io::Result<HostOutput> {
        let mut command = Command::new(absolute(&invocation.handle.host));
        command
            .arg(absolute(&invocation.handle.plugin))
            .arg(absolute(&invocation.input))
            .arg(absolute(&invocation.output))
            .arg(invocation.block_size.to_string());
        if let Some(dir) = invocation.handle.working_dir() {
            command.current_dir(absolute(dir));
        }
        let output = command.output()?;
        Ok(HostOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("failed to launch plugin host {host}: {source}")]
    Spawn {
        host: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{diagnostic}")]
    Failed {
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("plugin host exited cleanly but did not write {path}")]
    MissingOutput { path: PathBuf },

    #[error("could not clear stale output {path}: {source}")]
    StaleOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("plugin host worker stopped without reporting a result")]
    WorkerLost,
}

/// Invokes plugins through a [`PluginHost`].
pub struct PluginInvoker<H: PluginHost> {
    host: H,
    block_size: u32,
}

impl<H: PluginHost> PluginInvoker<H> {
    pub fn new(host: H, block_size: u32) -> Self {
        Self { host, block_size }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn invocation(&self, handle: &PluginHandle, input: &Path, output: &Path) -> Invocation {
        Invocation {
            handle: handle.clone(),
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            block_size: self.block_size,
        }
    }

    /// Runs `handle` over `input`, writing `output`. Blocks until the host exits.
    pub fn invoke(
        &self,
        handle: &PluginHandle,
        input: &Path,
        output: &Path,
    ) -> Result<(), InvocationError> {
        self.run(&self.invocation(handle, input, output))
    }

    pub fn run(&self, invocation: &Invocation) -> Result<(), InvocationError> {
        match std::fs::remove_file(&invocation.output) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(InvocationError::StaleOutput {
                    path: invocation.output.clone(),
                    source,
                });
            }
        }

        debug!(command = %invocation.command_line(), "invoking plugin host");
        let result = self
            .host
            .run(invocation)
            .map_err(|source| InvocationError::Spawn {
                host: invocation.handle.host.clone(),
                source,
            })?;

        if !result.success() {
            return Err(InvocationError::Failed {
                code: result.status,
                diagnostic: result.diagnostic(),
            });
        }
        if !invocation.output.exists() {
            return Err(InvocationError::MissingOutput {
                path: invocation.output.clone(),
            });
        }
        Ok(())
    }
}
