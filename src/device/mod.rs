mod command;
mod ssh;

pub use command::*;
pub use ssh::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RouterCredential;

/// Output of a command the router accepted.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Remote command channel to subscriber-facing routers.
///
/// Implementations open a fresh connection per call, issue exactly one
/// command and close it. They do not retry. Connection and authentication
/// problems are `DeviceUnreachable`; a command the router rejected is
/// `CommandFailed`.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    async fn execute(
        &self,
        router: &RouterCredential,
        command: &RouterCommand,
    ) -> Result<CommandOutput>;
}
