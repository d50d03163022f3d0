use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;

use super::{CommandOutput, DeviceChannel, RouterCommand};
use crate::error::{AppError, Result};
use crate::models::RouterCredential;

/// RouterOS-over-SSH channel with password authentication.
#[derive(Debug, Clone)]
pub struct SshChannel {
    /// Applies to connect, handshake and every read/write
    timeout: Duration,
}

impl SshChannel {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DeviceChannel for SshChannel {
    async fn execute(
        &self,
        router: &RouterCredential,
        command: &RouterCommand,
    ) -> Result<CommandOutput> {
        let router = router.clone();
        let command = command.clone();
        let timeout = self.timeout;

        let task = tokio::task::spawn_blocking(move || run_command(&router, &command, timeout));

        // The socket timeouts bound the blocking task; this bounds the caller
        // even if the router stalls between reads.
        let deadline = timeout.saturating_mul(3);
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AppError::Internal(format!("SSH task failed: {}", e))),
            Err(_) => Err(AppError::DeviceUnreachable(format!(
                "Router did not respond within {:?}",
                deadline
            ))),
        }
    }
}

fn unreachable(router: &RouterCredential, e: impl std::fmt::Display) -> AppError {
    AppError::DeviceUnreachable(format!("{}:{}: {}", router.ip_address, router.port, e))
}

fn run_command(
    router: &RouterCredential,
    command: &RouterCommand,
    timeout: Duration,
) -> Result<CommandOutput> {
    let addr = (router.ip_address.as_str(), router.port)
        .to_socket_addrs()
        .map_err(|e| unreachable(router, e))?
        .next()
        .ok_or_else(|| unreachable(router, "address did not resolve"))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| unreachable(router, e))?;
    tcp.set_read_timeout(Some(timeout))
        .and_then(|_| tcp.set_write_timeout(Some(timeout)))
        .map_err(|e| unreachable(router, e))?;

    let mut session = Session::new().map_err(|e| unreachable(router, e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    session.handshake().map_err(|e| unreachable(router, e))?;
    session
        .userauth_password(&router.username, &router.router_secret)
        .map_err(|e| unreachable(router, e))?;
    if !session.authenticated() {
        return Err(unreachable(router, "authentication rejected"));
    }

    let script = command.render();
    tracing::debug!(router_id = router.id, command = %script, "Executing router command");

    let mut channel = session
        .channel_session()
        .map_err(|e| AppError::CommandFailed(format!("SSH channel error: {}", e)))?;
    channel
        .exec(&script)
        .map_err(|e| AppError::CommandFailed(format!("SSH exec error: {}", e)))?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| AppError::CommandFailed(format!("Reading command output: {}", e)))?;
    let mut stderr = String::new();
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|e| AppError::CommandFailed(format!("Reading command errors: {}", e)))?;

    // Closing is best-effort; the command already ran
    let _ = channel.wait_close();
    let _ = session.disconnect(None, "done", None);

    // RouterOS reports script errors on stdout as well
    let error_output = if !stderr.trim().is_empty() {
        Some(stderr.trim().to_string())
    } else {
        stdout
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("failure:") || line.starts_with("syntax error"))
            .map(String::from)
    };

    match error_output {
        Some(err) if command.tolerates(&err) => {
            tracing::debug!(router_id = router.id, error = %err, "Router reported a no-op");
            Ok(CommandOutput { stdout })
        }
        Some(err) => Err(AppError::CommandFailed(err)),
        None => Ok(CommandOutput { stdout }),
    }
}
