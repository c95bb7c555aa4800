//! Injectable source of process termination signals.

use async_trait::async_trait;

/// A stream of termination requests.
///
/// Production code uses [`TerminationSignals`]; tests inject an
/// `mpsc::Receiver<()>` and send synthetic signals instead of touching real
/// process signal handlers.
#[async_trait]
pub trait SignalSource: Send + 'static {
    /// Resolve when the next termination signal arrives. `None` means the
    /// source is exhausted and no further signals will be delivered.
    async fn recv(&mut self) -> Option<()>;
}

#[async_trait]
impl SignalSource for tokio::sync::mpsc::Receiver<()> {
    async fn recv(&mut self) -> Option<()> {
        tokio::sync::mpsc::Receiver::recv(self).await
    }
}

/// SIGINT + SIGTERM on Unix; ctrl-c elsewhere.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    /// Install the OS signal handlers.
    ///
    /// # Errors
    ///
    /// Fails if the process cannot register signal handlers, which is fatal
    /// for a service that relies on graceful termination.
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }
}

#[async_trait]
impl SignalSource for TerminationSignals {
    async fn recv(&mut self) -> Option<()> {
        #[cfg(unix)]
        {
            tokio::select! {
                sig = self.interrupt.recv() => sig,
                sig = self.terminate.recv() => sig,
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mpsc_receiver_delivers_and_closes() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(4);
        tx.send(()).await.unwrap();
        assert_eq!(SignalSource::recv(&mut rx).await, Some(()));

        drop(tx);
        assert_eq!(SignalSource::recv(&mut rx).await, None);
    }
}
