//! Host-side collaborators for the agent: a provider that only logs, and
//! the stdin reader feeding backend events into the bridge.

use std::io::BufRead;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use tunnel_lifecycle::{
    BackendEvent, DefaultPathObserver, EventSender, FatalErrorFlag, ProviderError,
    TunnelNetworkSettings, TunnelProvider,
};

/// Provider without an OS behind it
#[derive(Default)]
pub struct LoggingProvider {
    path_observer: Mutex<Option<Arc<dyn DefaultPathObserver>>>,
}

impl LoggingProvider {
    /// Whether the bridge registered for path changes
    pub fn observes_path(&self) -> bool {
        self.path_observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl TunnelProvider for LoggingProvider {
    fn set_reasserting(&self, reasserting: bool) {
        info!("Provider: reasserting = {}", reasserting);
    }

    fn set_tunnel_network_settings(
        &self,
        settings: &TunnelNetworkSettings,
    ) -> Result<(), ProviderError> {
        info!(
            "Provider: network settings for {} (mtu {})",
            settings.tunnel_remote_address, settings.mtu
        );
        Ok(())
    }

    fn set_default_path_observer(
        &self,
        observer: Option<Arc<dyn DefaultPathObserver>>,
    ) -> Result<(), ProviderError> {
        debug!(
            "Provider: default path observer {}",
            if observer.is_some() { "set" } else { "cleared" }
        );
        *self
            .path_observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = observer;
        Ok(())
    }
}

/// One line of agent input
#[derive(Debug, PartialEq)]
enum Input {
    Event(BackendEvent),
    /// Simulate the backend dying before reporting a state
    Fatal,
    Skip,
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Input::Skip;
    }
    if line == "fatal" {
        return Input::Fatal;
    }
    match serde_json::from_str(line) {
        Ok(event) => Input::Event(event),
        Err(e) => {
            warn!("Skipping malformed event {:?}: {}", line, e);
            Input::Skip
        }
    }
}

/// Read JSON-line events from stdin on a dedicated thread.
///
/// `eof` fires once stdin is exhausted.
pub fn spawn_stdin_reader(
    events: EventSender,
    fatal: FatalErrorFlag,
    eof: oneshot::Sender<()>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-events".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Input::Event(event) => events.submit(event),
                    Input::Fatal => fatal.raise(),
                    Input::Skip => {}
                }
            }
            debug!("Reached end of input");
            let _ = eof.send(());
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_lifecycle::TunnelState;

    #[test]
    fn test_parse_event_line() {
        assert_eq!(
            parse_line(r#"{"new_state":"disconnected"}"#),
            Input::Event(BackendEvent::NewState(TunnelState::Disconnected))
        );
    }

    #[test]
    fn test_parse_control_lines() {
        assert_eq!(parse_line("fatal"), Input::Fatal);
        assert_eq!(parse_line("   "), Input::Skip);
        assert_eq!(parse_line("# comment"), Input::Skip);
        assert_eq!(parse_line("{not json"), Input::Skip);
    }

    #[test]
    fn test_logging_provider_tracks_observer() {
        let provider = LoggingProvider::default();
        assert!(!provider.observes_path());

        provider.set_default_path_observer(None).unwrap();
        assert!(!provider.observes_path());
    }
}
