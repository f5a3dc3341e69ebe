//! Tunnel state
//!
//! The value published to every observer of the tunnel. States are
//! immutable snapshots: the reducer replaces the current value, it never
//! edits one in place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Tunnel lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    /// No tunnel is up
    Disconnected,
    /// Connection attempt in progress
    Connecting {
        /// Known once the gateways have been selected
        connection_data: Option<ConnectionData>,
    },
    /// Tunnel is up and routing traffic
    Connected { connection_data: ConnectionData },
    /// Tunnel is being torn down
    Disconnecting { after_disconnect: ActionAfterDisconnect },
    /// Last attempt failed
    Error(ErrorStateReason),
}

impl TunnelState {
    /// States that end a wait for startup.
    ///
    /// `Connecting` and `Disconnecting` are transient and never satisfy it.
    pub fn is_startup_terminal(&self) -> bool {
        matches!(
            self,
            TunnelState::Connected { .. } | TunnelState::Disconnected | TunnelState::Error(_)
        )
    }

    /// Check if tunnel is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, TunnelState::Connected { .. })
    }

    /// Check if the tunnel is going down because of a failure
    pub fn is_disconnecting_with_error(&self) -> bool {
        matches!(
            self,
            TunnelState::Disconnecting {
                after_disconnect: ActionAfterDisconnect::Error(_)
            }
        )
    }

    /// Connection details, if the backend reported any
    pub fn connection_data(&self) -> Option<&ConnectionData> {
        match self {
            TunnelState::Connecting { connection_data } => connection_data.as_ref(),
            TunnelState::Connected { connection_data } => Some(connection_data),
            _ => None,
        }
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting { connection_data: None } => write!(f, "connecting"),
            Self::Connecting {
                connection_data: Some(data),
            } => write!(f, "connecting ({})", data.route()),
            Self::Connected { connection_data } => {
                write!(f, "connected ({})", connection_data.route())
            }
            Self::Disconnecting { after_disconnect } => {
                write!(f, "disconnecting ({})", after_disconnect)
            }
            Self::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// What the backend does once the tunnel is down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionAfterDisconnect {
    Nothing,
    Reconnect,
    Error(ErrorStateReason),
}

impl fmt::Display for ActionAfterDisconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "nothing"),
            Self::Reconnect => write!(f, "reconnect"),
            Self::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Why the tunnel ended up in the error state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStateReason {
    /// Issues related to firewall configuration.
    Firewall,
    /// Failure to configure routing.
    Routing,
    /// Failure to configure dns.
    Dns,
    /// Failure to configure tunnel device.
    TunDevice,
    /// Failure to configure packet tunnel provider.
    TunnelProvider,
    /// Failure to establish mixnet connection.
    EstablishMixnetConnection,
    /// Failure to establish wireguard connection.
    EstablishWireguardConnection,
    /// Tunnel went down at runtime.
    TunnelDown,
    /// Entry and exit resolved to the same gateway.
    SameEntryAndExitGateway,
    /// No entry gateway in the requested country.
    InvalidEntryGatewayCountry,
    /// No exit gateway in the requested country.
    InvalidExitGatewayCountry,
    /// Gateway refused to top up bandwidth.
    BadBandwidthIncrease,
    /// Tunnel file descriptor got duplicated.
    DuplicateTunFd,
    /// Program error that does not fit any other reason.
    Internal,
}

impl ErrorStateReason {
    /// Short user-facing description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Firewall => "the firewall could not be configured",
            Self::Routing => "routes could not be configured",
            Self::Dns => "DNS could not be configured",
            Self::TunDevice => "the tunnel device could not be configured",
            Self::TunnelProvider => "the system tunnel provider rejected the configuration",
            Self::EstablishMixnetConnection => "the mixnet connection could not be established",
            Self::EstablishWireguardConnection => {
                "the WireGuard connection could not be established"
            }
            Self::TunnelDown => "the tunnel went down",
            Self::SameEntryAndExitGateway => "entry and exit gateway are the same",
            Self::InvalidEntryGatewayCountry => "no entry gateway is available in that country",
            Self::InvalidExitGatewayCountry => "no exit gateway is available in that country",
            Self::BadBandwidthIncrease => "the gateway refused a bandwidth top-up",
            Self::DuplicateTunFd => "the tunnel file descriptor was duplicated",
            Self::Internal => "an internal error occurred",
        }
    }
}

impl fmt::Display for ErrorStateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Route details for an established (or establishing) tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    /// Entry gateway identity
    pub entry_gateway: String,
    /// Exit gateway identity
    pub exit_gateway: String,
    /// Unix time (seconds) at which the tunnel came up
    #[serde(default)]
    pub connected_at: Option<u64>,
    /// Tunnel type specific details
    pub tunnel: TunnelConnectionData,
}

impl ConnectionData {
    /// `entry -> exit` label for logs
    pub fn route(&self) -> String {
        format!("{} -> {}", self.entry_gateway, self.exit_gateway)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelConnectionData {
    Mixnet(MixnetConnectionData),
    Wireguard(WireguardConnectionData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixnetConnectionData {
    /// Our own mixnet address
    pub nym_address: String,
    /// Address of the exit IP packet router
    pub exit_ipr: String,
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireguardConnectionData {
    pub entry: WireguardNode,
    pub exit: WireguardNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireguardNode {
    pub endpoint: SocketAddr,
    pub public_key: String,
    pub private_ipv4: Ipv4Addr,
}

/// Coarse tunnel status for frontends that predate [`TunnelState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunStatus {
    EstablishingConnection,
    Up,
    Disconnecting,
    Down,
}

impl From<&TunnelState> for TunStatus {
    fn from(state: &TunnelState) -> Self {
        match state {
            TunnelState::Connecting { .. } => Self::EstablishingConnection,
            TunnelState::Connected { .. } => Self::Up,
            TunnelState::Disconnecting { .. } => Self::Disconnecting,
            TunnelState::Disconnected | TunnelState::Error(_) => Self::Down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::connection_data;

    #[test]
    fn test_startup_terminal_states() {
        assert!(TunnelState::Disconnected.is_startup_terminal());
        assert!(TunnelState::Error(ErrorStateReason::Dns).is_startup_terminal());
        assert!(
            TunnelState::Connected {
                connection_data: connection_data("entry", "exit"),
            }
            .is_startup_terminal()
        );

        assert!(!TunnelState::Connecting { connection_data: None }.is_startup_terminal());
        assert!(
            !TunnelState::Disconnecting {
                after_disconnect: ActionAfterDisconnect::Reconnect,
            }
            .is_startup_terminal()
        );
    }

    #[test]
    fn test_disconnecting_with_error() {
        let failing = TunnelState::Disconnecting {
            after_disconnect: ActionAfterDisconnect::Error(ErrorStateReason::Routing),
        };
        let plain = TunnelState::Disconnecting {
            after_disconnect: ActionAfterDisconnect::Nothing,
        };

        assert!(failing.is_disconnecting_with_error());
        assert!(!plain.is_disconnecting_with_error());
        assert!(!TunnelState::Error(ErrorStateReason::Routing).is_disconnecting_with_error());
    }

    #[test]
    fn test_connection_data_accessor() {
        let data = connection_data("entry", "exit");

        assert_eq!(TunnelState::Connecting { connection_data: None }.connection_data(), None);
        assert_eq!(
            TunnelState::Connected {
                connection_data: data.clone()
            }
            .connection_data(),
            Some(&data)
        );
        assert_eq!(TunnelState::Disconnected.connection_data(), None);
    }

    #[test]
    fn test_tun_status_mapping() {
        assert_eq!(
            TunStatus::from(&TunnelState::Connecting { connection_data: None }),
            TunStatus::EstablishingConnection
        );
        assert_eq!(TunStatus::from(&TunnelState::Disconnected), TunStatus::Down);
        assert_eq!(
            TunStatus::from(&TunnelState::Error(ErrorStateReason::TunnelDown)),
            TunStatus::Down
        );
    }

    #[test]
    fn test_display() {
        let state = TunnelState::Connected {
            connection_data: connection_data("gw-a", "gw-b"),
        };
        assert_eq!(state.to_string(), "connected (gw-a -> gw-b)");
        assert_eq!(
            TunnelState::Error(ErrorStateReason::Dns).to_string(),
            "error: DNS could not be configured"
        );
    }

    #[test]
    fn test_state_json_shape() {
        let state = TunnelState::Disconnecting {
            after_disconnect: ActionAfterDisconnect::Error(ErrorStateReason::Firewall),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"disconnecting":{"after_disconnect":{"error":"firewall"}}}"#);

        let parsed: TunnelState = serde_json::from_str(r#""disconnected""#).unwrap();
        assert_eq!(parsed, TunnelState::Disconnected);
    }
}
