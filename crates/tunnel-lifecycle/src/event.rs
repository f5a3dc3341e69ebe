//! Events pushed by the tunnel backend.

use crate::state::TunnelState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event emitted by the backend from its own callback threads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BackendEvent {
    /// Backend moved to a new tunnel state
    NewState(TunnelState),
    /// Bandwidth allowance report
    Bandwidth(BandwidthEvent),
    /// Connectivity probe report
    Connection(ConnectionEvent),
}

impl BackendEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewState(_) => "new_state",
            Self::Bandwidth(_) => "bandwidth",
            Self::Connection(_) => "connection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthEvent {
    NoBandwidth,
    /// Remaining allowance in bytes
    RemainingBandwidth(i64),
}

impl fmt::Display for BandwidthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBandwidth => write!(f, "no bandwidth left"),
            Self::RemainingBandwidth(bytes) => {
                write!(f, "{:.2}MB remaining", *bytes as f64 / (1024.0 * 1024.0))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEvent {
    ConnectedIpv4,
    ConnectedIpv6,
    EntryGatewayDown,
    ExitGatewayDownIpv4,
    ExitGatewayDownIpv6,
    ExitGatewayRoutingErrorIpv4,
    ExitGatewayRoutingErrorIpv6,
}

impl ConnectionEvent {
    /// Whether the probe reports a degraded tunnel
    pub fn is_degraded(&self) -> bool {
        !matches!(self, Self::ConnectedIpv4 | Self::ConnectedIpv6)
    }
}
