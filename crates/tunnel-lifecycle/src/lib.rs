//! Tunnel Lifecycle - State Machine and Event Bridge
//!
//! Drives a packet tunnel through its lifecycle by reducing events from
//! the native backend into a single published [`TunnelState`], toggling
//! the OS provider's reasserting flag and scheduling failure
//! notifications along the way.
//!
//! # Architecture
//!
//! ```text
//!  backend threads        OS path callbacks
//!        │                       │
//!        ▼                       ▼
//!  ┌─────────────┐        ┌─────────────┐
//!  │ EventSender │        │ PathNotifier│  single slot, latest value
//!  └──────┬──────┘        └──────┬──────┘
//!         │ unbounded FIFO       │
//!         ▼                      ▼
//!  ┌─────────────┐        ┌─────────────┐
//!  │   Reducer   │        │ Path worker │──▶ DefaultPathObserver
//!  │  (thread)   │        └─────────────┘
//!  └──┬───────┬──┘
//!     │       │ set_reasserting / schedule notification
//!     │       ▼
//!     │   TunnelProvider (weak), FailureNotifier
//!     ▼
//!  Slot<TunnelState> ──▶ subscribers, wait_until_started
//! ```
//!
//! # Guarantees
//!
//! - Events from one producer are reduced in submission order
//! - Reasserting is never toggled before the first `Connected`
//! - Subscribers see the current state, then every later state
//! - `submit` after teardown is a no-op

mod bridge;
mod config;
mod event;
mod ingest;
mod notify;
mod path;
mod provider;
mod publish;
mod reducer;
mod state;

#[cfg(test)]
mod testing;

pub use bridge::{BridgeError, EventBridge};
pub use config::{BridgeConfig, ConfigError};
pub use event::{BackendEvent, BandwidthEvent, ConnectionEvent};
pub use ingest::EventSender;
pub use notify::{FailureNotifier, LogNotifier, Notification, NotifyError};
pub use path::{DefaultPath, DefaultPathObserver, PathBridge, PathNotifier, PathStatus};
pub use provider::{
    DnsSettings, Ipv4Settings, Ipv6Settings, MIN_IPV4_MTU, MIN_IPV6_MTU, ProviderError,
    ProviderHandle, TunnelNetworkSettings, TunnelProvider,
};
pub use publish::{FatalErrorFlag, Slot, StartError, Subscription, wait_until_started};
pub use reducer::StateReducer;
pub use state::{
    ActionAfterDisconnect, ConnectionData, ErrorStateReason, MixnetConnectionData, TunStatus,
    TunnelConnectionData, TunnelState, WireguardConnectionData, WireguardNode,
};
