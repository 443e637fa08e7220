// LCU module - talks to the League client and turns polling into events

mod connection;
mod events;
mod identity;
mod monitor;
mod types;

pub use connection::{ClientApi, ClientConnector, ClientHandle, LcuConnection, LcuCredentials, LockfileConnector};
pub use events::{EventBus, MonitorEvent, SessionUpdate};
pub use identity::{IdentityChange, IdentitySource, IdentityTracker, SessionIdentity};
pub use monitor::LocalClientMonitor;
pub use types::{
  ActionKind, ChampSelectSession, ChatDetails, ConnectionState, GamePhase, Position, SessionAction,
  SessionTimer, TeamMember,
};
