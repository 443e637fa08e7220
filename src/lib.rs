// Champ select automation core for the League client
//
// The monitor polls the local client API and publishes edge-triggered events;
// the automation layer turns those into ready-check accepts, smart-timed
// bans/picks and popup suppression.

pub mod automation;
pub mod config;
pub mod error;
pub mod lcu;
pub mod logging;
pub mod popup;
pub mod scheduler;
pub mod selection;

#[cfg(test)]
mod tests;

pub use automation::ChampSelectAutomation;
pub use config::{
  AutomationConfig, ChampionInfo, DelayBounds, MonitorSettings, PositionPreferences, SharedConfig, SIMPLE_DELAY_BOUNDS,
};
pub use error::{ConfigError, LcuError, LcuResult};
pub use lcu::{
  ClientApi, ClientConnector, ClientHandle, ConnectionState, GamePhase, LcuConnection, LcuCredentials,
  LocalClientMonitor, LockfileConnector, MonitorEvent, Position, SessionIdentity, SessionUpdate,
};
pub use logging::{init_logging, LogBuffer};
pub use popup::{PopupCategory, PopupSuppressionManager};
pub use scheduler::{ActionScheduler, ChampSelectActions, PendingAction, PendingState};
pub use selection::{select_champion, ChampionChoice, ChoiceSource, ExclusionSets, SelectionPolicy};
