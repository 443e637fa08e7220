// Local client monitor: owns the polling loop and turns probes into events

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{ClientApi, ClientConnector, ClientHandle};
use super::events::{EventBus, MonitorEvent, SessionUpdate};
use super::identity::{IdentityChange, IdentityTracker};
use super::types::{ChampSelectSession, ConnectionState, GamePhase, Position};
use crate::config::MonitorSettings;
use crate::error::LcuError;
use crate::scheduler::ChampSelectActions;

struct CachedSession {
  session: Arc<ChampSelectSession>,
  taken_at: Instant,
}

struct MonitorState {
  connection: ConnectionState,
  phase: GamePhase,
  ready_check: bool,
  identity: IdentityTracker,
  // hash of everything except the timer
  fingerprint: Option<String>,
  last_session: Option<CachedSession>,
  consecutive_failures: u32,
  last_reconnect: Option<Instant>,
}

impl MonitorState {
  fn new() -> Self {
    Self {
      connection: ConnectionState::Disconnected,
      phase: GamePhase::None,
      ready_check: false,
      identity: IdentityTracker::new(),
      fingerprint: None,
      last_session: None,
      consecutive_failures: 0,
      last_reconnect: None,
    }
  }

  fn has_session(&self) -> bool {
    self.last_session.is_some() || self.identity.current().is_some()
  }
}

struct MonitorInner {
  id: String,
  client: ClientHandle,
  connector: Option<Arc<dyn ClientConnector>>,
  settings: MonitorSettings,
  bus: EventBus,
  state: Mutex<MonitorState>,
  action_pool: Semaphore,
}

struct PollingTask {
  token: CancellationToken,
  handle: JoinHandle<()>,
}

/// Polls the client and publishes edge-triggered [`MonitorEvent`]s.
///
/// Every network failure is absorbed here: calls report `false`, empty sets or
/// `None`, and only sustained probe failures surface as
/// `ConnectionChanged(false)`.
pub struct LocalClientMonitor {
  inner: Arc<MonitorInner>,
  polling: Mutex<Option<PollingTask>>,
}

impl LocalClientMonitor {
  /// Monitor a fixed client connection.
  pub fn new(api: Arc<dyn ClientApi>, settings: MonitorSettings) -> Self {
    Self::build(ClientHandle::new(api), None, settings)
  }

  /// Monitor whatever client `connector` finds, looking it up again whenever
  /// the current one stops answering.
  pub fn with_connector(connector: Arc<dyn ClientConnector>, settings: MonitorSettings) -> Self {
    Self::build(ClientHandle::empty(), Some(connector), settings)
  }

  fn build(client: ClientHandle, connector: Option<Arc<dyn ClientConnector>>, settings: MonitorSettings) -> Self {
    let id = Uuid::new_v4().simple().to_string();
    let inner = MonitorInner {
      id: id[..8].to_string(),
      client,
      connector,
      action_pool: Semaphore::new(settings.action_concurrency()),
      settings,
      bus: EventBus::new(),
      state: Mutex::new(MonitorState::new()),
    };
    Self {
      inner: Arc::new(inner),
      polling: Mutex::new(None),
    }
  }

  pub fn instance_id(&self) -> &str {
    &self.inner.id
  }

  pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
    self.inner.bus.subscribe()
  }

  pub fn connection_state(&self) -> ConnectionState {
    self.inner.lock_state().connection
  }

  pub fn current_phase(&self) -> GamePhase {
    self.inner.lock_state().phase
  }

  /// `true` while the last probe saw a ready check waiting for an answer.
  pub fn ready_check_pending(&self) -> bool {
    let state = self.inner.lock_state();
    state.phase == GamePhase::ReadyCheck && state.ready_check
  }

  /// The connection in use; follows reconnects.
  pub fn client(&self) -> ClientHandle {
    self.inner.client.clone()
  }

  /// Look the client up again (with a connector), then probe it once. On
  /// failure nothing changes.
  pub async fn connect(&self) -> bool {
    if self.inner.connector.is_some() {
      self.inner.reconnect().await;
    }

    let previous = {
      let mut state = self.inner.lock_state();
      let previous = state.connection;
      if !previous.is_connected() {
        state.connection = ConnectionState::Connecting;
      }
      previous
    };

    match self.inner.client.gameflow_phase().await {
      Ok(phase) => {
        info!("[LCU Monitor][{}] Connected, phase {}", self.inner.id, phase);
        self.inner.record_probe_success();
        self.inner.apply_phase(phase);
        true
      }
      Err(e) => {
        self.inner.lock_state().connection = previous;
        warn!("[LCU Monitor][{}] Connect failed: {}", self.inner.id, e);
        false
      }
    }
  }

  /// Spawn the polling task. Must be called inside a tokio runtime.
  pub fn start_monitoring(&self) {
    let mut polling = self.lock_polling();
    if polling.is_some() {
      debug!("[LCU Monitor][{}] Already monitoring", self.inner.id);
      return;
    }

    let token = CancellationToken::new();
    let inner = self.inner.clone();
    let handle = tokio::spawn(inner.run(token.clone()));
    *polling = Some(PollingTask { token, handle });
  }

  pub fn stop_monitoring(&self) {
    if let Some(task) = self.lock_polling().take() {
      task.token.cancel();
      info!("[LCU Monitor][{}] Monitoring stopped", self.inner.id);
    }
  }

  pub fn is_monitoring(&self) -> bool {
    self.lock_polling().is_some()
  }

  /// Stop polling and wait for the polling task to exit.
  pub async fn shutdown(&self) {
    let task = self.lock_polling().take();
    if let Some(task) = task {
      task.token.cancel();
      if let Err(e) = task.handle.await {
        warn!("[LCU Monitor][{}] Polling task ended abnormally: {}", self.inner.id, e);
      }
    }
    let mut state = self.inner.lock_state();
    state.connection = ConnectionState::Disconnected;
    state.last_session = None;
    info!("[LCU Monitor][{}] Shut down", self.inner.id);
  }

  /// Run one poll cycle without the background task.
  pub async fn poll_once(&self) {
    self.inner.tick().await;
  }

  pub async fn accept_ready_check(&self) -> bool {
    let Ok(_permit) = self.inner.action_pool.acquire().await else {
      return false;
    };
    match self.inner.client.accept_ready_check().await {
      Ok(()) => {
        info!("[LCU Monitor] Ready check accepted");
        true
      }
      Err(e) => {
        warn!("[LCU Monitor] Failed to accept ready check: {}", e);
        false
      }
    }
  }

  pub async fn hover_champion(&self, champion_id: i64, action_id: i64) -> bool {
    self.patch_action("Hover", champion_id, action_id, false).await
  }

  pub async fn ban_champion(&self, champion_id: i64, action_id: i64) -> bool {
    self.patch_action("Ban", champion_id, action_id, true).await
  }

  pub async fn pick_champion(&self, champion_id: i64, action_id: i64) -> bool {
    self.patch_action("Pick", champion_id, action_id, true).await
  }

  async fn patch_action(&self, label: &str, champion_id: i64, action_id: i64, completed: bool) -> bool {
    if champion_id <= 0 {
      warn!("[LCU Monitor] {} skipped: invalid champion id {}", label, champion_id);
      return false;
    }
    let Ok(_permit) = self.inner.action_pool.acquire().await else {
      return false;
    };
    match self
      .inner
      .client
      .patch_action(action_id, champion_id, completed)
      .await
    {
      Ok(()) => {
        info!(
          "[LCU Monitor] {} champion {} on action {}",
          label, champion_id, action_id
        );
        true
      }
      Err(e) => {
        // a stale action id is rejected by the client; that is a no-op for us
        warn!(
          "[LCU Monitor] {} of champion {} on action {} rejected: {}",
          label, champion_id, action_id, e
        );
        false
      }
    }
  }

  /// Fresh snapshot, `None` outside champ select or on failure.
  pub async fn fetch_session(&self) -> Option<ChampSelectSession> {
    match self.inner.client.champ_select_session().await {
      Ok(session) => session,
      Err(e) => {
        debug!("[LCU Monitor] Session fetch failed: {}", e);
        None
      }
    }
  }

  pub async fn get_banned_champions(&self) -> HashSet<i64> {
    self
      .fetch_session()
      .await
      .map(|s| s.banned_champions())
      .unwrap_or_default()
  }

  pub async fn get_picked_champions(&self) -> HashSet<i64> {
    self
      .fetch_session()
      .await
      .map(|s| s.picked_champions())
      .unwrap_or_default()
  }

  /// Seconds left in the current timer phase, extrapolated from the last poll.
  pub async fn get_remaining_time_in_phase(&self) -> Option<f64> {
    let cached = {
      let state = self.inner.lock_state();
      state
        .last_session
        .as_ref()
        .map(|c| (c.session.remaining_seconds(), c.taken_at.elapsed()))
    };
    if let Some((seconds, age)) = cached {
      return Some((seconds - age.as_secs_f64()).max(0.0));
    }
    self.fetch_session().await.map(|s| s.remaining_seconds())
  }

  pub async fn get_player_position(&self) -> Option<Position> {
    let cached = {
      let state = self.inner.lock_state();
      state.last_session.as_ref().map(|c| c.session.local_position())
    };
    match cached {
      Some(position) => position,
      None => self.fetch_session().await.and_then(|s| s.local_position()),
    }
  }

  fn lock_polling(&self) -> MutexGuard<'_, Option<PollingTask>> {
    self.polling.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Drop for LocalClientMonitor {
  fn drop(&mut self) {
    if let Some(task) = self.lock_polling().take() {
      task.token.cancel();
    }
  }
}

#[async_trait]
impl ChampSelectActions for LocalClientMonitor {
  async fn hover_champion(&self, champion_id: i64, action_id: i64) -> bool {
    LocalClientMonitor::hover_champion(self, champion_id, action_id).await
  }

  async fn ban_champion(&self, champion_id: i64, action_id: i64) -> bool {
    LocalClientMonitor::ban_champion(self, champion_id, action_id).await
  }

  async fn pick_champion(&self, champion_id: i64, action_id: i64) -> bool {
    LocalClientMonitor::pick_champion(self, champion_id, action_id).await
  }

  async fn remaining_time_in_phase(&self) -> Option<f64> {
    self.get_remaining_time_in_phase().await
  }

  async fn current_session(&self) -> Option<ChampSelectSession> {
    self.fetch_session().await
  }
}

impl MonitorInner {
  fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  async fn run(self: Arc<Self>, token: CancellationToken) {
    let period = self.settings.poll_interval();
    info!(
      "[LCU Monitor][{}] Polling every {}ms",
      self.id,
      period.as_millis()
    );

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = token.cancelled() => break,
        _ = interval.tick() => {}
      }
      tokio::select! {
        _ = token.cancelled() => break,
        _ = self.tick() => {}
      }
    }

    debug!("[LCU Monitor][{}] Polling task exiting", self.id);
  }

  // Probes run in sequence; each one's failure is contained.
  async fn tick(&self) {
    if self.should_reconnect() {
      self.reconnect().await;
    }

    match self.client.gameflow_phase().await {
      Ok(phase) => {
        self.record_probe_success();
        self.apply_phase(phase);
      }
      Err(e) => self.record_probe_failure(&e),
    }

    let phase = self.lock_state().phase;

    if phase == GamePhase::ReadyCheck {
      match self.client.ready_check_in_progress().await {
        Ok(in_progress) => self.apply_ready_check(in_progress),
        Err(e) => debug!("[LCU Monitor] Ready check probe failed: {}", e),
      }
    }

    if phase == GamePhase::ChampSelect {
      match self.client.champ_select_session().await {
        Ok(Some(session)) => self.apply_session(session),
        Ok(None) => {
          let mut state = self.lock_state();
          self.clear_session(&mut state);
        }
        Err(e) => debug!("[LCU Monitor] Session probe failed: {}", e),
      }
    }
  }

  // No client yet, or a lost one, and the last lookup is old enough.
  fn should_reconnect(&self) -> bool {
    if self.connector.is_none() {
      return false;
    }
    let state = self.lock_state();
    let lost = !self.client.is_set()
      || (!state.connection.is_connected() && state.consecutive_failures >= self.settings.failure_threshold());
    lost
      && state
        .last_reconnect
        .map_or(true, |at| at.elapsed() >= self.settings.reconnect_interval())
  }

  async fn reconnect(&self) -> bool {
    let Some(connector) = &self.connector else {
      return false;
    };
    self.lock_state().last_reconnect = Some(Instant::now());
    match connector.connect().await {
      Ok(api) => {
        self.client.replace(api);
        info!("[LCU Monitor][{}] Client located, connection rebuilt", self.id);
        true
      }
      Err(e) => {
        debug!("[LCU Monitor][{}] Client lookup failed: {}", self.id, e);
        false
      }
    }
  }

  fn record_probe_success(&self) {
    let mut state = self.lock_state();
    state.consecutive_failures = 0;
    if !state.connection.is_connected() {
      state.connection = ConnectionState::Connected;
      info!("[LCU Monitor][{}] Client reachable", self.id);
      self.bus.publish(MonitorEvent::ConnectionChanged(true));
    }
  }

  fn record_probe_failure(&self, error: &LcuError) {
    let mut state = self.lock_state();
    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    debug!(
      "[LCU Monitor][{}] Phase probe failed ({}): {}",
      self.id, state.consecutive_failures, error
    );

    if state.consecutive_failures < self.settings.failure_threshold() || !state.connection.is_connected() {
      return;
    }

    warn!(
      "[LCU Monitor][{}] Client unreachable after {} failed probes",
      self.id, state.consecutive_failures
    );
    state.connection = ConnectionState::Disconnected;
    self.bus.publish(MonitorEvent::ConnectionChanged(false));

    // a lost client takes its phase with it
    if state.phase != GamePhase::None {
      state.phase = GamePhase::None;
      self.bus.publish(MonitorEvent::PhaseChanged(GamePhase::None));
    }
    self.clear_ready_check(&mut state);
    self.clear_session(&mut state);
  }

  fn apply_phase(&self, phase: GamePhase) {
    let mut state = self.lock_state();
    if state.phase == phase {
      return;
    }

    info!("[LCU Monitor] Phase changed: {} -> {}", state.phase, phase);
    state.phase = phase;
    self.bus.publish(MonitorEvent::PhaseChanged(phase));

    if phase != GamePhase::ReadyCheck {
      self.clear_ready_check(&mut state);
    }
    if phase != GamePhase::ChampSelect {
      self.clear_session(&mut state);
    }
  }

  fn apply_ready_check(&self, in_progress: bool) {
    let mut state = self.lock_state();
    if state.ready_check == in_progress {
      return;
    }
    state.ready_check = in_progress;
    debug!("[LCU Monitor] Ready check in progress: {}", in_progress);
    self.bus.publish(MonitorEvent::ReadyCheckChanged(in_progress));
  }

  fn apply_session(&self, session: ChampSelectSession) {
    let fingerprint = content_fingerprint(&session);
    let mut state = self.lock_state();

    let change = state.identity.observe(&session);
    let session = Arc::new(session);
    state.last_session = Some(CachedSession {
      session: session.clone(),
      taken_at: Instant::now(),
    });

    let content_changed = state.fingerprint.as_deref() != Some(fingerprint.as_str());
    state.fingerprint = Some(fingerprint);
    let identity_changed = !matches!(change, IdentityChange::Unchanged(_));

    if !identity_changed && !content_changed {
      return;
    }

    match &change {
      IdentityChange::New(id) => info!("[LCU Monitor] New champ select session {}", id),
      IdentityChange::Refined { previous, current } => {
        info!("[LCU Monitor] Session id refined: {} -> {}", previous, current)
      }
      IdentityChange::Unchanged(_) => {}
    }

    self
      .bus
      .publish(MonitorEvent::ChampSelectSessionChanged(Some(SessionUpdate {
        session,
        change,
        observed_at: Utc::now(),
      })));
  }

  fn clear_ready_check(&self, state: &mut MonitorState) {
    if state.ready_check {
      state.ready_check = false;
      self.bus.publish(MonitorEvent::ReadyCheckChanged(false));
    }
  }

  fn clear_session(&self, state: &mut MonitorState) {
    if !state.has_session() {
      return;
    }
    state.identity.reset();
    state.fingerprint = None;
    state.last_session = None;
    debug!("[LCU Monitor] Champ select session ended");
    self.bus.publish(MonitorEvent::ChampSelectSessionChanged(None));
  }
}

fn content_fingerprint(session: &ChampSelectSession) -> String {
  let content = serde_json::to_vec(&(
    &session.game_id,
    &session.local_player_cell_id,
    &session.my_team,
    &session.their_team,
    &session.actions,
    &session.chat_details,
  ))
  .unwrap_or_default();
  format!("{:x}", md5::compute(content))
}
