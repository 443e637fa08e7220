// Champ select automation: auto-accept, smart ban/pick dispatch and popup suppression
//
// Consumes the monitor's event stream; every decision reads a fresh policy
// snapshot so UI changes apply from the next event on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::lcu::{
  ActionKind, ClientApi, ClientConnector, GamePhase, IdentityChange, LocalClientMonitor, MonitorEvent,
  SessionUpdate,
};
use crate::popup::PopupSuppressionManager;
use crate::scheduler::ActionScheduler;

const MAX_ACCEPT_ATTEMPTS: u32 = 3;

/// Action ids already handed to the scheduler for the current session.
#[derive(Debug, Default)]
struct DispatchState {
  processed: HashSet<i64>,
}

impl DispatchState {
  fn reset(&mut self) {
    self.processed.clear();
  }
}

struct AutomationInner {
  monitor: Arc<LocalClientMonitor>,
  scheduler: ActionScheduler,
  popup: PopupSuppressionManager,
  config: SharedConfig,
  dispatches: TaskTracker,
}

struct EventLoop {
  token: CancellationToken,
  handle: JoinHandle<()>,
}

pub struct ChampSelectAutomation {
  inner: Arc<AutomationInner>,
  event_loop: Mutex<Option<EventLoop>>,
}

impl ChampSelectAutomation {
  pub fn new(api: Arc<dyn ClientApi>, config: SharedConfig) -> Self {
    let monitor = LocalClientMonitor::new(api, config.snapshot().monitor);
    Self::around(monitor, config)
  }

  /// Automation for whichever client `connector` finds, following restarts.
  pub fn with_connector(connector: Arc<dyn ClientConnector>, config: SharedConfig) -> Self {
    let monitor = LocalClientMonitor::with_connector(connector, config.snapshot().monitor);
    Self::around(monitor, config)
  }

  fn around(monitor: LocalClientMonitor, config: SharedConfig) -> Self {
    let monitor = Arc::new(monitor);
    let scheduler = ActionScheduler::new(monitor.clone(), config.clone());
    // popups share the monitor's handle so they follow reconnects
    let popup = PopupSuppressionManager::new(Arc::new(monitor.client()), &config.snapshot());
    Self::from_parts(monitor, scheduler, popup, config)
  }

  pub fn from_parts(
    monitor: Arc<LocalClientMonitor>,
    scheduler: ActionScheduler,
    popup: PopupSuppressionManager,
    config: SharedConfig,
  ) -> Self {
    Self {
      inner: Arc::new(AutomationInner {
        monitor,
        scheduler,
        popup,
        config,
        dispatches: TaskTracker::new(),
      }),
      event_loop: Mutex::new(None),
    }
  }

  pub fn monitor(&self) -> &Arc<LocalClientMonitor> {
    &self.inner.monitor
  }

  pub fn scheduler(&self) -> &ActionScheduler {
    &self.inner.scheduler
  }

  pub fn popup(&self) -> &PopupSuppressionManager {
    &self.inner.popup
  }

  pub fn is_running(&self) -> bool {
    self.lock_event_loop().is_some()
  }

  /// Subscribe to the monitor and start polling. Must be called inside a
  /// tokio runtime; a second call is a no-op.
  pub fn start(&self) {
    let mut event_loop = self.lock_event_loop();
    if event_loop.is_some() {
      debug!("[Automation] Already running");
      return;
    }

    // subscribe before polling starts so the first transitions are not missed
    let events = self.inner.monitor.subscribe();
    let token = CancellationToken::new();
    self.inner.dispatches.reopen();
    let handle = tokio::spawn(self.inner.clone().run(events, token.clone()));
    self.inner.monitor.start_monitoring();
    *event_loop = Some(EventLoop { token, handle });
    info!("[Automation] Started");
  }

  /// No ban, pick or accept is initiated after this returns.
  pub async fn stop(&self) {
    let event_loop = self.lock_event_loop().take();
    let Some(event_loop) = event_loop else {
      return;
    };

    event_loop.token.cancel();
    self.inner.monitor.stop_monitoring();
    if let Err(e) = event_loop.handle.await {
      warn!("[Automation] Event loop ended abnormally: {}", e);
    }

    self.inner.dispatches.close();
    self.inner.dispatches.wait().await;
    self.inner.scheduler.clear_pending_actions_for_session();
    info!("[Automation] Stopped");
  }

  /// Stop, then dispose of the monitor and scheduler tasks.
  pub async fn shutdown(&self) {
    self.stop().await;
    self.inner.scheduler.shutdown().await;
    self.inner.monitor.shutdown().await;
    self.inner.popup.restore_window().await;
  }

  fn lock_event_loop(&self) -> MutexGuard<'_, Option<EventLoop>> {
    self.event_loop.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl AutomationInner {
  async fn run(self: Arc<Self>, mut events: Receiver<MonitorEvent>, token: CancellationToken) {
    let mut dispatch = DispatchState::default();
    loop {
      let event = tokio::select! {
        _ = token.cancelled() => break,
        event = events.recv() => event,
      };

      match event {
        Ok(event) => self.handle_event(event, &mut dispatch, &token).await,
        Err(RecvError::Lagged(skipped)) => {
          warn!("[Automation] Missed {} monitor events", skipped);
        }
        Err(RecvError::Closed) => break,
      }
    }
    debug!("[Automation] Event loop exiting");
  }

  async fn handle_event(&self, event: MonitorEvent, dispatch: &mut DispatchState, token: &CancellationToken) {
    match event {
      MonitorEvent::ConnectionChanged(connected) => {
        info!("[Automation] Client connection: {}", connected);
        if !connected {
          self.end_session(dispatch);
        }
      }
      MonitorEvent::PhaseChanged(phase) => {
        self.popup.apply_config(&self.config.snapshot());
        self.popup.update_phase(phase).await;
        if phase != GamePhase::ChampSelect {
          self.end_session(dispatch);
        }
      }
      MonitorEvent::ReadyCheckChanged(in_progress) => {
        if !in_progress {
          return;
        }
        if self.config.snapshot().auto_accept {
          info!("[Automation] Ready check found, accepting");
          if !self.monitor.accept_ready_check().await {
            warn!("[Automation] Auto-accept failed, retrying while the ready check is open");
            self.retry_accept(token);
          }
        }
        self.popup.on_ready_check(true).await;
      }
      MonitorEvent::ChampSelectSessionChanged(None) => self.end_session(dispatch),
      MonitorEvent::ChampSelectSessionChanged(Some(update)) => {
        match &update.change {
          IdentityChange::New(identity) => {
            self.scheduler.begin_session(identity);
            dispatch.reset();
            self.hover_ahead(&update, token);
          }
          IdentityChange::Refined { current, .. } => self.scheduler.refine_session(current),
          IdentityChange::Unchanged(_) => {}
        }
        self.popup.on_session(&update).await;
        self.dispatch_actions(&update, dispatch, token);
      }
    }
  }

  // Accept again on later polls; gives up once the ready check closes.
  fn retry_accept(&self, token: &CancellationToken) {
    let monitor = self.monitor.clone();
    let config = self.config.clone();
    let token = token.clone();
    self.dispatches.spawn(async move {
      for attempt in 2..=MAX_ACCEPT_ATTEMPTS {
        let wait = config.snapshot().monitor.poll_interval();
        tokio::select! {
          _ = token.cancelled() => return,
          _ = tokio::time::sleep(wait) => {}
        }
        if !monitor.ready_check_pending() || !config.snapshot().auto_accept {
          debug!("[Automation] Ready check closed, no more accept attempts");
          return;
        }
        if monitor.accept_ready_check().await {
          info!("[Automation] Ready check accepted on attempt {}", attempt);
          return;
        }
      }
      warn!("[Automation] Auto-accept gave up after {} attempts", MAX_ACCEPT_ATTEMPTS);
    });
  }

  fn hover_ahead(&self, update: &SessionUpdate, token: &CancellationToken) {
    let config = self.config.snapshot();
    if !config.auto_hover {
      return;
    }
    let scheduler = self.scheduler.clone();
    let session = update.session.clone();
    let token = token.clone();
    self.dispatches.spawn(async move {
      tokio::select! {
        _ = token.cancelled() => {}
        hovered = scheduler.hover_ahead(&session, config.pick_champion.clone()) => {
          debug!("[Automation] Hover ahead: {:?}", hovered);
        }
      }
    });
  }

  fn end_session(&self, dispatch: &mut DispatchState) {
    self.scheduler.clear_pending_actions_for_session();
    dispatch.reset();
  }

  fn dispatch_actions(&self, update: &SessionUpdate, dispatch: &mut DispatchState, token: &CancellationToken) {
    let config = self.config.snapshot();
    let session = &update.session;
    let position = session.local_position();

    for action in session.actionable_local_actions() {
      if dispatch.processed.contains(&action.id) {
        continue;
      }

      let (kind, champion) = match action.kind {
        ActionKind::Ban if config.auto_ban => (ActionKind::Ban, config.ban_champion.clone()),
        ActionKind::Pick if config.auto_pick => {
          // the user already chose something for this pick, other than our early hover
          let user_choice =
            action.champion_id != 0 && self.scheduler.hovered_ahead(action.id) != Some(action.champion_id);
          if user_choice || self.scheduler.pending_state(action.id).is_some() {
            continue;
          }
          (ActionKind::Pick, config.pick_champion.clone())
        }
        _ => continue,
      };

      dispatch.processed.insert(action.id);
      debug!(
        "[Automation] Dispatching {} action {} (position {:?})",
        kind, action.id, position
      );

      let scheduler = self.scheduler.clone();
      let token = token.clone();
      let action_id = action.id;
      self.dispatches.spawn(async move {
        let handled = async {
          match kind {
            ActionKind::Pick => scheduler.handle_smart_pick(action_id, champion, position).await,
            _ => scheduler.handle_smart_ban(action_id, champion, position).await,
          }
        };
        tokio::select! {
          _ = token.cancelled() => {}
          state = handled => debug!("[Automation] Action {} -> {:?}", action_id, state),
        }
      });
    }
  }
}
