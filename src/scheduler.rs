// Smart timing: hover early, arm, then commit the ban/pick close to the deadline
//
// Simple-delay mode replaces the deadline with a fixed wait. A rejected commit
// is retried a bounded number of times while the action is still live.
//
// Every pending action owns a child of the current session's cancellation
// token. Replacing the session or clearing it cancels the parent, so no
// recheck task can start a new fire afterwards.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{AutomationConfig, ChampionInfo, SharedConfig};
use crate::lcu::{ActionKind, ChampSelectSession, Position, SessionIdentity};
use crate::selection::{ChampionChoice, SelectionPolicy};

const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Client calls the scheduler needs; implemented by the monitor.
#[async_trait]
pub trait ChampSelectActions: Send + Sync {
  async fn hover_champion(&self, champion_id: i64, action_id: i64) -> bool;

  async fn ban_champion(&self, champion_id: i64, action_id: i64) -> bool;

  async fn pick_champion(&self, champion_id: i64, action_id: i64) -> bool;

  async fn remaining_time_in_phase(&self) -> Option<f64>;

  /// A fresh snapshot, never a cached one.
  async fn current_session(&self) -> Option<ChampSelectSession>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
  Idle,
  Hovering,
  Armed,
  /// Commit request in flight.
  Firing,
  Fired,
  /// Every commit attempt was rejected.
  Failed,
  Cancelled,
}

impl PendingState {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Fired | Self::Failed | Self::Cancelled)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
  pub action_id: i64,
  pub kind: ActionKind,
  pub target_champion_id: Option<i64>,
  pub state: PendingState,
}

struct PendingEntry {
  action: PendingAction,
  token: CancellationToken,
}

struct SchedulerSlot {
  session: Option<SessionIdentity>,
  session_token: CancellationToken,
  pending: HashMap<i64, PendingEntry>,
  // action id -> champion hovered before the turn started
  hovered_ahead: HashMap<i64, i64>,
}

impl SchedulerSlot {
  fn cancel_all(&mut self) -> usize {
    self.session_token.cancel();
    self.session_token = CancellationToken::new();
    let live = self
      .pending
      .values()
      .filter(|e| !e.action.state.is_terminal())
      .count();
    self.pending.clear();
    self.hovered_ahead.clear();
    live
  }
}

#[derive(Debug, Clone)]
struct FireRequest {
  kind: ActionKind,
  action_id: i64,
  champion: Option<ChampionInfo>,
  position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireTiming {
  Immediate,
  AfterDelay(Duration),
  AtDeadline,
}

impl FireTiming {
  fn for_action(config: &AutomationConfig, kind: ActionKind) -> Self {
    if let Some(delay) = config.simple_delay_for(kind) {
      Self::AfterDelay(delay)
    } else if config.smart_timing {
      Self::AtDeadline
    } else {
      Self::Immediate
    }
  }
}

enum FireCheck {
  Ready(ChampionChoice),
  /// No fresh snapshot; try again on the next recheck.
  Postpone,
  Stale,
  NoChoice,
}

struct SchedulerInner {
  actions: Arc<dyn ChampSelectActions>,
  config: SharedConfig,
  slot: Mutex<SchedulerSlot>,
  tracker: TaskTracker,
}

/// Owns every [`PendingAction`] of the current session.
#[derive(Clone)]
pub struct ActionScheduler {
  inner: Arc<SchedulerInner>,
}

impl ActionScheduler {
  pub fn new(actions: Arc<dyn ChampSelectActions>, config: SharedConfig) -> Self {
    let slot = SchedulerSlot {
      session: None,
      session_token: CancellationToken::new(),
      pending: HashMap::new(),
      hovered_ahead: HashMap::new(),
    };
    Self {
      inner: Arc::new(SchedulerInner {
        actions,
        config,
        slot: Mutex::new(slot),
        tracker: TaskTracker::new(),
      }),
    }
  }

  pub async fn handle_smart_ban(
    &self,
    action_id: i64,
    champion: Option<ChampionInfo>,
    position: Option<Position>,
  ) -> PendingState {
    self
      .handle(FireRequest {
        kind: ActionKind::Ban,
        action_id,
        champion,
        position,
      })
      .await
  }

  pub async fn handle_smart_pick(
    &self,
    action_id: i64,
    champion: Option<ChampionInfo>,
    position: Option<Position>,
  ) -> PendingState {
    self
      .handle(FireRequest {
        kind: ActionKind::Pick,
        action_id,
        champion,
        position,
      })
      .await
  }

  async fn handle(&self, request: FireRequest) -> PendingState {
    let inner = &self.inner;
    let token = {
      let mut slot = inner.lock_slot();
      if let Some(existing) = slot.pending.get(&request.action_id) {
        debug!(
          "[Smart Timing] Action {} already registered ({:?})",
          request.action_id, existing.action.state
        );
        return existing.action.state;
      }
      let token = slot.session_token.child_token();
      slot.pending.insert(
        request.action_id,
        PendingEntry {
          action: PendingAction {
            action_id: request.action_id,
            kind: request.kind,
            target_champion_id: request.champion.as_ref().and_then(|c| c.champion_id),
            state: PendingState::Idle,
          },
          token: token.clone(),
        },
      );
      token
    };

    let config = inner.config.snapshot();
    let timing = FireTiming::for_action(&config, request.kind);
    if timing == FireTiming::Immediate {
      info!(
        "[Smart Timing] Disabled, executing {} for action {} now",
        request.kind, request.action_id
      );
      return inner.clone().fire_when_due(request, token, timing).await;
    }

    let session = inner.actions.current_session().await;
    let choice = match &session {
      Some(session) => resolve_choice(&config, &request, session),
      None => SelectionPolicy::for_action(&config, request.kind, request.position, request.champion.as_ref())
        .choose(&Default::default()),
    };
    let Some(choice) = choice else {
      warn!(
        "[Smart Timing] No champion available for {} action {}, skipping",
        request.kind, request.action_id
      );
      inner.mark_cancelled(request.action_id);
      return PendingState::Cancelled;
    };

    let hover = config.hover && timing == FireTiming::AtDeadline;
    if hover && inner.advance(request.action_id, &token, PendingState::Hovering, Some(choice.champion_id)) {
      if inner
        .actions
        .hover_champion(choice.champion_id, request.action_id)
        .await
      {
        debug!(
          "[Smart Timing] Hovering {} for action {}",
          choice.champion, request.action_id
        );
      } else {
        warn!(
          "[Smart Timing] Hover of {} for action {} failed, continuing",
          choice.champion, request.action_id
        );
      }
    }

    if !inner.advance(request.action_id, &token, PendingState::Armed, Some(choice.champion_id)) {
      return self.pending_state(request.action_id).unwrap_or(PendingState::Cancelled);
    }

    match timing {
      FireTiming::AfterDelay(delay) => info!(
        "[Smart Timing] Armed {} action {} with {} (fires in {}s)",
        request.kind,
        request.action_id,
        choice.champion,
        delay.as_secs()
      ),
      _ => info!(
        "[Smart Timing] Armed {} action {} with {} (fires at <= {}s)",
        request.kind,
        request.action_id,
        choice.champion,
        threshold_for(&config, request.kind)
      ),
    }
    inner
      .tracker
      .spawn(inner.clone().fire_when_due(request, token, timing));
    PendingState::Armed
  }

  /// Hover the pick champion on our first open pick before that turn starts.
  ///
  /// Nothing is registered, so the pick itself is still handled normally once
  /// it comes up. A pick already in progress is left to auto-pick when that is
  /// on. Returns the hovered action id.
  pub async fn hover_ahead(&self, session: &ChampSelectSession, champion: Option<ChampionInfo>) -> Option<i64> {
    let config = self.inner.config.snapshot();
    let action = session.first_open_local_pick()?;
    if action.is_in_progress && config.auto_pick {
      return None;
    }
    if self.pending_state(action.id).is_some() {
      return None;
    }

    let request = FireRequest {
      kind: ActionKind::Pick,
      action_id: action.id,
      champion,
      position: None,
    };
    let Some(choice) = resolve_choice(&config, &request, session) else {
      debug!("[Smart Timing] Nothing to hover ahead on action {}", action.id);
      return None;
    };

    if self
      .inner
      .actions
      .hover_champion(choice.champion_id, action.id)
      .await
    {
      info!(
        "[Smart Timing] Hovering {} ahead of pick action {}",
        choice.champion, action.id
      );
      self
        .inner
        .lock_slot()
        .hovered_ahead
        .insert(action.id, choice.champion_id);
      Some(action.id)
    } else {
      warn!(
        "[Smart Timing] Hover ahead of {} on action {} failed",
        choice.champion, action.id
      );
      None
    }
  }

  /// Install `identity` as the current session, cancelling everything
  /// scheduled for a previous one. Returns whether anything was replaced.
  pub fn begin_session(&self, identity: &SessionIdentity) -> bool {
    let mut slot = self.inner.lock_slot();
    if slot.session.as_ref() == Some(identity) {
      return false;
    }
    let cancelled = slot.cancel_all();
    if let Some(previous) = slot.session.replace(identity.clone()) {
      info!(
        "[Smart Timing] Session {} replaced by {} ({} pending cancelled)",
        previous, identity, cancelled
      );
    } else {
      debug!("[Smart Timing] Tracking session {}", identity);
    }
    true
  }

  /// Same occurrence under a better id; pending actions stay.
  pub fn refine_session(&self, identity: &SessionIdentity) {
    let mut slot = self.inner.lock_slot();
    slot.session = Some(identity.clone());
  }

  pub fn current_session(&self) -> Option<SessionIdentity> {
    self.inner.lock_slot().session.clone()
  }

  /// Cancel every pending action. A fire already dispatched may still
  /// complete; no new fire starts after this returns.
  pub fn clear_pending_actions_for_session(&self) -> usize {
    let cancelled = self.inner.lock_slot().cancel_all();
    if cancelled > 0 {
      info!("[Smart Timing] Cleared {} pending action(s)", cancelled);
    }
    cancelled
  }

  /// Champion hovered ahead on `action_id` in this session, if any.
  pub fn hovered_ahead(&self, action_id: i64) -> Option<i64> {
    self.inner.lock_slot().hovered_ahead.get(&action_id).copied()
  }

  pub fn pending_state(&self, action_id: i64) -> Option<PendingState> {
    self
      .inner
      .lock_slot()
      .pending
      .get(&action_id)
      .map(|e| e.action.state)
  }

  pub fn has_armed_action(&self) -> bool {
    self
      .inner
      .lock_slot()
      .pending
      .values()
      .any(|e| {
        matches!(
          e.action.state,
          PendingState::Hovering | PendingState::Armed | PendingState::Firing
        )
      })
  }

  pub fn pending_actions(&self) -> Vec<PendingAction> {
    let slot = self.inner.lock_slot();
    let mut actions: Vec<PendingAction> = slot.pending.values().map(|e| e.action.clone()).collect();
    actions.sort_by_key(|a| a.action_id);
    actions
  }

  /// Cancel everything and wait for the recheck tasks to exit.
  pub async fn shutdown(&self) {
    self.clear_pending_actions_for_session();
    self.inner.tracker.close();
    self.inner.tracker.wait().await;
    debug!("[Smart Timing] Scheduler shut down");
  }
}

impl SchedulerInner {
  fn lock_slot(&self) -> MutexGuard<'_, SchedulerSlot> {
    self.slot.lock().unwrap_or_else(|e| e.into_inner())
  }

  // Move a live entry forward. Fails once cancelled or terminal.
  fn advance(&self, action_id: i64, token: &CancellationToken, to: PendingState, target: Option<i64>) -> bool {
    let mut slot = self.lock_slot();
    if token.is_cancelled() {
      return false;
    }
    let Some(entry) = slot.pending.get_mut(&action_id) else {
      return false;
    };
    if entry.action.state.is_terminal() {
      return false;
    }
    entry.action.state = to;
    if target.is_some() {
      entry.action.target_champion_id = target;
    }
    true
  }

  // Outcome of a commit. A cleared entry stays cleared.
  fn finish(&self, action_id: i64, outcome: PendingState) {
    let mut slot = self.lock_slot();
    if let Some(entry) = slot.pending.get_mut(&action_id) {
      if entry.action.state == PendingState::Firing {
        entry.action.state = outcome;
      }
    }
  }

  fn mark_cancelled(&self, action_id: i64) {
    let mut slot = self.lock_slot();
    if let Some(entry) = slot.pending.get_mut(&action_id) {
      if !entry.action.state.is_terminal() {
        entry.action.state = PendingState::Cancelled;
        entry.token.cancel();
      }
    }
  }

  /// Wait according to `timing`, then commit. A rejected commit is retried
  /// with a growing wait until [`MAX_COMMIT_ATTEMPTS`] is reached.
  async fn fire_when_due(self: Arc<Self>, request: FireRequest, token: CancellationToken, timing: FireTiming) -> PendingState {
    let mut first = true;
    let mut rejected = 0u32;
    loop {
      let config = self.config.snapshot();
      let wait = if first {
        match timing {
          FireTiming::AfterDelay(delay) => Some(delay),
          _ => None,
        }
      } else if rejected > 0 {
        Some(config.monitor.commit_retry_delay() * rejected)
      } else {
        Some(config.monitor.recheck_interval())
      };
      first = false;

      if let Some(wait) = wait {
        tokio::select! {
          _ = token.cancelled() => {}
          _ = tokio::time::sleep(wait) => {}
        }
      }

      if token.is_cancelled() {
        debug!("[Smart Timing] Action {} cancelled before firing", request.action_id);
        return PendingState::Cancelled;
      }

      if timing == FireTiming::AtDeadline {
        let threshold = threshold_for(&config, request.kind);
        let floor = config.monitor.min_remaining_seconds(request.kind);
        match self.actions.remaining_time_in_phase().await {
          Some(remaining) if remaining < floor => {
            warn!(
              "[Smart Timing] Only {:.1}s left for {} action {} (minimum {}s), dropping it",
              remaining, request.kind, request.action_id, floor
            );
            self.mark_cancelled(request.action_id);
            return PendingState::Cancelled;
          }
          Some(remaining) if remaining <= threshold => {
            debug!(
              "[Smart Timing] {:.1}s left (threshold {}s), firing action {}",
              remaining, threshold, request.action_id
            );
          }
          Some(_) => continue,
          None => {
            debug!("[Smart Timing] No timer for action {}, waiting", request.action_id);
            continue;
          }
        }
      }

      let choice = match self.check_before_fire(&config, &request).await {
        FireCheck::Ready(choice) => choice,
        FireCheck::Postpone => {
          debug!(
            "[Smart Timing] No fresh session for action {}, retrying",
            request.action_id
          );
          continue;
        }
        FireCheck::Stale => {
          info!(
            "[Smart Timing] Action {} no longer in progress, not firing",
            request.action_id
          );
          self.mark_cancelled(request.action_id);
          return PendingState::Cancelled;
        }
        FireCheck::NoChoice => {
          warn!(
            "[Smart Timing] Every candidate for {} action {} is excluded",
            request.kind, request.action_id
          );
          self.mark_cancelled(request.action_id);
          return PendingState::Cancelled;
        }
      };

      if !self.advance(request.action_id, &token, PendingState::Firing, Some(choice.champion_id)) {
        return PendingState::Cancelled;
      }

      let success = match request.kind {
        ActionKind::Pick => {
          self
            .actions
            .pick_champion(choice.champion_id, request.action_id)
            .await
        }
        _ => {
          self
            .actions
            .ban_champion(choice.champion_id, request.action_id)
            .await
        }
      };

      if success {
        info!(
          "[Smart Timing] {} {} on action {}",
          request.kind, choice.champion, request.action_id
        );
        self.finish(request.action_id, PendingState::Fired);
        return PendingState::Fired;
      }

      rejected += 1;
      if rejected >= MAX_COMMIT_ATTEMPTS {
        warn!(
          "[Smart Timing] {} of {} on action {} rejected {} times, giving up",
          request.kind, choice.champion, request.action_id, rejected
        );
        self.finish(request.action_id, PendingState::Failed);
        return PendingState::Failed;
      }

      warn!(
        "[Smart Timing] {} of {} on action {} was rejected (attempt {}/{}), retrying",
        request.kind, choice.champion, request.action_id, rejected, MAX_COMMIT_ATTEMPTS
      );
      if !self.advance(request.action_id, &token, PendingState::Armed, None) {
        return PendingState::Cancelled;
      }
    }
  }

  async fn check_before_fire(&self, config: &AutomationConfig, request: &FireRequest) -> FireCheck {
    let Some(session) = self.actions.current_session().await else {
      return FireCheck::Postpone;
    };

    let live = session
      .find_action(request.action_id)
      .map(|a| a.is_in_progress && !a.completed)
      .unwrap_or(false);
    if !live {
      return FireCheck::Stale;
    }

    match resolve_choice(config, request, &session) {
      Some(choice) => FireCheck::Ready(choice),
      None => FireCheck::NoChoice,
    }
  }
}

fn threshold_for(config: &AutomationConfig, kind: ActionKind) -> f64 {
  match kind {
    ActionKind::Pick => config.pick_threshold_seconds(),
    _ => config.ban_threshold_seconds(),
  }
}

// Choice against the exclusions of `session`, not of the snapshot we scheduled from.
fn resolve_choice(config: &AutomationConfig, request: &FireRequest, session: &ChampSelectSession) -> Option<ChampionChoice> {
  let position = request.position.or_else(|| session.local_position());
  SelectionPolicy::for_action(config, request.kind, position, request.champion.as_ref())
    .choose(&session.exclusions_for(request.kind))
}
