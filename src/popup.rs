// Popup suppression: minimize the client once per prompt and session
//
// Prompt bookkeeping lives in memory only. A provisional (team hash) id may be
// refined later, so nothing keyed to it outlives the champ select phase.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AutomationConfig;
use crate::error::LcuResult;
use crate::lcu::{ActionKind, ClientApi, GamePhase, IdentityChange, SessionIdentity, SessionUpdate};

const MIN_SUPPRESSION_INTERVAL: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const FAILURE_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupCategory {
  ReadyCheck,
  BanPhase,
  PickPhase,
}

impl PopupCategory {
  pub fn for_action(kind: ActionKind) -> Option<Self> {
    match kind {
      ActionKind::Ban => Some(Self::BanPhase),
      ActionKind::Pick => Some(Self::PickPhase),
      ActionKind::Other => None,
    }
  }

  fn label(self) -> &'static str {
    match self {
      Self::ReadyCheck => "ready check",
      Self::BanPhase => "ban phase",
      Self::PickPhase => "pick phase",
    }
  }
}

/// Which categories have prompted for the current session id.
#[derive(Debug, Default)]
struct PromptLedger {
  session: Option<SessionIdentity>,
  prompted: HashSet<PopupCategory>,
  ready_check_prompted: bool,
}

impl PromptLedger {
  fn observe(&mut self, change: &IdentityChange) {
    match change {
      IdentityChange::New(id) => self.install(id),
      IdentityChange::Refined { current, .. } => self.session = Some(current.clone()),
      IdentityChange::Unchanged(id) => {
        if self.session.as_ref() != Some(id) {
          self.install(id);
        }
      }
    }
  }

  fn install(&mut self, identity: &SessionIdentity) {
    if self.session.as_ref() != Some(identity) {
      self.session = Some(identity.clone());
      self.prompted.clear();
    }
  }

  fn is_pending(&mut self, identity: &SessionIdentity, category: PopupCategory) -> bool {
    if category == PopupCategory::ReadyCheck {
      return !self.ready_check_prompted;
    }
    self.install(identity);
    !self.prompted.contains(&category)
  }

  fn mark(&mut self, category: PopupCategory) {
    if category == PopupCategory::ReadyCheck {
      self.ready_check_prompted = true;
    } else {
      self.prompted.insert(category);
    }
  }

  fn clear_session(&mut self) {
    self.session = None;
    self.prompted.clear();
  }
}

#[derive(Debug, Clone, Copy, Default)]
struct CategoryToggles {
  ready_check: bool,
  ban_phase: bool,
  pick_phase: bool,
}

impl CategoryToggles {
  fn get(&self, category: PopupCategory) -> bool {
    match category {
      PopupCategory::ReadyCheck => self.ready_check,
      PopupCategory::BanPhase => self.ban_phase,
      PopupCategory::PickPhase => self.pick_phase,
    }
  }

  fn set(&mut self, category: PopupCategory, enabled: bool) {
    match category {
      PopupCategory::ReadyCheck => self.ready_check = enabled,
      PopupCategory::BanPhase => self.ban_phase = enabled,
      PopupCategory::PickPhase => self.pick_phase = enabled,
    }
  }

  fn any(&self) -> bool {
    self.ready_check || self.ban_phase || self.pick_phase
  }
}

struct PopupState {
  toggles: CategoryToggles,
  phase: GamePhase,
  ledger: PromptLedger,
  window_minimized: bool,
  last_attempt: Option<Instant>,
  consecutive_failures: u32,
  disabled_until: Option<Instant>,
}

impl PopupState {
  // Lifts an expired backoff as a side effect.
  fn is_available(&mut self) -> bool {
    match self.disabled_until {
      Some(until) if Instant::now() < until => false,
      Some(_) => {
        info!("[Popup] Suppression available again");
        self.disabled_until = None;
        self.consecutive_failures = 0;
        true
      }
      None => true,
    }
  }
}

pub struct PopupSuppressionManager {
  api: Arc<dyn ClientApi>,
  state: Mutex<PopupState>,
}

impl PopupSuppressionManager {
  pub fn new(api: Arc<dyn ClientApi>, config: &AutomationConfig) -> Self {
    let toggles = CategoryToggles {
      ready_check: config.suppress_ready_check_popup,
      ban_phase: config.suppress_ban_popup,
      pick_phase: config.suppress_pick_popup,
    };
    Self {
      api,
      state: Mutex::new(PopupState {
        toggles,
        phase: GamePhase::None,
        ledger: PromptLedger::default(),
        window_minimized: false,
        last_attempt: None,
        consecutive_failures: 0,
        disabled_until: None,
      }),
    }
  }

  fn lock_state(&self) -> MutexGuard<'_, PopupState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn set_category_enabled(&self, category: PopupCategory, enabled: bool) {
    let mut state = self.lock_state();
    if state.toggles.get(category) != enabled {
      state.toggles.set(category, enabled);
      info!(
        "[Popup] {} suppression {}",
        category.label(),
        if enabled { "enabled" } else { "disabled" }
      );
    }
  }

  pub fn is_category_enabled(&self, category: PopupCategory) -> bool {
    self.lock_state().toggles.get(category)
  }

  /// Pick up toggle changes from a fresh policy snapshot.
  pub fn apply_config(&self, config: &AutomationConfig) {
    self.set_category_enabled(PopupCategory::ReadyCheck, config.suppress_ready_check_popup);
    self.set_category_enabled(PopupCategory::BanPhase, config.suppress_ban_popup);
    self.set_category_enabled(PopupCategory::PickPhase, config.suppress_pick_popup);
  }

  /// `true` exactly once per category for a session id. A new id re-arms
  /// every category.
  pub fn should_prompt(&self, identity: &SessionIdentity, category: PopupCategory) -> bool {
    let mut state = self.lock_state();
    if state.ledger.is_pending(identity, category) {
      state.ledger.mark(category);
      true
    } else {
      false
    }
  }

  /// Track the session id; a refinement keeps what already prompted.
  pub fn observe_identity(&self, change: &IdentityChange) {
    self.lock_state().ledger.observe(change);
  }

  pub async fn update_phase(&self, phase: GamePhase) {
    let restore = {
      let mut state = self.lock_state();
      if state.phase == phase {
        return;
      }
      debug!("[Popup] Phase {} -> {}", state.phase, phase);
      state.phase = phase;
      match phase {
        GamePhase::ChampSelect => {
          state.ledger.clear_session();
          false
        }
        GamePhase::ReadyCheck => {
          state.ledger.ready_check_prompted = false;
          false
        }
        GamePhase::None | GamePhase::Lobby => {
          state.ledger.clear_session();
          state.ledger.ready_check_prompted = false;
          state.window_minimized
        }
        _ => false,
      }
    };

    if restore {
      self.restore_window().await;
    }
  }

  pub async fn on_ready_check(&self, in_progress: bool) -> bool {
    if !in_progress {
      return false;
    }
    let proceed = {
      let mut state = self.lock_state();
      if !state.toggles.ready_check || state.ledger.ready_check_prompted {
        false
      } else if self.claim_attempt(&mut state) {
        state.ledger.mark(PopupCategory::ReadyCheck);
        true
      } else {
        false
      }
    };
    proceed && self.minimize_window("ready check").await
  }

  /// Suppress the ban/pick prompt for our in-progress action, once per id.
  pub async fn on_session(&self, update: &SessionUpdate) -> bool {
    let identity = update.identity();
    let categories: Vec<PopupCategory> = update
      .session
      .actionable_local_actions()
      .into_iter()
      .filter_map(|a| PopupCategory::for_action(a.kind))
      .collect();

    let reason = {
      let mut state = self.lock_state();
      state.ledger.observe(&update.change);

      let due = categories
        .into_iter()
        .find(|c| state.toggles.get(*c) && state.ledger.is_pending(identity, *c));
      match due {
        Some(category) if self.claim_attempt(&mut state) => {
          state.ledger.mark(category);
          Some(category.label())
        }
        _ => None,
      }
    };

    match reason {
      Some(reason) => {
        debug!("[Popup] Suppressing {} for {}", reason, identity);
        self.minimize_window(reason).await
      }
      None => false,
    }
  }

  // Availability and rate limit; records the attempt when allowed.
  fn claim_attempt(&self, state: &mut PopupState) -> bool {
    if !state.is_available() {
      debug!("[Popup] Suppression temporarily disabled");
      return false;
    }
    if let Some(last) = state.last_attempt {
      if last.elapsed() < MIN_SUPPRESSION_INTERVAL {
        debug!("[Popup] Rate limited, last attempt {:?} ago", last.elapsed());
        return false;
      }
    }
    state.last_attempt = Some(Instant::now());
    true
  }

  async fn minimize_window(&self, reason: &str) -> bool {
    let result: LcuResult<bool> = async {
      let visible = self.api.ux_visible().await?;
      if visible {
        self.api.minimize_ux().await?;
      }
      Ok(visible)
    }
    .await;

    let restore = {
      let mut state = self.lock_state();
      match result {
        Ok(minimized) => {
          state.consecutive_failures = 0;
          if minimized {
            state.window_minimized = true;
            info!("[Popup] Minimized client for {}", reason);
          } else {
            debug!("[Popup] Client already hidden, nothing to suppress");
          }
          return minimized;
        }
        Err(e) => {
          state.consecutive_failures += 1;
          warn!(
            "[Popup] Suppression failed ({}/{}): {}",
            state.consecutive_failures, MAX_CONSECUTIVE_FAILURES, e
          );
          if state.consecutive_failures < MAX_CONSECUTIVE_FAILURES {
            false
          } else {
            state.disabled_until = Some(Instant::now() + FAILURE_BACKOFF);
            warn!(
              "[Popup] Disabling suppression for {}s after repeated failures",
              FAILURE_BACKOFF.as_secs()
            );
            state.window_minimized
          }
        }
      }
    };

    if restore {
      self.restore_window().await;
    }
    false
  }

  pub async fn restore_window(&self) {
    if !self.lock_state().window_minimized {
      return;
    }
    match self.api.show_ux().await {
      Ok(()) => {
        self.lock_state().window_minimized = false;
        info!("[Popup] Client window restored");
      }
      Err(e) => debug!("[Popup] Failed to restore client window: {}", e),
    }
  }

  /// Probe the UX state endpoint the suppression relies on.
  pub async fn test_capability(&self) -> bool {
    match self.api.ux_visible().await {
      Ok(_) => {
        info!("[Popup] UX state API available");
        true
      }
      Err(e) => {
        warn!("[Popup] UX state API unavailable: {}", e);
        false
      }
    }
  }

  pub fn is_window_minimized(&self) -> bool {
    self.lock_state().window_minimized
  }

  pub fn is_suppression_available(&self) -> bool {
    self.lock_state().is_available()
  }

  pub fn status_summary(&self) -> String {
    let mut state = self.lock_state();
    if !state.toggles.any() {
      return "Popup suppression off".to_string();
    }

    let enabled: Vec<&str> = [
      PopupCategory::ReadyCheck,
      PopupCategory::BanPhase,
      PopupCategory::PickPhase,
    ]
    .into_iter()
    .filter(|c| state.toggles.get(*c))
    .map(|c| c.label())
    .collect();

    let mut summary = format!("Suppressing {}", enabled.join(", "));
    if !state.is_available() {
      summary.push_str(" (paused after failures)");
    } else if state.window_minimized {
      summary.push_str(" (window minimized)");
    }
    summary
  }
}
