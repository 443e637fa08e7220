// LCU connection: lockfile credentials, authenticated HTTP client and the API seam
//
// The League client picks a new port and token on every restart, so the
// connection in use sits behind a `ClientHandle` that a `ClientConnector` can
// swap out.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use reqwest::Method;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use super::types::{ChampSelectSession, GamePhase};
use crate::error::{LcuError, LcuResult};

const LOCKFILE_NAMES: [&str; 3] = ["lockfile", "LeagueClientUx.lockfile", "LeagueClient.lockfile"];

#[derive(Clone, PartialEq, Eq)]
pub struct LcuCredentials {
  pub port: u16,
  pub token: String,
}

impl std::fmt::Debug for LcuCredentials {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LcuCredentials")
      .field("port", &self.port)
      .field("token", &"<redacted>")
      .finish()
  }
}

impl LcuCredentials {
  /// Parse `name:pid:port:password:protocol`.
  pub fn from_lockfile_contents(contents: &str) -> LcuResult<Self> {
    let parts: Vec<&str> = contents.trim().split(':').collect();
    if parts.len() < 5 {
      return Err(LcuError::Lockfile(format!(
        "expected 5 fields, found {}",
        parts.len()
      )));
    }
    let port = parts[2]
      .parse::<u16>()
      .map_err(|e| LcuError::Lockfile(format!("bad port '{}': {}", parts[2], e)))?;
    let token = parts[3].to_string();
    if token.is_empty() {
      return Err(LcuError::Lockfile("empty token".to_string()));
    }
    Ok(Self { port, token })
  }

  pub fn from_lockfile(path: &Path) -> LcuResult<Self> {
    let contents = std::fs::read_to_string(path)?;
    Self::from_lockfile_contents(&contents)
  }

  /// First readable lockfile in the given install directories.
  pub fn discover<P: AsRef<Path>>(dirs: &[P]) -> Option<(Self, PathBuf)> {
    for dir in dirs {
      for name in LOCKFILE_NAMES {
        let path = dir.as_ref().join(name);
        if !path.is_file() {
          continue;
        }
        match Self::from_lockfile(&path) {
          Ok(creds) => return Some((creds, path)),
          Err(e) => debug!("[LCU] Ignoring {}: {}", path.display(), e),
        }
      }
    }
    None
  }

  fn auth_header(&self) -> String {
    let auth = general_purpose::STANDARD.encode(format!("riot:{}", self.token));
    format!("Basic {}", auth)
  }
}

/// The subset of the client API the monitor and popup suppression need.
///
/// Implemented by [`LcuConnection`] against the real client; tests plug in
/// scripted fakes.
#[async_trait]
pub trait ClientApi: Send + Sync {
  async fn gameflow_phase(&self) -> LcuResult<GamePhase>;

  /// `true` while a ready check is waiting for our answer.
  async fn ready_check_in_progress(&self) -> LcuResult<bool>;

  /// `None` when the client is not in champ select.
  async fn champ_select_session(&self) -> LcuResult<Option<ChampSelectSession>>;

  async fn accept_ready_check(&self) -> LcuResult<()>;

  async fn patch_action(&self, action_id: i64, champion_id: i64, completed: bool) -> LcuResult<()>;

  async fn ux_visible(&self) -> LcuResult<bool>;

  async fn minimize_ux(&self) -> LcuResult<()>;

  async fn show_ux(&self) -> LcuResult<()>;
}

/// HTTPS client bound to one running LCU instance.
#[derive(Clone)]
pub struct LcuConnection {
  base_url: String,
  auth: String,
  client: reqwest::Client,
}

impl LcuConnection {
  pub fn new(credentials: &LcuCredentials) -> LcuResult<Self> {
    // the LCU serves a self-signed certificate on loopback
    let client = reqwest::Client::builder()
      .danger_accept_invalid_certs(true)
      .timeout(Duration::from_secs(5))
      .connect_timeout(Duration::from_secs(2))
      .pool_max_idle_per_host(2)
      .build()?;

    Ok(Self {
      base_url: format!("https://127.0.0.1:{}", credentials.port),
      auth: credentials.auth_header(),
      client,
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn request(&self, method: Method, endpoint: &str, body: Option<Value>) -> LcuResult<reqwest::Response> {
    let url = format!("{}{}", self.base_url, endpoint);
    let mut builder = self
      .client
      .request(method.clone(), &url)
      .header("Authorization", &self.auth);
    if let Some(body) = body {
      builder = builder.json(&body);
    }

    let response = builder.send().await?;
    if !response.status().is_success() {
      return Err(LcuError::Status {
        method: method.to_string(),
        endpoint: endpoint.to_string(),
        status: response.status().as_u16(),
      });
    }
    Ok(response)
  }

  async fn get_json(&self, endpoint: &str) -> LcuResult<Value> {
    let response = self.request(Method::GET, endpoint, None).await?;
    response.json::<Value>().await.map_err(|e| LcuError::Decode {
      endpoint: endpoint.to_string(),
      reason: e.to_string(),
    })
  }
}

#[async_trait]
impl ClientApi for LcuConnection {
  async fn gameflow_phase(&self) -> LcuResult<GamePhase> {
    let value = self.get_json("/lol-gameflow/v1/gameflow-phase").await?;
    match value.as_str() {
      Some(name) => Ok(GamePhase::from_lcu_name(name)),
      None => Err(LcuError::Decode {
        endpoint: "/lol-gameflow/v1/gameflow-phase".to_string(),
        reason: format!("expected string, got {}", value),
      }),
    }
  }

  async fn ready_check_in_progress(&self) -> LcuResult<bool> {
    match self.get_json("/lol-matchmaking/v1/ready-check").await {
      Ok(value) => Ok(value.get("state").and_then(|s| s.as_str()) == Some("InProgress")),
      Err(e) if e.is_not_found() => Ok(false),
      Err(e) => Err(e),
    }
  }

  async fn champ_select_session(&self) -> LcuResult<Option<ChampSelectSession>> {
    let endpoint = "/lol-champ-select/v1/session";
    match self.get_json(endpoint).await {
      Ok(value) => ChampSelectSession::from_json(value)
        .map(Some)
        .map_err(|e| LcuError::Decode {
          endpoint: endpoint.to_string(),
          reason: e.to_string(),
        }),
      Err(e) if e.is_not_found() => Ok(None),
      Err(e) => Err(e),
    }
  }

  async fn accept_ready_check(&self) -> LcuResult<()> {
    self
      .request(Method::POST, "/lol-matchmaking/v1/ready-check/accept", None)
      .await
      .map(|_| ())
  }

  async fn patch_action(&self, action_id: i64, champion_id: i64, completed: bool) -> LcuResult<()> {
    let endpoint = format!("/lol-champ-select/v1/session/actions/{}", action_id);
    let body = json!({ "championId": champion_id, "completed": completed });
    self
      .request(Method::PATCH, &endpoint, Some(body))
      .await
      .map(|_| ())
  }

  async fn ux_visible(&self) -> LcuResult<bool> {
    let value = self.get_json("/riotclient/ux-state").await?;
    Ok(value.get("isVisible").and_then(|v| v.as_bool()).unwrap_or(true))
  }

  async fn minimize_ux(&self) -> LcuResult<()> {
    self
      .request(Method::POST, "/riotclient/ux-minimize", None)
      .await
      .map(|_| ())
  }

  async fn show_ux(&self) -> LcuResult<()> {
    self
      .request(Method::POST, "/riotclient/ux-show", None)
      .await
      .map(|_| ())
  }
}

/// Finds the running client and opens a connection to it.
#[async_trait]
pub trait ClientConnector: Send + Sync {
  async fn connect(&self) -> LcuResult<Arc<dyn ClientApi>>;
}

/// Re-reads the lockfile from the install directories on every connect.
#[derive(Debug, Clone)]
pub struct LockfileConnector {
  dirs: Vec<PathBuf>,
}

impl LockfileConnector {
  pub fn new<P: AsRef<Path>>(dirs: &[P]) -> Self {
    Self {
      dirs: dirs.iter().map(|d| d.as_ref().to_path_buf()).collect(),
    }
  }
}

#[async_trait]
impl ClientConnector for LockfileConnector {
  async fn connect(&self) -> LcuResult<Arc<dyn ClientApi>> {
    let Some((credentials, path)) = LcuCredentials::discover(&self.dirs) else {
      return Err(LcuError::Lockfile(format!(
        "no lockfile in {} director{}",
        self.dirs.len(),
        if self.dirs.len() == 1 { "y" } else { "ies" }
      )));
    };
    debug!("[LCU] Using {} (port {})", path.display(), credentials.port);
    Ok(Arc::new(LcuConnection::new(&credentials)?))
  }
}

/// Shared, replaceable client. Every holder sees a reconnect at once.
#[derive(Clone, Default)]
pub struct ClientHandle {
  current: Arc<RwLock<Option<Arc<dyn ClientApi>>>>,
}

impl ClientHandle {
  pub fn new(api: Arc<dyn ClientApi>) -> Self {
    Self {
      current: Arc::new(RwLock::new(Some(api))),
    }
  }

  pub fn empty() -> Self {
    Self::default()
  }

  pub fn replace(&self, api: Arc<dyn ClientApi>) {
    let mut current = match self.current.write() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    *current = Some(api);
  }

  pub fn is_set(&self) -> bool {
    self.get().is_some()
  }

  fn get(&self) -> Option<Arc<dyn ClientApi>> {
    match self.current.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  fn api(&self) -> LcuResult<Arc<dyn ClientApi>> {
    self.get().ok_or(LcuError::NotConnected)
  }
}

#[async_trait]
impl ClientApi for ClientHandle {
  async fn gameflow_phase(&self) -> LcuResult<GamePhase> {
    self.api()?.gameflow_phase().await
  }

  async fn ready_check_in_progress(&self) -> LcuResult<bool> {
    self.api()?.ready_check_in_progress().await
  }

  async fn champ_select_session(&self) -> LcuResult<Option<ChampSelectSession>> {
    self.api()?.champ_select_session().await
  }

  async fn accept_ready_check(&self) -> LcuResult<()> {
    self.api()?.accept_ready_check().await
  }

  async fn patch_action(&self, action_id: i64, champion_id: i64, completed: bool) -> LcuResult<()> {
    self
      .api()?
      .patch_action(action_id, champion_id, completed)
      .await
  }

  async fn ux_visible(&self) -> LcuResult<bool> {
    self.api()?.ux_visible().await
  }

  async fn minimize_ux(&self) -> LcuResult<()> {
    self.api()?.minimize_ux().await
  }

  async fn show_ux(&self) -> LcuResult<()> {
    self.api()?.show_ux().await
  }
}
