//! Provisioning Client (Pterodactyl application API) and the persisted
//! panel connection profile.

use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// One provisioning size token and its resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSize {
    pub token: &'static str,
    pub memory_mb: u32,
    pub disk_mb: u32,
    pub cpu_percent: u32,
}

/// Fixed size table. `unli` is the unlimited variant (zero means no limit
/// on the panel side).
pub const SIZES: &[ServerSize] = &[
    ServerSize { token: "1gb", memory_mb: 1024, disk_mb: 10240, cpu_percent: 50 },
    ServerSize { token: "2gb", memory_mb: 2048, disk_mb: 20480, cpu_percent: 60 },
    ServerSize { token: "3gb", memory_mb: 3072, disk_mb: 30720, cpu_percent: 70 },
    ServerSize { token: "4gb", memory_mb: 4096, disk_mb: 40960, cpu_percent: 80 },
    ServerSize { token: "5gb", memory_mb: 5120, disk_mb: 51200, cpu_percent: 90 },
    ServerSize { token: "6gb", memory_mb: 6144, disk_mb: 61440, cpu_percent: 100 },
    ServerSize { token: "7gb", memory_mb: 7168, disk_mb: 71680, cpu_percent: 110 },
    ServerSize { token: "8gb", memory_mb: 8192, disk_mb: 81920, cpu_percent: 120 },
    ServerSize { token: "9gb", memory_mb: 9216, disk_mb: 92160, cpu_percent: 130 },
    ServerSize { token: "10gb", memory_mb: 10240, disk_mb: 102400, cpu_percent: 140 },
    ServerSize { token: "unli", memory_mb: 0, disk_mb: 0, cpu_percent: 0 },
];

impl ServerSize {
    pub fn from_token(token: &str) -> Option<&'static ServerSize> {
        let token = token.to_lowercase();
        SIZES.iter().find(|s| s.token == token)
    }
}

/// Persisted panel connection profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelTarget {
    pub domain: String,
    pub plta: String,
    #[serde(default)]
    pub pltc: String,
    #[serde(default = "default_egg")]
    pub eggid: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_nest")]
    pub nestid: String,
}

fn default_egg() -> String {
    "15".to_string()
}
fn default_location() -> String {
    "1".to_string()
}
fn default_nest() -> String {
    "5".to_string()
}

/// Whole-file store for the panel profile. Legacy documents may be a
/// single-element array; the first entry wins.
pub struct PanelStore {
    path: PathBuf,
}

impl PanelStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Option<PanelTarget> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let value: Value = serde_json::from_str(&raw).ok()?;
        let obj = match value {
            Value::Array(items) => items.into_iter().next()?,
            other => other,
        };
        let target: PanelTarget = serde_json::from_value(obj).ok()?;
        if target.domain.is_empty() || target.plta.is_empty() {
            return None;
        }
        Some(target)
    }

    pub fn save(&self, target: &PanelTarget) -> Result<()> {
        let raw = serde_json::to_string_pretty(target)
            .map_err(|e| BotError::Persistence(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelUser {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Allocation {
    pub id: u64,
    pub assigned: bool,
}

#[derive(Debug, Clone)]
pub struct EggTemplate {
    pub docker_image: String,
    pub startup: String,
    pub environment: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSummary {
    pub id: u64,
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Result of the composite create-server operation.
#[derive(Debug, Clone)]
pub struct CreatedServer {
    pub username: String,
    pub password: String,
    pub identifier: String,
    pub id: u64,
    pub panel_url: String,
}

/// Inputs to the composite create-server operation.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub password: String,
    pub size: ServerSize,
    pub admin: bool,
}

/// The provisioning operations the router drives. `PanelClient` is the
/// live implementation; the trait is the seam that lets dispatch be
/// exercised against a stub.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer>;
    async fn list_servers(&self) -> Result<Vec<ServerSummary>>;
    async fn delete_server(&self, id: u64) -> Result<()>;
}

/// Thin client over the application API. Constructed from a loaded
/// `PanelTarget`, so a client always has a URL and bearer token; callers
/// report the unconfigured case before ever building one.
pub struct PanelClient {
    http: Client,
    base: String,
    token: String,
    egg_id: String,
    location_id: String,
    nest_id: String,
}

impl PanelClient {
    pub fn new(http: Client, target: &PanelTarget) -> Self {
        Self {
            http,
            base: target.domain.trim_end_matches('/').to_string(),
            token: target.plta.clone(),
            egg_id: target.eggid.clone(),
            location_id: target.location.clone(),
            nest_id: target.nestid.clone(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
    }

    /// Create a panel user. A creation conflict (the API's
    /// `UnprocessableEntityHttpException` code) means the user already
    /// exists and is resolved by lookup instead of failing.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        first_name: &str,
        password: &str,
        admin: bool,
    ) -> Result<PanelUser> {
        let url = format!("{}/api/application/users", self.base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&json!({
                "username": username,
                "email": email,
                "first_name": first_name,
                "last_name": "User",
                "password": password,
                "root_admin": admin,
            }))
            .send()
            .await?;

        if resp.status().is_success() {
            let body: Value = resp.json().await?;
            let user: PanelUser = serde_json::from_value(body["attributes"].clone())
                .map_err(|e| BotError::Remote(format!("malformed user response: {}", e)))?;
            tracing::info!("panel user created: {} (id {})", user.username, user.id);
            return Ok(user);
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if body["errors"][0]["code"] == "UnprocessableEntityHttpException" {
            tracing::warn!("panel user '{}' already exists, resolving", username);
            return self
                .find_user_by_username(username)
                .await?
                .ok_or_else(|| BotError::Remote(format!("user '{}' exists but lookup failed", username)));
        }
        Err(BotError::Remote(format!("create user failed: {}", body)))
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<PanelUser>> {
        let url = format!(
            "{}/api/application/users?filter[username]={}",
            self.base, username
        );
        let body: Value = self.get(&url).send().await?.json().await?;
        let Some(first) = body["data"].as_array().and_then(|d| d.first()) else {
            return Ok(None);
        };
        let user = serde_json::from_value(first["attributes"].clone())
            .map_err(|e| BotError::Remote(format!("malformed user response: {}", e)))?;
        Ok(Some(user))
    }

    /// Fetch every page of a paginated listing endpoint. Stops when the
    /// reported total is reached or a page comes back empty.
    async fn fetch_all(&self, endpoint: &str) -> Result<Vec<Value>> {
        let mut page = 1u32;
        let mut results = Vec::new();
        loop {
            let url = format!("{}?page={}&per_page=100", endpoint, page);
            let body: Value = self.get(&url).send().await?.json().await?;
            if let Some(data) = body["data"].as_array() {
                results.extend(data.iter().cloned());
            }
            match next_page(&body, page) {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(results)
    }

    /// First unassigned allocation on any node in the location.
    pub async fn find_available_allocation(&self, location_id: &str) -> Result<Option<Allocation>> {
        let nodes = self
            .fetch_all(&format!("{}/api/application/nodes", self.base))
            .await?;
        for node in nodes {
            let attrs = &node["attributes"];
            if attrs["location_id"].as_u64().map(|v| v.to_string()).as_deref() != Some(location_id)
            {
                continue;
            }
            let node_id = attrs["id"].as_u64().unwrap_or(0);
            let allocations = self
                .fetch_all(&format!(
                    "{}/api/application/nodes/{}/allocations",
                    self.base, node_id
                ))
                .await?;
            for alloc in allocations {
                if alloc["attributes"]["assigned"] == false {
                    let parsed: Allocation =
                        serde_json::from_value(alloc["attributes"].clone()).map_err(|e| {
                            BotError::Remote(format!("malformed allocation: {}", e))
                        })?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    /// Startup command, docker image and environment-variable defaults for
    /// an egg.
    pub async fn egg_template(&self, nest_id: &str, egg_id: &str) -> Result<EggTemplate> {
        let url = format!(
            "{}/api/application/nests/{}/eggs/{}?include=variables",
            self.base, nest_id, egg_id
        );
        let body: Value = self.get(&url).send().await?.json().await?;
        let attrs = &body["attributes"];
        let mut environment = HashMap::new();
        if let Some(vars) = attrs["relationships"]["variables"]["data"].as_array() {
            for v in vars {
                if let Some(name) = v["attributes"]["env_variable"].as_str() {
                    environment.insert(name.to_string(), v["attributes"]["default_value"].clone());
                }
            }
        }
        let docker_image = attrs["docker_image"]
            .as_str()
            .ok_or_else(|| BotError::Remote("egg template missing docker_image".into()))?
            .to_string();
        let startup = attrs["startup"]
            .as_str()
            .ok_or_else(|| BotError::Remote("egg template missing startup".into()))?
            .to_string();
        Ok(EggTemplate {
            docker_image,
            startup,
            environment,
        })
    }

    /// Composite create: user + egg template + free allocation, then the
    /// server itself.
    pub async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let username: String = spec
            .name
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            .collect();
        let email = format!("{}@gmail.com", username);

        let user = self
            .create_user(&username, &email, &spec.name, &spec.password, spec.admin)
            .await?;
        let template = self.egg_template(&self.nest_id, &self.egg_id).await?;
        let allocation = self
            .find_available_allocation(&self.location_id)
            .await?
            .ok_or_else(|| {
                BotError::Remote(format!("no free allocation in location {}", self.location_id))
            })?;

        let payload = json!({
            "name": format!("{}'s Server", spec.name),
            "user": user.id,
            "egg": self.egg_id.parse::<u64>().unwrap_or(0),
            "docker_image": template.docker_image,
            "startup": template.startup,
            "environment": template.environment,
            "limits": {
                "memory": spec.size.memory_mb,
                "swap": 0,
                "disk": spec.size.disk_mb,
                "io": 500,
                "cpu": spec.size.cpu_percent,
            },
            "feature_limits": { "databases": 1, "allocations": 1, "backups": 1 },
            "allocation": { "default": allocation.id },
        });

        let url = format!("{}/api/application/servers", self.base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Remote(format!("create server failed: {}", body)));
        }
        let body: Value = resp.json().await?;
        let attrs = &body["attributes"];
        let identifier = attrs["identifier"]
            .as_str()
            .ok_or_else(|| BotError::Remote("server response missing identifier".into()))?
            .to_string();
        let id = attrs["id"].as_u64().unwrap_or(0);
        tracing::info!("server created: {}", identifier);

        Ok(CreatedServer {
            username,
            password: spec.password.clone(),
            identifier,
            id,
            panel_url: self.base.clone(),
        })
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerSummary>> {
        let raw = self
            .fetch_all(&format!("{}/api/application/servers", self.base))
            .await?;
        let mut servers = Vec::with_capacity(raw.len());
        for item in raw {
            let parsed: ServerSummary = serde_json::from_value(item["attributes"].clone())
                .map_err(|e| BotError::Remote(format!("malformed server entry: {}", e)))?;
            servers.push(parsed);
        }
        Ok(servers)
    }

    pub async fn delete_server(&self, id: u64) -> Result<()> {
        let url = format!("{}/api/application/servers/{}", self.base, id);
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BotError::Remote(format!(
                "delete server {} failed: {}",
                id,
                resp.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for PanelClient {
    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        PanelClient::create_server(self, spec).await
    }

    async fn list_servers(&self) -> Result<Vec<ServerSummary>> {
        PanelClient::list_servers(self).await
    }

    async fn delete_server(&self, id: u64) -> Result<()> {
        PanelClient::delete_server(self, id).await
    }
}

/// Page to fetch after `page`, given one listing response. `None` means
/// the listing is exhausted: the page was empty or malformed, or the
/// reported total was reached. Missing pagination metadata is treated as
/// a single-page listing.
fn next_page(body: &Value, page: u32) -> Option<u32> {
    let data = body["data"].as_array()?;
    if data.is_empty() {
        return None;
    }
    let total_pages = body["meta"]["pagination"]["total_pages"]
        .as_u64()
        .unwrap_or(1);
    if (page as u64) < total_pages {
        Some(page + 1)
    } else {
        None
    }
}
