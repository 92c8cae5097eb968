//! Docker volume-plugin protocol
//!
//! Docker posts JSON to `/Plugin.Activate` and `/VolumeDriver.*`; every
//! reply carries an `Err` field that is empty on success. Failed calls are
//! answered with status 500 and the error text in `Err`.

use crate::api::RequestContext;
use crate::core::{parse_capacity, Orchestrator, VolumeConfig, VolumeExternal};
use crate::error::{Error, Result};
use axum::{
    extract::{Json, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Operator hint appended to startup failures
const BOOTSTRAP_HINT: &str = "use 'journalctl -fu docker' to learn more";

/// Content type Docker expects on plugin replies
const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    #[serde(default, alias = "Options")]
    pub opts: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    #[serde(default, rename = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerVolume {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ErrResponse {
    err: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetResponse {
    volume: DockerVolume,
    err: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListResponse {
    volumes: Vec<DockerVolume>,
    err: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MountpointResponse {
    mountpoint: String,
    err: String,
}

// =============================================================================
// Volume Options
// =============================================================================

/// Translate `docker volume create -o` options into a volume request
pub fn volume_config(name: &str, options: &BTreeMap<String, String>) -> Result<VolumeConfig> {
    let mut config = VolumeConfig::new(name);
    for (key, value) in options {
        match key.as_str() {
            "size" => config.size = parse_capacity(value)?,
            "from" => config.clone_source_volume = value.clone(),
            "fromSnapshot" => config.clone_source_snapshot = value.clone(),
            "exportPolicy" => config.export_policy = value.clone(),
            "unixPermissions" => config.unix_permissions = value.clone(),
            "snapshotDir" => {
                config.snapshot_directory = value
                    .parse()
                    .map_err(|_| Error::InvalidArgument(format!("snapshotDir must be true or false, got {}", value)))?
            }
            other => return Err(Error::InvalidArgument(format!("unknown volume option: {}", other))),
        }
    }
    if !config.clone_source_snapshot.is_empty() && !config.is_clone() {
        return Err(Error::InvalidArgument("fromSnapshot requires from".into()));
    }
    Ok(config)
}

// =============================================================================
// Plugin
// =============================================================================

/// Docker volume plugin over an [`Orchestrator`]
#[derive(Clone)]
pub struct DockerPlugin {
    orchestrator: Arc<dyn Orchestrator>,
    volume_root: PathBuf,
    request_timeout: Duration,
}

impl DockerPlugin {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, volume_root: impl Into<PathBuf>, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            volume_root: volume_root.into(),
            request_timeout,
        }
    }

    /// Make sure the mount root exists and is a directory
    pub async fn prepare(&self) -> Result<()> {
        match fs::metadata(&self.volume_root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Configuration(format!(
                    "volume root {} exists and is not a directory",
                    self.volume_root.display()
                )))
            }
            Err(_) => fs::create_dir_all(&self.volume_root).await?,
        }
        info!(volume_root = %self.volume_root.display(), "Initialized Docker frontend");
        Ok(())
    }

    /// Build the plugin router
    pub fn router(self) -> Router {
        Router::new()
            .route("/Plugin.Activate", post(activate))
            .route("/VolumeDriver.Create", post(create))
            .route("/VolumeDriver.Remove", post(remove))
            .route("/VolumeDriver.Get", post(get))
            .route("/VolumeDriver.List", post(list))
            .route("/VolumeDriver.Path", post(path))
            .route("/VolumeDriver.Mount", post(mount))
            .route("/VolumeDriver.Unmount", post(unmount))
            .route("/VolumeDriver.Capabilities", post(capabilities))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }

    fn mountpoint(&self, volume: &VolumeExternal) -> PathBuf {
        self.volume_root.join(&volume.config.internal_name)
    }

    /// Mountpoint if it exists on the host
    async fn existing_path(&self, volume: &VolumeExternal) -> Option<PathBuf> {
        let mountpoint = self.mountpoint(volume);
        debug!(
            name = %volume.config.name,
            internal_name = %volume.config.internal_name,
            mountpoint = %mountpoint.display(),
            "Getting path for volume"
        );
        fs::metadata(&mountpoint).await.ok().map(|_| mountpoint)
    }
}

/// Serve the plugin on `addr` until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    plugin: DockerPlugin,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Docker volume plugin listening");

    axum::serve(listener, plugin.router())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// =============================================================================
// Replies
// =============================================================================

fn reply<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(PLUGIN_CONTENT_TYPE));
    response
}

fn ok<T: Serialize>(body: T) -> Response {
    reply(StatusCode::OK, body)
}

/// Render an error the way Docker shows it to the user
fn docker_error(method: &str, err: &Error) -> Response {
    error!(method, error = %err, "Docker frontend method returning error");
    let message = if err.is_bootstrap() {
        format!("{}: {}", err, BOOTSTRAP_HINT)
    } else {
        err.to_string()
    };
    reply(StatusCode::INTERNAL_SERVER_ERROR, ErrResponse { err: message })
}

// =============================================================================
// Handlers
// =============================================================================

async fn activate() -> Response {
    info!("Activating Docker frontend");
    ok(json!({ "Implements": ["VolumeDriver"] }))
}

async fn create(State(plugin): State<DockerPlugin>, Json(request): Json<CreateRequest>) -> Response {
    let options = request.opts.unwrap_or_default();
    debug!(method = "Create", name = %request.name, ?options, "Docker frontend method is invoked");

    let config = match volume_config(&request.name, &options) {
        Ok(config) => config,
        Err(e) => return docker_error("Create", &e),
    };

    let ctx = plugin.context();
    let result = if config.is_clone() {
        plugin.orchestrator.clone_volume(&ctx, config).await
    } else {
        plugin.orchestrator.add_volume(&ctx, config).await
    };

    match result {
        Ok(_) => ok(ErrResponse::default()),
        Err(e) if e.is_already_exists() => {
            debug!(name = %request.name, "Volume already exists");
            ok(ErrResponse::default())
        }
        Err(e) => docker_error("Create", &e),
    }
}

async fn remove(State(plugin): State<DockerPlugin>, Json(request): Json<NameRequest>) -> Response {
    debug!(method = "Remove", name = %request.name, "Docker frontend method is invoked");

    match plugin.orchestrator.delete_volume(&plugin.context(), &request.name).await {
        Ok(()) => ok(ErrResponse::default()),
        Err(e) => {
            warn!(volume = %request.name, error = %e, "Could not delete volume");
            docker_error("Remove", &e)
        }
    }
}

async fn get(State(plugin): State<DockerPlugin>, Json(request): Json<NameRequest>) -> Response {
    debug!(method = "Get", name = %request.name, "Docker frontend method is invoked");

    let ctx = plugin.context();
    let result = async {
        // Get opens every `docker volume` workflow except List and Unmount
        plugin.orchestrator.reload_volumes(&ctx).await?;
        let volume = plugin.orchestrator.get_volume(&ctx, &request.name).await?;
        let snapshots = plugin
            .orchestrator
            .list_volume_snapshots(&ctx, &request.name)
            .await?;

        let mountpoint = plugin
            .existing_path(&volume)
            .await
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let mut status = BTreeMap::new();
        status.insert("Snapshots".to_string(), serde_json::to_value(snapshots)?);

        Ok::<_, Error>(DockerVolume {
            name: volume.config.name,
            mountpoint,
            status,
        })
    }
    .await;

    match result {
        Ok(volume) => ok(GetResponse {
            volume,
            err: String::new(),
        }),
        Err(e) => docker_error("Get", &e),
    }
}

async fn list(State(plugin): State<DockerPlugin>) -> Response {
    debug!(method = "List", "Docker frontend method is invoked");

    let ctx = plugin.context();
    let result = async {
        plugin.orchestrator.reload_volumes(&ctx).await?;
        plugin.orchestrator.list_volumes(&ctx).await
    }
    .await;

    match result {
        Ok(volumes) => ok(ListResponse {
            volumes: volumes
                .into_iter()
                .map(|v| DockerVolume {
                    name: v.config.name,
                    ..Default::default()
                })
                .collect(),
            err: String::new(),
        }),
        Err(e) => docker_error("List", &e),
    }
}

async fn path(State(plugin): State<DockerPlugin>, Json(request): Json<NameRequest>) -> Response {
    debug!(method = "Path", name = %request.name, "Docker frontend method is invoked");

    let volume = match plugin.orchestrator.get_volume(&plugin.context(), &request.name).await {
        Ok(volume) => volume,
        Err(e) => return docker_error("Path", &e),
    };

    match plugin.existing_path(&volume).await {
        Some(mountpoint) => ok(MountpointResponse {
            mountpoint: mountpoint.display().to_string(),
            err: String::new(),
        }),
        None => docker_error(
            "Path",
            &Error::not_found("mountpoint", plugin.mountpoint(&volume).display().to_string()),
        ),
    }
}

async fn mount(State(plugin): State<DockerPlugin>, Json(request): Json<MountRequest>) -> Response {
    debug!(method = "Mount", name = %request.name, id = %request.id, "Docker frontend method is invoked");

    let ctx = plugin.context();
    let volume = match plugin.orchestrator.get_volume(&ctx, &request.name).await {
        Ok(volume) => volume,
        Err(e) => return docker_error("Mount", &e),
    };

    let mountpoint = plugin.mountpoint(&volume);
    if let Err(e) = plugin
        .orchestrator
        .attach_volume(&ctx, &request.name, &mountpoint, &BTreeMap::new())
        .await
    {
        error!(volume = %request.name, mountpoint = %mountpoint.display(), error = %e, "Error attaching volume");
        return docker_error("Mount", &e);
    }

    ok(MountpointResponse {
        mountpoint: mountpoint.display().to_string(),
        err: String::new(),
    })
}

async fn unmount(State(plugin): State<DockerPlugin>, Json(request): Json<MountRequest>) -> Response {
    debug!(method = "Unmount", name = %request.name, id = %request.id, "Docker frontend method is invoked");

    let ctx = plugin.context();
    let volume = match plugin.orchestrator.get_volume(&ctx, &request.name).await {
        Ok(volume) => volume,
        Err(e) => return docker_error("Unmount", &e),
    };

    let mountpoint = plugin.mountpoint(&volume);
    match plugin
        .orchestrator
        .detach_volume(&ctx, &request.name, &mountpoint)
        .await
    {
        Ok(()) => ok(ErrResponse::default()),
        Err(e) => {
            error!(volume = %request.name, mountpoint = %mountpoint.display(), error = %e, "Error detaching volume");
            docker_error("Unmount", &e)
        }
    }
}

async fn capabilities() -> Response {
    debug!(method = "Capabilities", "Docker frontend method is invoked");
    ok(json!({ "Capabilities": { "Scope": "global" } }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{test_options, zapi_backend, FakeArray};
    use crate::core::mount::testing::RecordingMounter;
    use crate::core::{BackendOrchestrator, OrchestratorConfig};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Harness {
        array: Arc<FakeArray>,
        orchestrator: Arc<BackendOrchestrator>,
        mounter: Arc<RecordingMounter>,
        root: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let array = FakeArray::new();
        let mounter = Arc::new(RecordingMounter::default());
        let orchestrator = BackendOrchestrator::new(
            Arc::new(zapi_backend(&array, test_options(100))),
            OrchestratorConfig {
                data_lif: "10.0.0.2".into(),
                ..Default::default()
            },
            mounter.clone(),
        );
        orchestrator.bootstrap(&RequestContext::background()).await.unwrap();
        Harness {
            array,
            orchestrator,
            mounter,
            root: tempfile::tempdir().unwrap(),
        }
    }

    impl Harness {
        fn router(&self) -> Router {
            DockerPlugin::new(self.orchestrator.clone(), self.root.path(), Duration::from_secs(5)).router()
        }

        async fn call(&self, uri: &str, body: Value) -> (StatusCode, Value) {
            let response = self
                .router()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header("content-type", "application/vnd.docker.plugins.v1.2+json")
                        .body(Body::from(body.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }
    }

    #[test]
    fn test_volume_config_options() {
        let mut options = BTreeMap::new();
        options.insert("size".to_string(), "2Gi".to_string());
        options.insert("snapshotDir".to_string(), "true".to_string());
        let config = volume_config("vol", &options).unwrap();
        assert_eq!(config.size, 2 << 30);
        assert!(config.snapshot_directory);
        assert!(!config.is_clone());

        options.insert("fromSnapshot".to_string(), "snap1".to_string());
        assert!(volume_config("vol", &options).is_err());
        options.insert("from".to_string(), "src".to_string());
        assert!(volume_config("vol", &options).unwrap().is_clone());

        options.insert("color".to_string(), "blue".to_string());
        assert!(matches!(volume_config("vol", &options), Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_activate_and_capabilities() {
        let h = harness().await;
        let (status, body) = h.call("/Plugin.Activate", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Implements"], json!(["VolumeDriver"]));

        let (_, body) = h.call("/VolumeDriver.Capabilities", json!({})).await;
        assert_eq!(body["Capabilities"]["Scope"], "global");
    }

    #[tokio::test]
    async fn test_create_list_remove() {
        let h = harness().await;
        let (status, body) = h
            .call("/VolumeDriver.Create", json!({ "Name": "web-data", "Opts": { "size": "3Gi" } }))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["Err"], "");
        assert!(h.array.has_volume("trident_web_data"));

        let (status, _) = h.call("/VolumeDriver.Create", json!({ "Name": "web-data" })).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = h.call("/VolumeDriver.List", json!({})).await;
        assert_eq!(body["Volumes"], json!([{ "Name": "web-data" }]));

        let (status, _) = h.call("/VolumeDriver.Remove", json!({ "Name": "web-data" })).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!h.array.has_volume("trident_web_data"));

        let (status, body) = h.call("/VolumeDriver.Remove", json!({ "Name": "web-data" })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["Err"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_size() {
        let h = harness().await;
        let (status, body) = h
            .call("/VolumeDriver.Create", json!({ "Name": "v", "Opts": { "size": "lots" } }))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["Err"].as_str().unwrap().contains("Capacity parse error"));
        assert!(!h.array.has_volume("trident_v"));
    }

    #[tokio::test]
    async fn test_create_from_clones() {
        let h = harness().await;
        h.call("/VolumeDriver.Create", json!({ "Name": "base" })).await;
        let (status, body) = h
            .call("/VolumeDriver.Create", json!({ "Name": "copy", "Opts": { "from": "base" } }))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(h.array.has_volume("trident_copy"));
    }

    #[tokio::test]
    async fn test_get_reports_snapshots_and_mountpoint() {
        let h = harness().await;
        h.call("/VolumeDriver.Create", json!({ "Name": "base" })).await;
        h.call("/VolumeDriver.Create", json!({ "Name": "copy", "Opts": { "from": "base" } }))
            .await;

        let (status, body) = h.call("/VolumeDriver.Get", json!({ "Name": "base" })).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["Volume"]["Name"], "base");
        assert_eq!(body["Volume"]["Status"]["Snapshots"].as_array().unwrap().len(), 1);
        assert!(body["Volume"].get("Mountpoint").is_none());

        let (status, _) = h.call("/VolumeDriver.Get", json!({ "Name": "ghost" })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_mount_path_unmount() {
        let h = harness().await;
        h.call("/VolumeDriver.Create", json!({ "Name": "app" })).await;

        let (status, body) = h.call("/VolumeDriver.Path", json!({ "Name": "app" })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{}", body);

        let (status, body) = h
            .call("/VolumeDriver.Mount", json!({ "Name": "app", "ID": "c0ffee" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let expected = h.root.path().join("trident_app");
        assert_eq!(body["Mountpoint"], expected.display().to_string());
        assert_eq!(h.mounter.export_at(&expected), Some("10.0.0.2:/trident_app".to_string()));

        std::fs::create_dir_all(&expected).unwrap();
        let (_, body) = h.call("/VolumeDriver.Path", json!({ "Name": "app" })).await;
        assert_eq!(body["Mountpoint"], expected.display().to_string());

        let (status, _) = h
            .call("/VolumeDriver.Unmount", json!({ "Name": "app", "ID": "c0ffee" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.mounter.export_at(&expected), None);
    }

    #[tokio::test]
    async fn test_bootstrap_failure_carries_operator_hint() {
        let h = harness().await;
        h.orchestrator
            .set_bootstrap_error(&Error::Bootstrap("array at 10.0.0.1 unreachable".into()));

        let (status, body) = h.call("/VolumeDriver.List", json!({})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["Err"].as_str().unwrap();
        assert!(message.contains("array at 10.0.0.1 unreachable"), "{}", message);
        assert!(message.ends_with(BOOTSTRAP_HINT), "{}", message);

        let (_, body) = h.call("/VolumeDriver.Create", json!({ "Name": "x" })).await;
        assert!(body["Err"].as_str().unwrap().ends_with(BOOTSTRAP_HINT));
    }

    #[tokio::test]
    async fn test_prepare_rejects_file_root() {
        let h = harness().await;
        let file = h.root.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let plugin = DockerPlugin::new(h.orchestrator.clone(), &file, Duration::from_secs(1));
        assert_matches::assert_matches!(plugin.prepare().await, Err(Error::Configuration(_)));

        let plugin = DockerPlugin::new(h.orchestrator.clone(), h.root.path().join("fresh"), Duration::from_secs(1));
        plugin.prepare().await.unwrap();
        assert!(h.root.path().join("fresh").is_dir());
    }
}
