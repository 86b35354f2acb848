use std::{
    convert::Infallible,
    future::IntoFuture,
    io::{self, ErrorKind},
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{rejection::FormRejection, Form, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use rand::{rngs::StdRng, SeedableRng};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use serde::Deserialize;
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use thermostat_core::{
    command_topics, device_token, link_format, Actuator, CommandAck, CommandError,
    CommandRejection, CommandRequest, ControlConfig, ControlLoop, Device, DeviceState,
    NetworkConfig, NotificationPayload, RuntimeConfig, TemperatureFactors, ThermostatCore,
    TickOutcome, LINK_FORMAT_CONTENT_TYPE, RESOURCE_DISCOVERY, RESOURCE_SET, RESOURCE_STATUS,
    RESOURCE_TEMPERATURE, RESOURCE_TEMPERATURE_OBSERVE, TOPIC_NODE_STATUS,
    TOPIC_NODE_TEMPERATURE,
};

#[derive(Clone)]
struct AppState {
    core: Arc<Mutex<ThermostatCore>>,
    notifications: broadcast::Sender<NotificationPayload>,
    indicators: IndicatorLeds,
    mqtt: Option<AsyncClient>,
}

/// Status LEDs have no hardware on the host; switching them is logged.
#[derive(Debug, Clone, Copy, Default)]
struct IndicatorLeds;

impl Actuator for IndicatorLeds {
    fn signal(&self, device: Device, mode: bool) {
        let led = device.indicator().as_str();
        let level = if mode { "on" } else { "off" };
        info!("indicator {led} {level} ({})", device.as_str());
    }
}

#[derive(Clone)]
struct ConfigStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SetDeviceQuery {
    device: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetDeviceBody {
    mode: Option<String>,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();

    let mut rng = match runtime.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let core = ThermostatCore::seeded(&mut rng, TemperatureFactors::default());
    info!(
        "setting initial random temperature to {} degrees",
        core.temperature()
    );

    let (notifications, _) = broadcast::channel(runtime.control.notification_capacity);
    let mqtt = runtime
        .network
        .mqtt_host
        .clone()
        .map(|host| mqtt_client(&runtime.network, host));

    let app_state = AppState {
        core: Arc::new(Mutex::new(core)),
        notifications,
        indicators: IndicatorLeds,
        mqtt: mqtt.as_ref().map(|(client, _)| client.clone()),
    };

    match mqtt {
        Some((client, eventloop)) => {
            subscribe_topics(&client).await?;
            spawn_mqtt_loop(app_state.clone(), eventloop);
        }
        None => info!("mqtt disabled; set MQTT_HOST to mirror notifications"),
    }

    let control = spawn_control_loop(app_state.clone(), runtime.control.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.network.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind node server at {addr}"))?;

    info!("thermostat node listening on http://{addr}");
    let server = axum::serve(listener, router(app_state)).with_graceful_shutdown(shutdown_signal());
    serve_with_control(server, control).await
}

/// Runs the HTTP server until it stops or the control task exits, whichever
/// comes first. The control task only ends on failure.
async fn serve_with_control<S>(server: S, control: JoinHandle<()>) -> anyhow::Result<()>
where
    S: IntoFuture<Output = io::Result<()>>,
{
    tokio::select! {
        result = server.into_future() => result.context("http server failed"),
        result = control => {
            let err = match result {
                Ok(()) => anyhow::anyhow!("control loop exited"),
                Err(err) => anyhow::Error::new(err).context("control loop task failed"),
            };
            warn!("{err:#}");
            Err(err)
        }
    }
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route(RESOURCE_DISCOVERY, get(handle_discover))
        .route(RESOURCE_STATUS, get(handle_get_status))
        .route(RESOURCE_TEMPERATURE, get(handle_get_temperature))
        .route(RESOURCE_TEMPERATURE_OBSERVE, get(handle_observe_temperature))
        .route(
            RESOURCE_SET,
            post(handle_set_device).put(handle_set_device),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn mqtt_client(network: &NetworkConfig, host: String) -> (AsyncClient, EventLoop) {
    let mut mqtt_options = MqttOptions::new(network.client_id.clone(), host, network.mqtt_port);
    if !network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }
    AsyncClient::new(mqtt_options, 64)
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in command_topics() {
        mqtt.subscribe(topic.as_str(), QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState, config: ControlConfig) -> JoinHandle<()> {
    tokio::spawn(run_control_loop(app_state, config))
}

/// Sleeps until the next trigger is due and dispatches its firings, one at
/// a time, against the core.
async fn run_control_loop(app_state: AppState, config: ControlConfig) {
    let started = Instant::now();
    let mut control = ControlLoop::from_config(&config, 0);

    loop {
        let Some(deadline) = started.checked_add(Duration::from_millis(control.next_due_ms()))
        else {
            warn!("next control deadline is out of range; stopping control loop");
            return;
        };
        tokio::time::sleep_until(deadline).await;
        let now_ms = elapsed_ms(started);

        let outcomes: Vec<TickOutcome> = {
            let mut core = app_state.core.lock().await;
            control
                .poll(now_ms)
                .into_iter()
                .map(|event| core.handle(event))
                .collect()
        };

        for outcome in outcomes {
            match outcome {
                TickOutcome::Simulated(step) => {
                    if step.changed() {
                        info!("updating temperature to {}", step.current);
                    }
                }
                TickOutcome::Notification(payload) => publish_notification(&app_state, payload),
            }
        }
    }
}

fn publish_notification(app_state: &AppState, payload: NotificationPayload) {
    // Sending with no subscribers is not an error.
    let delivered = app_state.notifications.send(payload).unwrap_or(0);
    debug!(
        "notification {} ({} degrees) delivered to {delivered} subscribers",
        payload.sequence, payload.temperature
    );

    let Some(mqtt) = &app_state.mqtt else {
        return;
    };
    match serde_json::to_vec(&payload) {
        Ok(body) => {
            if let Err(err) = mqtt.try_publish(TOPIC_NODE_TEMPERATURE, QoS::AtMostOnce, false, body)
            {
                warn!("temperature notification publish failed: {err}");
            }
        }
        Err(err) => warn!("notification serialization failed: {err}"),
    }
}

fn publish_status(app_state: &AppState, status: DeviceState) {
    let Some(mqtt) = &app_state.mqtt else {
        return;
    };
    match serde_json::to_vec(&status) {
        Ok(body) => {
            if let Err(err) = mqtt.try_publish(TOPIC_NODE_STATUS, QoS::AtLeastOnce, true, body) {
                warn!("status publish failed: {err}");
            }
        }
        Err(err) => warn!("status serialization failed: {err}"),
    }
}

async fn execute_command(
    app_state: &AppState,
    request: CommandRequest,
) -> Result<DeviceState, CommandError> {
    let transition = {
        let mut core = app_state.core.lock().await;
        core.apply(request, &app_state.indicators)?
    };

    let device = transition.device.as_str();
    let mode = if transition.mode { "on" } else { "off" };
    if transition.changed {
        info!("changing {device} to mode {mode}");
    } else {
        debug!("{device} already in mode {mode}");
    }
    publish_status(app_state, transition.state);
    Ok(transition.state)
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let Some(token) = device_token(topic) else {
        return Ok(());
    };

    let result = match CommandRequest::parse(Some(token), Some(message.trim())) {
        Ok(request) => execute_command(app_state, request).await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        warn!("mqtt command on {topic} rejected: {err}");
    }
    Ok(())
}

async fn handle_discover() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, LINK_FORMAT_CONTENT_TYPE)],
        link_format(),
    )
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.core.lock().await.status_payload();
    Json(status)
}

async fn handle_get_temperature(State(state): State<AppState>) -> impl IntoResponse {
    let temperature = state.core.lock().await.temperature_payload();
    Json(temperature)
}

/// Server-sent stream of temperature notifications, one event per
/// notification tick, keyed by sequence number.
async fn handle_observe_temperature(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let notifications = BroadcastStream::new(state.notifications.subscribe());
    let events = notifications.filter_map(|result| match result {
        Ok(payload) => match SseEvent::default()
            .event("temperature")
            .id(payload.sequence.to_string())
            .json_data(payload.data())
        {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                warn!("failed to encode temperature notification: {err}");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!("temperature subscriber lagged, {skipped} notifications dropped");
            None
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn handle_set_device(
    State(state): State<AppState>,
    Query(query): Query<SetDeviceQuery>,
    body: Result<Form<SetDeviceBody>, FormRejection>,
) -> Response {
    let mode = body.ok().and_then(|Form(body)| body.mode);
    let device = query.device.as_deref();

    let result = match CommandRequest::parse(device, mode.as_deref()) {
        Ok(request) => execute_command(&state, request).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(status) => Json(CommandAck::ok(status)).into_response(),
        Err(err) => {
            warn!(
                "error while changing {} to mode {}: {err}",
                device.unwrap_or("<none>"),
                mode.as_deref().unwrap_or("<none>")
            );
            rejection_response(&err)
        }
    }
}

fn rejection_response(err: &CommandError) -> Response {
    (StatusCode::BAD_REQUEST, Json(CommandRejection::new(err))).into_response()
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));

        Self::at(data_dir.join("runtime.json"))
    }

    fn at(runtime_path: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(runtime_path),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("invalid runtime config {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Overrides file settings with environment values; `lookup` is
/// `std::env::var` outside tests. Unparsable numbers are ignored.
fn apply_env_overrides(runtime: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = parsed_value::<u16>(&lookup, "NODE_HTTP_PORT") {
        runtime.network.http_port = port;
    }
    if let Some(host) = lookup("MQTT_HOST") {
        runtime.network.mqtt_host = Some(host);
    }
    if let Some(port) = parsed_value::<u16>(&lookup, "MQTT_PORT") {
        runtime.network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(seed) = parsed_value::<u64>(&lookup, "THERMOSTAT_SEED") {
        runtime.seed = Some(seed);
    }
}

fn parsed_value<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse::<T>().ok())
}

fn elapsed_ms(started: Instant) -> u64 {
    started
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
