use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use charloom_engine::config::GenerationSettings;
use charloom_engine::{
    GenerationRequest, Generator, Outcome, OutputSink, RequestError, RequestId, SamplingConfig,
    SessionState, Settings, Temperature, load_generator,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// charloom text generation server
#[derive(Parser, Debug)]
#[command(name = "charloom-server")]
#[command(about = "Character-level text generation server", long_about = None)]
struct Args {
    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// ONNX model file (overrides config)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Vocabulary JSON file (overrides config)
    #[arg(long)]
    vocab: Option<PathBuf>,

    /// Settings file merged on top of the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// What the page shows: the text of the most recently started request.
#[derive(Debug, Clone, Serialize)]
struct Display {
    request_id: RequestId,
    state: SessionState,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Display {
    fn idle() -> Self {
        Self {
            request_id: 0,
            state: SessionState::Idle,
            text: String::new(),
            error: None,
        }
    }
}

#[derive(Clone)]
struct AppState {
    generator: Generator,
    display: Arc<RwLock<Display>>,
    defaults: GenerationSettings,
}

/// Body of `POST /api/generate`.
///
/// Count and temperature arrive as whatever the client typed, so they are
/// kept as raw JSON and validated by [`build_request`].
#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    prompt: String,
    /// Characters to generate (uses the configured default if not specified)
    #[serde(default)]
    num_chars: Option<Value>,
    /// Softmax temperature; unusable values mean 1.0
    #[serde(default)]
    temperature: Option<Value>,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    request_id: RequestId,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct VocabResponse {
    size: usize,
    chars: String,
}

/// Publishes into the shared display while this request is the displayed one.
struct DisplaySink {
    request_id: RequestId,
    display: Arc<RwLock<Display>>,
}

impl OutputSink for DisplaySink {
    fn publish(&mut self, text: &str) {
        let mut display = self.display.write().expect("lock poisoned");
        if display.request_id == self.request_id {
            display.text.clear();
            display.text.push_str(text);
        }
    }
}

/// Put a freshly started request on display.
///
/// Returns `false` when a newer request got there first.
fn show_started(display: &RwLock<Display>, request_id: RequestId, prompt: &str) -> bool {
    let mut display = display.write().expect("lock poisoned");
    if display.request_id >= request_id {
        return false;
    }
    *display = Display {
        request_id,
        state: SessionState::Running,
        text: prompt.to_string(),
        error: None,
    };
    true
}

/// Record how a session ended, unless a newer request owns the display.
fn finish(display: &RwLock<Display>, request_id: RequestId, outcome: &Outcome) {
    let mut display = display.write().expect("lock poisoned");
    if display.request_id != request_id {
        return;
    }
    display.state = outcome.state();
    display.text = outcome.text().to_string();
    display.error = outcome.error().map(|e| e.to_string());
}

/// Integer counts and numeric strings are accepted. Anything else counts as
/// zero, which validation rejects.
fn char_count(value: Option<&Value>, default: usize) -> i64 {
    match value {
        None | Some(Value::Null) => i64::try_from(default).unwrap_or(i64::MAX),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(_) => 0,
    }
}

fn temperature(value: Option<&Value>, default: f32) -> Temperature {
    match value {
        None | Some(Value::Null) => Temperature::or_default(Some(default)),
        Some(Value::Number(n)) => Temperature::or_default(n.as_f64().map(|t| t as f32)),
        Some(Value::String(s)) => Temperature::parse(s),
        Some(_) => Temperature::DEFAULT,
    }
}

fn build_request(
    req: &GenerateRequest,
    defaults: &GenerationSettings,
) -> std::result::Result<GenerationRequest, RequestError> {
    let num_chars = char_count(req.num_chars.as_ref(), defaults.num_chars);
    let sampling = SamplingConfig {
        temperature: temperature(req.temperature.as_ref(), defaults.temperature),
        seed: req.seed.or(defaults.seed),
    };
    GenerationRequest::new(req.prompt.clone(), num_chars, sampling)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    // Default: info level, with --verbose: debug level
    let default_filter = if args.verbose {
        "charloom_server=debug,charloom_engine=debug,tower_http=debug"
    } else {
        "charloom_server=info,charloom_engine=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Settings::load()?,
    };
    if let Some(model) = args.model {
        settings.model.path = model;
    }
    if let Some(vocab) = args.vocab {
        settings.model.vocab = vocab;
    }

    tracing::info!(
        "Loading model from {} (vocabulary {})...",
        settings.model.path.display(),
        settings.model.vocab.display()
    );
    let generator = load_generator(&settings).context("failed to load model")?;
    tracing::info!(
        "Model ready: {} characters, hidden state {:?}",
        generator.vocab().len(),
        generator.signature().initial_state().shape()
    );

    let state = AppState {
        generator,
        display: Arc::new(RwLock::new(Display::idle())),
        defaults: settings.generation.clone(),
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(index))
        .route("/api/generate", post(generate_handler))
        .route("/api/cancel", post(cancel_handler))
        .route("/api/output", get(output_handler))
        .route("/api/vocab", get(vocab_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB
        .layer(cors)
        .with_state(state);

    // Start server
    let host = args.host.unwrap_or(settings.server.host);
    let port = args.port.unwrap_or(settings.server.port);
    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "charloom"
    }))
}

async fn vocab_handler(State(state): State<AppState>) -> Json<VocabResponse> {
    let vocab = state.generator.vocab();
    Json(VocabResponse {
        size: vocab.len(),
        chars: vocab.chars().into_iter().collect(),
    })
}

async fn output_handler(State(state): State<AppState>) -> Json<Display> {
    let display = state.display.read().expect("lock poisoned");
    Json(display.clone())
}

async fn cancel_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.generator.controller().cancel();
    StatusCode::OK
}

/// Start a new generation; the running one (if any) is superseded.
async fn generate_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request = build_request(&req, &state.defaults).map_err(|e| {
        tracing::debug!("Rejected generation request: {}", e);
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let session = state.generator.start(request);
    let request_id = session.id();
    if !show_started(&state.display, request_id, session.request().prompt()) {
        tracing::debug!("Generation #{} superseded before it was shown", request_id);
    }

    let display = Arc::clone(&state.display);
    tokio::spawn(async move {
        let mut sink = DisplaySink {
            request_id,
            display: Arc::clone(&display),
        };
        let outcome = session.run(&mut sink).await;
        finish(&display, request_id, &outcome);
    });

    Ok(Json(GenerateResponse { request_id }))
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>charloom</title>
<style>
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body {
    font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif;
    background: #f5f5f5; color: #333; padding: 2rem;
    max-width: 900px; margin: 0 auto;
  }
  h1 { font-size: 1.5rem; margin-bottom: 1rem; }
  h1 span { color: #888; font-weight: normal; font-size: 0.9rem; }
  .controls { display: flex; gap: 0.5rem; margin-bottom: 1rem; flex-wrap: wrap; }
  textarea, input {
    padding: 0.6rem 1rem; border: 2px solid #ddd; border-radius: 8px;
    font-size: 1rem; outline: none;
  }
  textarea { width: 100%; min-height: 4rem; margin-bottom: 0.5rem; }
  textarea:focus, input:focus { border-color: #4a90d9; }
  input[type="number"] { width: 9rem; }
  button {
    padding: 0.6rem 1.2rem; border: none; background: #4a90d9; color: #fff;
    border-radius: 8px; cursor: pointer; font-size: 1rem;
  }
  #status { color: #888; font-size: 0.85rem; margin-bottom: 0.5rem; }
  #output {
    white-space: pre-wrap; background: #fff; border-radius: 8px;
    padding: 1rem; min-height: 8rem; font-family: ui-monospace, monospace;
  }
</style>
</head>
<body>
<h1>charloom <span>character-level generation</span></h1>
<textarea id="prompt" placeholder="Prompt"></textarea>
<div class="controls">
  <input id="numChars" type="number" value="200" title="Characters to generate">
  <input id="temperature" type="number" step="0.1" value="1.0" title="Temperature">
  <button id="generate">Generate</button>
</div>
<div id="status"></div>
<div id="output"></div>
<script>
const output = document.getElementById("output");
const status = document.getElementById("status");
let shownId = 0;

document.getElementById("generate").addEventListener("click", async () => {
  const body = {
    prompt: document.getElementById("prompt").value,
    num_chars: parseInt(document.getElementById("numChars").value) || 0,
  };
  const t = parseFloat(document.getElementById("temperature").value);
  if (!Number.isNaN(t)) body.temperature = t;

  const res = await fetch("/api/generate", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify(body),
  });
  const data = await res.json();
  if (!res.ok) {
    output.innerText = data.error;
    shownId = -1;
    return;
  }
  shownId = data.request_id;
});

async function poll() {
  try {
    const res = await fetch("/api/output");
    const data = await res.json();
    if (shownId !== -1 && data.request_id >= shownId) {
      output.innerText = data.text;
      status.innerText = data.request_id ? `#${data.request_id} ${data.state}` : "";
      if (data.error) status.innerText += `: ${data.error}`;
    }
  } catch (e) {
    status.innerText = "server unreachable";
  }
  setTimeout(poll, 100);
}
poll();
</script>
</body>
</html>
"##;
