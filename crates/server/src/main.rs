use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::protocol::{RawTransferRequest, ServerNotice};
use sheets::GoogleSheets;
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracker::PivotalTracker;
use transfer::{run_transfer, TransferContext};
use url::Url;

mod config;

use config::load_settings;

#[derive(Clone)]
struct AppState {
    ctx: TransferContext,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;

    let ctx = TransferContext {
        tracker: Arc::new(PivotalTracker::new(
            http.clone(),
            Url::parse(&settings.tracker_base_url)?,
        )),
        sheets: Arc::new(GoogleSheets::new(
            http,
            Url::parse(&settings.sheets_api_base)?,
            Url::parse(&settings.oauth_token_url)?,
        )),
    };
    let app = build_router(Arc::new(AppState { ctx }), &settings.static_dir);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "http server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    info!("connection established");
    let (mut sender, mut receiver) = socket.split();

    if sender
        .send(Message::Text(ServerNotice::Ready.to_string()))
        .await
        .is_err()
    {
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(frame)) => {
                if handle_transfer_frame(&state, &frame, &mut sender)
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "websocket error");
                break;
            }
        }
    }

    info!("connection closed");
}

/// One inbound frame is one transfer. Malformed frames are answered
/// with a single error text before any collaborator is contacted; a
/// valid request is acknowledged, then the pipeline runs with its
/// notices forwarded in emission order, ending in a terminal message.
async fn handle_transfer_frame(
    state: &Arc<AppState>,
    frame: &str,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Result<(), axum::Error> {
    let parsed = serde_json::from_str::<RawTransferRequest>(frame)
        .map_err(|error| format!("Malformed transfer request: {error}"))
        .and_then(|raw| {
            raw.validate()
                .map_err(|error| format!("Malformed transfer request: {error}"))
        });
    let request = match parsed {
        Ok(request) => request,
        Err(message) => {
            warn!(%message, "rejected transfer request");
            return sender
                .send(Message::Text(ServerNotice::Failed { message }.to_string()))
                .await;
        }
    };

    sender
        .send(Message::Text(ServerNotice::Preparing.to_string()))
        .await?;

    let (notices_tx, mut notices_rx) = mpsc::unbounded_channel();
    let ctx = state.ctx.clone();
    let transfer_task =
        tokio::spawn(async move { run_transfer(&ctx, &request, &notices_tx).await });

    while let Some(notice) = notices_rx.recv().await {
        sender.send(Message::Text(notice.to_string())).await?;
    }

    let terminal = match transfer_task.await {
        Ok(Ok(())) => ServerNotice::Completed,
        Ok(Err(failure)) => {
            error!(%failure, "transfer failed");
            ServerNotice::Failed {
                message: failure.to_string(),
            }
        }
        Err(join_error) => {
            error!(%join_error, "transfer task aborted");
            ServerNotice::Failed {
                message: "transfer aborted unexpectedly".into(),
            }
        }
    };
    sender.send(Message::Text(terminal.to_string())).await
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
