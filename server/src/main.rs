//! check-relay: HTTP front end for the check-run relay
//!
//! Lightweight hyper server on a single-threaded tokio runtime (the core's
//! async traits are !Send). Each connection runs on its own local task.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use check_relay_core::allow_list::{client_addr, AllowList};
use check_relay_core::config::Config;
use check_relay_core::error::{ApiError, ErrorResponse, Result};
use check_relay_core::github::api::GitHubApi;
use check_relay_core::github::auth::{AppCredentialBroker, PemJwtSigner};
use check_relay_core::relay::check_run::{self, CheckRunRequest, RepoPath};

mod platform;
mod routes;

use platform::{ProcessEnv, ReqwestHttpClient, SystemClock};
use routes::Route;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 100 * 1024;

/// Shared application state
struct AppState {
    config: Config,
    http: ReqwestHttpClient,
    clock: SystemClock,
    signer: PemJwtSigner,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let local = tokio::task::LocalSet::new();
    if let Err(e) = local.run_until(run()).await {
        error!(error = %e, "check-relay failed to start");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> Result<()> {
    let config = Config::from_env(&ProcessEnv)?;
    let http = ReqwestHttpClient::new(config.upstream_timeout_secs.map(Duration::from_secs))?;
    let signer = PemJwtSigner::from_identity(&config.identity);

    info!(
        app_id = %config.identity.app_id,
        allow_list_entries = config.allow_list.len(),
        trusted_proxies = ?config.trusted_proxies.as_ref().map(AllowList::len),
        api_base = %config.api_base,
        "configuration loaded"
    );

    let port = config.port;
    let state = Rc::new(AppState {
        config,
        http,
        clock: SystemClock,
        signer,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| ApiError::config(format!("failed to bind port {}: {}", port, e)))?;

    info!(port, "check-relay listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };

        let state = Rc::clone(&state);
        tokio::task::spawn_local(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = Rc::clone(&state);
                async move { handle_request(req, peer, &state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(error = %e, %peer, "connection error");
            }
        });
    }
}

type HyperResponse = Response<Full<Bytes>>;

async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: &AppState,
) -> std::result::Result<HyperResponse, Infallible> {
    let route = routes::resolve(req.method(), req.uri().path());

    let response = match route {
        Route::Health => json_response(StatusCode::OK, &serde_json::json!({"status": "pass"})),
        Route::Webhook => empty_response(StatusCode::OK),
        Route::CheckRuns(path) => match handle_check_run(req, peer, path, state).await {
            Ok(status) => status_response(status),
            Err(e) => error_response(&e),
        },
        Route::NotFound => {
            json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "not_found"}))
        }
    };

    Ok(response)
}

async fn handle_check_run(
    req: Request<Incoming>,
    peer: SocketAddr,
    path: RepoPath,
    state: &AppState,
) -> Result<u16> {
    let request = accept_check_run(req, peer, &state.config).await?;

    let broker = AppCredentialBroker::new(
        &state.signer,
        &state.http,
        &state.clock,
        &state.config.api_base,
    );
    let github = GitHubApi::new(&state.http, &state.config.api_base);

    check_run::handle(&request, &path, &broker, &github).await
}

/// Gate the caller, then read and decode the body
async fn accept_check_run<B>(
    req: Request<B>,
    peer: SocketAddr,
    config: &Config,
) -> Result<CheckRunRequest>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    authorize_caller(
        req.headers(),
        peer,
        &config.allow_list,
        config.trusted_proxies.as_ref(),
    )?;

    let body = read_body(req.into_body()).await?;
    serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_request(format!("invalid JSON body: {}", e)))
}

/// Allow-list gate; runs before the body is read
fn authorize_caller(
    headers: &HeaderMap,
    peer: SocketAddr,
    allow_list: &AllowList,
    trusted_proxies: Option<&AllowList>,
) -> Result<()> {
    let x_real_ip = headers.get("x-real-ip").and_then(|v| v.to_str().ok());

    let permitted = client_addr(x_real_ip, peer.ip(), trusted_proxies)
        .is_some_and(|addr| allow_list.permits(addr));
    if !permitted {
        warn!(%peer, x_real_ip = ?x_real_ip, "caller not in allow list");
        return Err(ApiError::access_denied("caller address is not allowed"));
    }

    Ok(())
}

async fn read_body<B>(body: B) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ApiError::PayloadTooLarge)
        }
        Err(_) => Err(ApiError::invalid_request("failed to read body")),
    }
}

/// Relayed upstream status, with its reason phrase as the body
fn status_response(status: u16) -> HyperResponse {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let reason = status.canonical_reason().unwrap_or_default();

    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(reason)))
        .unwrap_or_else(|_| fallback_response())
}

/// Errors with a status are relayed; the rest are reported and answered generically
fn error_response(err: &ApiError) -> HyperResponse {
    match err.status_code() {
        Some(status) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            json_response(status, &ErrorResponse::from(err))
        }
        None => {
            error!(error = %err, kind = err.error_key(), "unhandled error");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorResponse::unclassified(),
            )
        }
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    let json = serde_json::to_vec(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| fallback_response())
}

fn empty_response(status: StatusCode) -> HyperResponse {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| fallback_response())
}

fn fallback_response() -> HyperResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
