//! The proxy pipeline (§4.F): `basicAuth → wakeupGate → reverseProxyDirector`,
//! implemented as one fallback handler per listen-address.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Host, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use doze::instance::ComputeInstance;
use doze::lifecycle::LifecycleState;
use doze::route::RouteDescriptor;

use crate::error::GatewayError;
use crate::state::ListenerState;
use crate::waiting_page::{self, WaitingPage};

const SECRET_HEADER: &str = "X-Go-Sleep-Key";
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const AUTH_REALM: &str = "go-sleep";

pub async fn pipeline(
    State(state): State<ListenerState>,
    Host(host): Host,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let hostname = host.split(':').next().unwrap_or(&host).to_string();
    if hostname.is_empty() {
        return GatewayError::MissingHost.into_response();
    }

    let Some(route) = state.routes.lookup(&state.listen_address, &hostname) else {
        return GatewayError::RouteNotFound.into_response();
    };

    if let Some(verifier) = &route.auth_verifier {
        match parse_basic_auth(&headers) {
            Some((user, pass)) if verifier.verify(&user, &pass) => {}
            _ => return unauthorized_response(),
        }
    }

    let Some(instance) = state.store.get(&route.instance_key) else {
        return GatewayError::InstanceMissing.into_response();
    };

    if route.pass_through {
        let address = instance.snapshot().address;
        return forward(&state, route, &address, method, uri, headers, body).await;
    }

    let snapshot = instance.snapshot();

    if let Some(error) = snapshot.last_error {
        return waiting_page::render(
            &headers,
            StatusCode::OK,
            WaitingPage::new(format!("instance {} is in an error state", instance.key())).with_error_text(error),
        );
    }

    match snapshot.status {
        LifecycleState::Running => {
            if snapshot.http_healthy {
                instance.record_access();
                forward(&state, route, &snapshot.address, method, uri, headers, body).await
            } else {
                probe_then_forward(&state, &instance, route, &snapshot.address, method, uri, headers, body).await
            }
        }
        LifecycleState::NotRun => {
            if instance.sleep_after().start_on_request_allowed() {
                instance.request_start();
                waiting_page::render(
                    &headers,
                    StatusCode::OK,
                    WaitingPage::new("We sent a request to start the instance"),
                )
            } else {
                waiting_page::render(
                    &headers,
                    StatusCode::OK,
                    WaitingPage::new("Start on request is disabled for this instance"),
                )
            }
        }
        LifecycleState::Starting => waiting_page::render(
            &headers,
            StatusCode::OK,
            WaitingPage::new("Waiting for the server to come up").with_start_request(snapshot.start_request),
        ),
        LifecycleState::Stopping => waiting_page::render(
            &headers,
            StatusCode::OK,
            WaitingPage::new("The instance has stopped and will launch again on the next request"),
        ),
        LifecycleState::Error => {
            instance.request_start();
            waiting_page::render(&headers, StatusCode::OK, WaitingPage::new("The instance failed to start, retrying"))
        }
        LifecycleState::NotAvailable => waiting_page::render(
            &headers,
            StatusCode::OK,
            WaitingPage::new("The instance's provider could not be reached, retrying"),
        ),
    }
}

async fn probe_then_forward(
    state: &ListenerState,
    instance: &ComputeInstance,
    route: &RouteDescriptor,
    address: &str,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let probe_url = format!("http://{}:{}/", address, route.backend_port);
    let probe = state
        .client
        .head(probe_url)
        .timeout(HEALTH_PROBE_TIMEOUT)
        .send()
        .await;

    match probe {
        Ok(resp) if resp.status().as_u16() < 500 => {
            instance.mark_http_healthy();
            instance.record_access();
            forward(state, route, address, method, uri, headers, body).await
        }
        _ => waiting_page::render(
            &headers,
            StatusCode::OK,
            WaitingPage::new("The instance is running but not yet answering requests"),
        ),
    }
}

async fn forward(
    state: &ListenerState,
    route: &RouteDescriptor,
    address: &str,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
    body: Bytes,
) -> Response {
    let original_host = headers
        .get(header::HOST)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let upstream_url = format!("http://{}:{}{}", address, route.backend_port, path_and_query);

    headers.remove(header::HOST);
    headers.insert(header::HOST, original_host);
    if let Ok(secret) = HeaderValue::from_str(&state.secret_key) {
        headers.insert(HeaderName::from_bytes(SECRET_HEADER.as_bytes()).expect("static header name"), secret);
    }

    let upstream_request = state.client.request(method, upstream_url).headers(headers).body(body);

    match upstream_request.send().await {
        Ok(upstream_response) => translate_response(upstream_response).await,
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            WaitingPage::error(format!("upstream request failed: {e}")),
        )
            .into_response(),
    }
}

async fn translate_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    let body = match upstream.bytes().await {
        Ok(b) => b,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                WaitingPage::error(format!("failed to read upstream body: {e}")),
            )
                .into_response();
        }
    };

    let mut response = Response::builder().status(status);
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        response = response.header(name, value);
    }
    response.body(axum::body::Body::from(body)).unwrap_or_else(|_| {
        (StatusCode::BAD_GATEWAY, WaitingPage::error("malformed upstream response")).into_response()
    })
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection" | "keep-alive" | "transfer-encoding" | "upgrade" | "proxy-authenticate" | "proxy-authorization" | "te" | "trailer"
    )
}

fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64_decode(encoded)?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input).ok()
}

fn unauthorized_response() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        WaitingPage::error("authentication required"),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_str(&format!("Basic realm=\"{AUTH_REALM}\"")).unwrap(),
    );
    response
}
