//! The admin health listener (§4.H): a separate port that always returns `OK`.

use axum::Router;
use axum::routing::get;

pub fn router() -> Router {
    Router::new().route("/", get(|| async { "OK" }))
}
