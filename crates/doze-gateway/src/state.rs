//! Shared state for one listen-address's handler chain.

use std::sync::Arc;

use doze::route::RouteTable;
use doze::store::InstanceStore;

#[derive(Clone)]
pub struct ListenerState {
    /// The `listen_address` key this listener was built for, e.g. `:80`.
    pub listen_address: Arc<str>,
    pub routes: Arc<RouteTable>,
    pub store: Arc<InstanceStore>,
    pub secret_key: Arc<str>,
    pub client: reqwest::Client,
}

impl ListenerState {
    pub fn new(
        listen_address: impl Into<Arc<str>>,
        routes: Arc<RouteTable>,
        store: Arc<InstanceStore>,
        secret_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            listen_address: listen_address.into(),
            routes,
            store,
            secret_key: secret_key.into(),
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("reqwest client builds with default TLS backend"),
        }
    }
}
