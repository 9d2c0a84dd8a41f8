//! Wires the shared response cache into the three services.

use std::sync::Arc;

use crate::artifacts::Locator;
use crate::cache::{CachePaths, CheckoutSync};
use crate::config::Config;
use crate::github::GitHubApi;
use crate::http::{ResponseCache, Transport, UreqTransport};
use crate::resolver::Resolver;

pub struct App {
    pub config: Config,
    pub checkouts: CheckoutSync,
    pub resolver: Resolver,
    pub locator: Locator,
}

impl App {
    pub fn new(config: Config) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: Config, transport: impl Transport + 'static) -> Self {
        let cache = Arc::new(ResponseCache::new(transport).with_logged_base(&config.api_base));
        let api = Arc::new(GitHubApi::new(cache, &config.api_base));

        let checkouts = CheckoutSync::new(CachePaths::new(&config.root), Arc::clone(&api))
            .with_remote_base(&config.remote_base)
            .with_max_age(config.max_age);
        let resolver = Resolver::new(Arc::clone(&api));
        let locator = Locator::new(api, config.ci.clone());

        Self {
            config,
            checkouts,
            resolver,
            locator,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.config.token()
    }
}
