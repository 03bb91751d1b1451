use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::prelude::*;

pub const PRICE_UPDATE_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Deserialize)]
struct PriceResponse {
    price: f64,
}

/// Client for the external price oracle. Quotes are opaque; we only cache
/// them per token and refresh after [`PRICE_UPDATE_INTERVAL`].
pub struct PriceOracle {
    http: reqwest::Client,
    endpoint: String,
    cache: HashMap<Token, (f64, Instant)>,
}

impl PriceOracle {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            cache: HashMap::new(),
        }
    }

    /// Latest ADA price of one unit of the given token.
    pub async fn price_in_ada(&mut self, token: &Token) -> Result<f64, Error> {
        if let Some((price, refreshed)) = self.cache.get(token) {
            if refreshed.elapsed() < PRICE_UPDATE_INTERVAL {
                return Ok(*price);
            }
        }

        // base and quote are flipped, that is how the middleware expects them
        let query = [
            ("quote-policy-id", token.policy_id.as_str()),
            ("quote-tokenname", token.name.as_str()),
            ("base-policy-id", ""),
            ("base-tokenname", ""),
        ];

        let resp = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .and_then(|x| x.error_for_status())
            .map_err(|x| Error::OracleUnavailable(x.to_string()))?;

        let resp: PriceResponse = resp
            .json()
            .await
            .map_err(|x| Error::OracleUnavailable(x.to_string()))?;

        debug!(token = %token, price = resp.price, "refreshed token price");

        self.cache
            .insert(token.clone(), (resp.price, Instant::now()));

        Ok(resp.price)
    }
}
