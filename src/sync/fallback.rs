//! HTTP fallback for transaction inputs the store no longer has (they
//! predate the eviction window). The response format follows the public
//! Blockfrost API.

use serde::Deserialize;
use tracing::debug;

use crate::prelude::*;

#[derive(Debug, Deserialize)]
pub struct FallbackUtxos {
    pub inputs: Vec<FallbackInput>,
}

#[derive(Debug, Deserialize)]
pub struct FallbackInput {
    pub tx_hash: String,
    pub output_index: u64,
    pub address: String,
    pub amount: Vec<FallbackAsset>,
}

#[derive(Debug, Deserialize)]
pub struct FallbackAsset {
    pub unit: String,
    pub quantity: String,
}

impl FallbackInput {
    pub fn utxo_ref(&self) -> UtxoRef {
        UtxoRef::new(self.tx_hash.clone(), self.output_index)
    }

    pub fn token_value(&self) -> Result<TokenValue, Error> {
        let mut out = TokenValue::default();

        for asset in self.amount.iter() {
            let amount = asset
                .quantity
                .parse()
                .map_err(|_| Error::parse(format!("invalid asset quantity {}", asset.quantity)))?;

            out.add(Token::from_unit(&asset.unit), amount);
        }

        Ok(out)
    }
}

pub struct FallbackClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: Option<String>,
}

impl FallbackClient {
    pub fn new(endpoint: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            project_id,
        }
    }

    pub async fn transaction_utxos(&self, tx_hash: &str) -> Result<FallbackUtxos, Error> {
        let project_id = self
            .project_id
            .as_deref()
            .ok_or_else(|| Error::FallbackUnavailable("no project id configured".to_string()))?;

        debug!(tx = tx_hash, "fetching tx utxos from fallback api");

        let url = format!("{}/txs/{}/utxos", self.endpoint, tx_hash);

        let resp = self
            .http
            .get(url)
            .header("project_id", project_id)
            .send()
            .await
            .and_then(|x| x.error_for_status())
            .map_err(|x| Error::FallbackUnavailable(x.to_string()))?;

        resp.json()
            .await
            .map_err(|x| Error::FallbackUnavailable(x.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fallback_inputs() {
        let json = serde_json::json!({
            "hash": "bbbb",
            "inputs": [
                {
                    "tx_hash": "dddd",
                    "output_index": 0,
                    "address": "addr1xyz",
                    "amount": [
                        { "unit": "lovelace", "quantity": "3000000" },
                        {
                            "unit": format!("{}4d494c4b", "a".repeat(56)),
                            "quantity": "7"
                        },
                    ],
                }
            ],
            "outputs": [],
        });

        let utxos: FallbackUtxos = serde_json::from_value(json).unwrap();
        assert_eq!(utxos.inputs.len(), 1);

        let input = &utxos.inputs[0];
        assert_eq!(input.utxo_ref().to_string(), "dddd#0");

        let value = input.token_value().unwrap();
        assert_eq!(value.lovelace(), 3_000_000);
        assert_eq!(value.0.get(&Token::new("a".repeat(56), "4d494c4b")), Some(&7));
    }

    #[test]
    fn rejects_malformed_quantity() {
        let input = FallbackInput {
            tx_hash: "dddd".to_string(),
            output_index: 0,
            address: "addr1xyz".to_string(),
            amount: vec![FallbackAsset {
                unit: "lovelace".to_string(),
                quantity: "many".to_string(),
            }],
        };

        assert!(input.token_value().is_err());
    }

    #[tokio::test]
    async fn missing_project_id_is_unavailable() {
        let client = FallbackClient::new("http://localhost:0", None);

        assert!(matches!(
            client.transaction_utxos("bbbb").await,
            Err(Error::FallbackUnavailable(_))
        ));
    }
}
