//! The chain-sync conversation with an Ogmios endpoint: JSON-RPC over a
//! WebSocket, two verbs (`findIntersection`, `nextBlock`), pipelined
//! requests.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::prelude::*;

pub enum NextBlock {
    Forward(Block),
    Backward(Option<Point>),
}

pub struct OgmiosSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl OgmiosSession {
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|x| Error::client(format!("can't connect to chain-sync on {url}: {x}")))?;

        Ok(Self { ws })
    }

    async fn send(&mut self, payload: Value) -> Result<(), Error> {
        self.ws
            .send(Message::text(payload.to_string()))
            .await
            .map_err(Error::client)
    }

    async fn recv(&mut self) -> Result<Value, Error> {
        loop {
            let msg = self
                .ws
                .next()
                .await
                .ok_or_else(|| Error::client("chain-sync connection closed"))?
                .map_err(Error::client)?;

            match msg {
                Message::Text(text) => return serde_json::from_str(&text).map_err(Error::parse),
                Message::Close(_) => return Err(Error::client("chain-sync connection closed")),
                _ => continue,
            }
        }
    }

    pub async fn find_intersection(&mut self, point: &Point) -> Result<(), Error> {
        debug!(slot = point.slot, hash = %point.id, "finding intersection");

        self.send(json!({
            "jsonrpc": "2.0",
            "method": "findIntersection",
            "params": { "points": [{ "slot": point.slot, "id": point.id }] },
        }))
        .await?;

        let resp = self.recv().await?;
        parse_intersection_response(&resp)
    }

    pub async fn request_next(&mut self) -> Result<(), Error> {
        self.send(json!({ "jsonrpc": "2.0", "method": "nextBlock" }))
            .await
    }

    pub async fn recv_next(&mut self) -> Result<NextBlock, Error> {
        let resp = self.recv().await?;
        parse_next_response(&resp)
    }
}

fn parse_intersection_response(resp: &Value) -> Result<(), Error> {
    if resp.get("error").is_some() {
        return Err(Error::IntersectionNotFound);
    }

    resp.get("result")
        .map(|_| ())
        .ok_or_else(|| Error::parse("malformed findIntersection response"))
}

fn parse_next_response(resp: &Value) -> Result<NextBlock, Error> {
    let result = resp
        .get("result")
        .ok_or_else(|| Error::parse("malformed nextBlock response"))?;

    match result.get("direction").and_then(Value::as_str) {
        Some("forward") => {
            let block = result
                .get("block")
                .ok_or_else(|| Error::parse("forward response without block"))?;

            let block = serde_json::from_value(block.clone()).map_err(Error::parse)?;

            Ok(NextBlock::Forward(block))
        }
        Some("backward") => {
            let point = result
                .get("point")
                .filter(|point| point.is_object())
                .map(|point| serde_json::from_value(point.clone()))
                .transpose()
                .map_err(Error::parse)?;

            Ok(NextBlock::Backward(point))
        }
        _ => Err(Error::parse("nextBlock response without direction")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_accepted() {
        let resp = json!({
            "jsonrpc": "2.0",
            "method": "findIntersection",
            "result": {
                "intersection": { "slot": 100, "id": "aa" },
                "tip": { "slot": 200, "id": "bb", "height": 9 },
            },
        });

        assert!(parse_intersection_response(&resp).is_ok());
    }

    #[test]
    fn intersection_rejected() {
        let resp = json!({
            "jsonrpc": "2.0",
            "method": "findIntersection",
            "error": { "code": 1000, "message": "intersection not found" },
        });

        assert!(matches!(
            parse_intersection_response(&resp),
            Err(Error::IntersectionNotFound)
        ));
    }

    #[test]
    fn next_block_forward() {
        let resp = json!({
            "jsonrpc": "2.0",
            "method": "nextBlock",
            "result": {
                "direction": "forward",
                "tip": { "slot": 200, "id": "bb", "height": 9 },
                "block": {
                    "type": "praos",
                    "slot": 100,
                    "id": "aa",
                    "transactions": [
                        {
                            "id": "cccc",
                            "inputs": [ { "transaction": { "id": "dddd" }, "index": 1 } ],
                            "outputs": [
                                {
                                    "address": "addr1xyz",
                                    "value": { "ada": { "lovelace": 42 } },
                                }
                            ],
                            "fee": { "ada": { "lovelace": 170000 } },
                        }
                    ],
                },
            },
        });

        match parse_next_response(&resp).unwrap() {
            NextBlock::Forward(block) => {
                assert_eq!(block.slot, 100);
                assert_eq!(block.id, "aa");
                assert_eq!(block.transactions.len(), 1);

                let tx = &block.transactions[0];
                assert_eq!(tx.inputs[0].utxo_ref().to_string(), "dddd#1");
                assert_eq!(tx.network_fee(), 170000);
            }
            _ => panic!("expected forward"),
        }
    }

    #[test]
    fn next_block_backward() {
        let resp = json!({
            "jsonrpc": "2.0",
            "method": "nextBlock",
            "result": {
                "direction": "backward",
                "tip": { "slot": 200, "id": "bb", "height": 9 },
                "point": { "slot": 100, "id": "aa" },
            },
        });

        match parse_next_response(&resp).unwrap() {
            NextBlock::Backward(Some(point)) => assert_eq!(point.slot, 100),
            _ => panic!("expected backward"),
        }
    }

    #[test]
    fn next_block_backward_to_origin() {
        let resp = json!({
            "jsonrpc": "2.0",
            "method": "nextBlock",
            "result": { "direction": "backward", "tip": "origin", "point": "origin" },
        });

        assert!(matches!(
            parse_next_response(&resp).unwrap(),
            NextBlock::Backward(None)
        ));
    }
}
