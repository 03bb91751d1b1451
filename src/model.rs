use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::str::FromStr;

/// The slot of a block (a.k.a. block index)
pub type BlockSlot = u64;

/// Lowercase hex rendering of a block hash
pub type BlockHash = String;

/// Lowercase hex rendering of a tx hash
pub type TxHash = String;

/// Surrogate id of a persisted batch transaction
pub type TxId = u64;

/// Surrogate id of a batcher entity
pub type BatcherId = u64;

const SHELLEY_KNOWN_SLOT: u64 = 4924800;
const SHELLEY_KNOWN_TIME: u64 = 1596491091;

/// Wall-clock UNIX timestamp for a mainnet slot (1 slot = 1 second).
pub fn slot_timestamp(slot: BlockSlot) -> u64 {
    SHELLEY_KNOWN_TIME + (slot - SHELLEY_KNOWN_SLOT)
}

pub fn timestamp_slot(timestamp: u64) -> BlockSlot {
    (timestamp - SHELLEY_KNOWN_TIME) + SHELLEY_KNOWN_SLOT
}

/// Reference to a tx output, rendered as `txhash#index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoRef {
    pub tx: TxHash,
    pub index: u64,
}

impl UtxoRef {
    pub fn new(tx: impl Into<TxHash>, index: u64) -> Self {
        Self {
            tx: tx.into(),
            index,
        }
    }
}

impl Display for UtxoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.tx, self.index)
    }
}

impl FromStr for UtxoRef {
    type Err = crate::prelude::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx, index) = s
            .rsplit_once('#')
            .ok_or_else(|| crate::prelude::Error::parse(format!("invalid utxo ref {s}")))?;

        let index = index
            .parse()
            .map_err(|_| crate::prelude::Error::parse(format!("invalid utxo index in {s}")))?;

        Ok(Self::new(tx, index))
    }
}

/// A native asset class. The empty pair is the native coin (lovelace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token {
    pub policy_id: String,
    pub name: String,
}

impl Token {
    pub fn lovelace() -> Self {
        Self {
            policy_id: String::new(),
            name: String::new(),
        }
    }

    pub fn is_lovelace(&self) -> bool {
        self.policy_id.is_empty() && self.name.is_empty()
    }

    pub fn new(policy_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            name: name.into(),
        }
    }

    /// Parses the concatenated `policyId || assetName` hex form used by the
    /// fallback API, split at the 56-char policy id boundary.
    pub fn from_unit(unit: &str) -> Self {
        if unit.len() > 56 {
            let unit = unit.replace('.', "");
            Self::new(&unit[..56], &unit[56..])
        } else if unit == "lovelace" || unit.is_empty() || unit == "." {
            Self::lovelace()
        } else {
            Self::new(unit, "")
        }
    }

    /// The `policy.name` rendering sent to the outside.
    pub fn to_hex(&self) -> String {
        format!("{}.{}", self.policy_id, self.name)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_lovelace() {
            write!(f, "lovelace")
        } else {
            write!(f, "{}.{}", self.policy_id, self.name)
        }
    }
}

/// A multi-asset value, normalized as token -> amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValue(pub BTreeMap<Token, u64>);

impl TokenValue {
    pub fn add(&mut self, token: Token, amount: u64) {
        if amount > 0 {
            *self.0.entry(token).or_default() += amount;
        }
    }

    pub fn merge(&mut self, other: &TokenValue) {
        for (token, amount) in other.0.iter() {
            self.add(token.clone(), *amount);
        }
    }

    pub fn lovelace(&self) -> u64 {
        self.0.get(&Token::lovelace()).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Token, &u64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Signed per-token difference between two values, zero entries dropped.
pub fn value_diff(outgoing: &TokenValue, incoming: &TokenValue) -> BTreeMap<Token, i64> {
    let mut diff: BTreeMap<Token, i64> = BTreeMap::new();

    for (token, amount) in outgoing.iter() {
        diff.insert(token.clone(), *amount as i64);
    }

    for (token, amount) in incoming.iter() {
        *diff.entry(token.clone()).or_default() -= *amount as i64;
    }

    diff.retain(|_, amount| *amount != 0);

    diff
}

// ------------------------------------------------------------------------
// stored rows
// ------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRow {
    pub owner: String,
    pub value: TokenValue,
    pub created_slot: BlockSlot,
    pub spent_slot: Option<BlockSlot>,
    pub block_hash: BlockHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRow {
    /// Concatenated `pkh || skh` hex of the wallet refunded on cancel
    pub sender: String,

    /// Concatenated `pkh || skh` hex of the wallet paid on fulfillment
    pub recipient: String,

    pub placed_slot: BlockSlot,

    /// Surrogate id of the consuming batch tx; `None` while the order is open
    pub transaction_id: Option<TxId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRow {
    pub tx_hash: TxHash,
    pub slot: BlockSlot,
    pub batcher_id: Option<BatcherId>,
    pub ada_profit: i64,
    pub network_fee: i64,
    pub equivalent_ada: i64,
    pub net_assets: BTreeMap<String, i64>,
    pub order_ids: Vec<String>,
}

// ------------------------------------------------------------------------
// chain-sync wire shapes
// ------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub slot: BlockSlot,
    pub id: BlockHash,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub slot: BlockSlot,
    pub id: BlockHash,
    #[serde(default)]
    pub transactions: Vec<Tx>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tx {
    pub id: TxHash,
    #[serde(default)]
    pub inputs: Vec<TxInput>,
    #[serde(default)]
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub datums: HashMap<String, String>,
    pub fee: Option<Fee>,
}

impl Tx {
    pub fn network_fee(&self) -> i64 {
        self.fee
            .as_ref()
            .map(|x| x.ada.lovelace as i64)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fee {
    pub ada: CoinAmount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinAmount {
    pub lovelace: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxInput {
    pub transaction: TxPointer,
    pub index: u64,
}

impl TxInput {
    pub fn utxo_ref(&self) -> UtxoRef {
        UtxoRef::new(self.transaction.id.clone(), self.index)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxPointer {
    pub id: TxHash,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub value: OgmiosValue,
    pub datum: Option<String>,
    #[serde(rename = "datumHash")]
    pub datum_hash: Option<String>,
}

/// The `{policyId -> {assetName -> amount}}` shape of chain-sync values,
/// with the `ada/lovelace` pair denoting the native coin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OgmiosValue(pub HashMap<String, HashMap<String, u64>>);

impl From<&OgmiosValue> for TokenValue {
    fn from(value: &OgmiosValue) -> Self {
        let mut out = TokenValue::default();

        for (policy_id, assets) in value.0.iter() {
            for (name, amount) in assets.iter() {
                let token = if policy_id == "ada" && name == "lovelace" {
                    Token::lovelace()
                } else {
                    Token::new(policy_id.clone(), name.clone())
                };

                out.add(token, *amount);
            }
        }

        out
    }
}

#[derive(Debug, Clone)]
pub enum PullEvent {
    RollForward(Block),

    /// The store was truncated to the given point; downstream caches must be
    /// rebuilt before further blocks arrive.
    Reset(Point),
}
