use pallas::codec::minicbor;
use pallas::codec::utils::{Int, KeyValuePairs, MaybeIndefArray};
use pallas::ledger::primitives::conway::{BigInt, Constr, PlutusData};

use crate::prelude::*;

/// Owned tree form of a Plutus datum, the shape the order contracts encode
/// their metadata in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Constr { constructor: u64, fields: Vec<Datum> },
    Int(i128),
    Bytes(String),
    List(Vec<Datum>),
    Map(Vec<(Datum, Datum)>),
}

impl Datum {
    pub fn constructor(&self) -> Option<u64> {
        match self {
            Datum::Constr { constructor, .. } => Some(*constructor),
            _ => None,
        }
    }

    pub fn field(&self, index: usize) -> Option<&Datum> {
        match self {
            Datum::Constr { fields, .. } => fields.get(index),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&str> {
        match self {
            Datum::Bytes(hex_repr) => Some(hex_repr),
            _ => None,
        }
    }
}

fn constructor_index(constr: &Constr<PlutusData>) -> Result<u64, Error> {
    match constr.tag {
        121..=127 => Ok(constr.tag - 121),
        1280..=1400 => Ok(constr.tag - 1280 + 7),
        102 => constr
            .any_constructor
            .ok_or_else(|| Error::decode("tag 102 without explicit constructor")),
        tag => Err(Error::decode(format!("invalid cbor with tag {tag}"))),
    }
}

fn big_int_value(value: &BigInt) -> Result<i128, Error> {
    match value {
        BigInt::Int(x) => Ok(i128::from(x.clone())),
        BigInt::BigUInt(bytes) => int_from_bytes(bytes, false),
        BigInt::BigNInt(bytes) => int_from_bytes(bytes, true),
    }
}

fn int_from_bytes(bytes: &[u8], negative: bool) -> Result<i128, Error> {
    if bytes.len() > 15 {
        return Err(Error::decode("big integer out of supported range"));
    }

    let mut out: i128 = 0;
    for byte in bytes {
        out = (out << 8) | *byte as i128;
    }

    if negative {
        out = -1 - out;
    }

    Ok(out)
}

fn from_plutus(data: &PlutusData) -> Result<Datum, Error> {
    let out = match data {
        PlutusData::Constr(x) => Datum::Constr {
            constructor: constructor_index(x)?,
            fields: x
                .fields
                .iter()
                .map(from_plutus)
                .collect::<Result<_, _>>()?,
        },
        PlutusData::BigInt(x) => Datum::Int(big_int_value(x)?),
        PlutusData::BoundedBytes(x) => Datum::Bytes(hex::encode(x.to_vec())),
        PlutusData::Array(x) => Datum::List(x.iter().map(from_plutus).collect::<Result<_, _>>()?),
        PlutusData::Map(x) => Datum::Map(
            x.iter()
                .map(|(k, v)| Ok::<_, Error>((from_plutus(k)?, from_plutus(v)?)))
                .collect::<Result<_, _>>()?,
        ),
    };

    Ok(out)
}

fn to_plutus(datum: &Datum) -> Result<PlutusData, Error> {
    let out = match datum {
        Datum::Constr {
            constructor,
            fields,
        } => {
            let fields = MaybeIndefArray::Def(
                fields.iter().map(to_plutus).collect::<Result<_, _>>()?,
            );

            let (tag, any_constructor) = match *constructor {
                c @ 0..=6 => (121 + c, None),
                c @ 7..=127 => (1280 + (c - 7), None),
                c => (102, Some(c)),
            };

            PlutusData::Constr(Constr {
                tag,
                any_constructor,
                fields,
            })
        }
        Datum::Int(x) => {
            let small = i64::try_from(*x)
                .map_err(|_| Error::decode("integer out of supported cbor range"))?;

            PlutusData::BigInt(BigInt::Int(Int::from(small)))
        }
        Datum::Bytes(x) => {
            let bytes = hex::decode(x).map_err(Error::decode)?;
            PlutusData::BoundedBytes(bytes.into())
        }
        Datum::List(x) => PlutusData::Array(MaybeIndefArray::Def(
            x.iter().map(to_plutus).collect::<Result<_, _>>()?,
        )),
        Datum::Map(x) => PlutusData::Map(KeyValuePairs::Def(
            x.iter()
                .map(|(k, v)| Ok((to_plutus(k)?, to_plutus(v)?)))
                .collect::<Result<Vec<_>, Error>>()?,
        )),
    };

    Ok(out)
}

/// Decodes the binary tagged-union encoding used by script outputs.
pub fn from_cbor(cbor: &[u8]) -> Result<Datum, Error> {
    let data: PlutusData = minicbor::decode(cbor).map_err(Error::decode)?;
    from_plutus(&data)
}

pub fn from_cbor_hex(cbor: &str) -> Result<Datum, Error> {
    let bytes = hex::decode(cbor).map_err(Error::decode)?;
    from_cbor(&bytes)
}

impl Datum {
    pub fn to_cbor(&self) -> Result<Vec<u8>, Error> {
        let data = to_plutus(self)?;
        minicbor::to_vec(&data).map_err(Error::decode)
    }
}

/// Extracts `(pkh, skh)` from a wallet-address node. The stake part is a
/// nested option; constructor 1 means an enterprise wallet.
pub fn wallet_parts(wallet: &Datum) -> Result<(String, String), Error> {
    let pkh = wallet
        .field(0)
        .and_then(|x| x.field(0))
        .and_then(|x| x.as_bytes())
        .ok_or_else(|| Error::decode("missing payment key hash in wallet datum"))?
        .to_string();

    let stake = wallet
        .field(1)
        .ok_or_else(|| Error::decode("missing stake part in wallet datum"))?;

    let skh = stake
        .field(0)
        .and_then(|x| x.field(0))
        .and_then(|x| x.field(0))
        .and_then(|x| x.as_bytes());

    let skh = match skh {
        Some(x) => x.to_string(),
        None if stake.constructor() == Some(1) => String::new(),
        None => return Err(Error::decode("unexpected stake part shape in wallet datum")),
    };

    Ok((pkh, skh))
}

/// Extracts `(sender, recipient)` wallet hex strings from an order datum.
/// Order-book datums carry a single creator wallet nested one level down;
/// liquidity datums carry sender and recipient wallets as the first two
/// fields.
pub fn order_wallets(datum: &Datum, liquidity: bool) -> Result<(String, String), Error> {
    if liquidity {
        let sender = datum
            .field(0)
            .ok_or_else(|| Error::decode("missing sender wallet in liquidity datum"))?;
        let recipient = datum
            .field(1)
            .ok_or_else(|| Error::decode("missing recipient wallet in liquidity datum"))?;

        let (sender_pkh, sender_skh) = wallet_parts(sender)?;
        let (recipient_pkh, recipient_skh) = wallet_parts(recipient)?;

        Ok((
            format!("{sender_pkh}{sender_skh}"),
            format!("{recipient_pkh}{recipient_skh}"),
        ))
    } else {
        let wallet = datum
            .field(0)
            .and_then(|x| x.field(0))
            .ok_or_else(|| Error::decode("missing creator wallet in order datum"))?;

        let (pkh, skh) = wallet_parts(wallet)?;
        let sender = format!("{pkh}{skh}");

        Ok((sender.clone(), sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn constr(constructor: u64, fields: Vec<Datum>) -> Datum {
        Datum::Constr {
            constructor,
            fields,
        }
    }

    /// The standard wallet-address node: payment credential plus an optional
    /// staking credential.
    fn wallet_datum(pkh: &str, skh: Option<&str>) -> Datum {
        let stake = match skh {
            Some(skh) => constr(
                0,
                vec![constr(
                    0,
                    vec![constr(0, vec![Datum::Bytes(skh.to_string())])],
                )],
            ),
            None => constr(1, vec![]),
        };

        constr(
            0,
            vec![
                constr(0, vec![Datum::Bytes(pkh.to_string())]),
                stake,
            ],
        )
    }

    #[test]
    fn decodes_base_constructor_tags() {
        // tag 121, empty array
        let datum = from_cbor(&[0xd8, 0x79, 0x80]).unwrap();
        assert_eq!(datum, constr(0, vec![]));

        // tag 127, [42]
        let datum = from_cbor(&[0xd8, 0x7f, 0x81, 0x18, 0x2a]).unwrap();
        assert_eq!(datum, constr(6, vec![Datum::Int(42)]));
    }

    #[test]
    fn decodes_extended_constructor_tags() {
        // tag 1280 -> constructor 7
        let datum = from_cbor(&[0xd9, 0x05, 0x00, 0x80]).unwrap();
        assert_eq!(datum, constr(7, vec![]));

        // tag 1288 -> constructor 15
        let datum = from_cbor(&[0xd9, 0x05, 0x08, 0x80]).unwrap();
        assert_eq!(datum, constr(15, vec![]));
    }

    #[test]
    fn decodes_explicit_constructor_pair() {
        // tag 102, [200, []]
        let datum = from_cbor(&[0xd8, 0x66, 0x82, 0x18, 0xc8, 0x80]).unwrap();
        assert_eq!(datum, constr(200, vec![]));
    }

    #[test]
    fn rejects_unknown_tags() {
        // tag 99 is not a plutus constructor
        assert!(from_cbor(&[0xd8, 0x63, 0x80]).is_err());
    }

    #[test]
    fn decodes_primitive_nodes() {
        assert_eq!(from_cbor(&[0x18, 0x2a]).unwrap(), Datum::Int(42));
        assert_eq!(from_cbor(&[0x20]).unwrap(), Datum::Int(-1));

        assert_eq!(
            from_cbor(&[0x43, 0x01, 0x02, 0x03]).unwrap(),
            Datum::Bytes("010203".to_string())
        );

        assert_eq!(
            from_cbor(&[0x82, 0x01, 0x02]).unwrap(),
            Datum::List(vec![Datum::Int(1), Datum::Int(2)])
        );

        assert_eq!(
            from_cbor(&[0xa1, 0x01, 0x41, 0xff]).unwrap(),
            Datum::Map(vec![(Datum::Int(1), Datum::Bytes("ff".to_string()))])
        );
    }

    #[test]
    fn wallet_extraction_with_stake_part() {
        let pkh = "aa".repeat(28);
        let skh = "bb".repeat(28);

        let wallet = wallet_datum(&pkh, Some(&skh));
        assert_eq!(wallet_parts(&wallet).unwrap(), (pkh, skh));
    }

    #[test]
    fn wallet_extraction_enterprise() {
        let pkh = "aa".repeat(28);

        let wallet = wallet_datum(&pkh, None);
        assert_eq!(wallet_parts(&wallet).unwrap(), (pkh, String::new()));
    }

    #[test]
    fn order_wallets_from_order_book_datum() {
        let pkh = "aa".repeat(28);
        let skh = "bb".repeat(28);
        let expected = format!("{pkh}{skh}");

        let datum = constr(
            0,
            vec![constr(0, vec![wallet_datum(&pkh, Some(&skh))])],
        );

        let (sender, recipient) = order_wallets(&datum, false).unwrap();
        assert_eq!(sender, expected);
        assert_eq!(recipient, expected);
    }

    #[test]
    fn order_wallets_from_liquidity_datum() {
        let sender_pkh = "aa".repeat(28);
        let recipient_pkh = "cc".repeat(28);

        let datum = constr(
            0,
            vec![
                wallet_datum(&sender_pkh, None),
                wallet_datum(&recipient_pkh, None),
            ],
        );

        let (sender, recipient) = order_wallets(&datum, true).unwrap();
        assert_eq!(sender, sender_pkh);
        assert_eq!(recipient, recipient_pkh);
    }

    fn any_datum() -> impl Strategy<Value = Datum> {
        let leaf = prop_oneof![
            (-1000i128..1000).prop_map(Datum::Int),
            prop::collection::vec(any::<u8>(), 0..8).prop_map(|b| Datum::Bytes(hex::encode(b))),
        ];

        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Datum::List),
                prop::collection::vec((inner.clone(), inner.clone()), 0..3)
                    .prop_map(Datum::Map),
                (0u64..200, prop::collection::vec(inner, 0..4)).prop_map(
                    |(constructor, fields)| Datum::Constr {
                        constructor,
                        fields
                    }
                ),
            ]
        })
    }

    proptest! {
        #[test]
        fn cbor_roundtrip(datum in any_datum()) {
            let cbor = datum.to_cbor().unwrap();
            prop_assert_eq!(from_cbor(&cbor).unwrap(), datum);
        }
    }
}
