use pallas::crypto::hash::Hash;
use pallas::ledger::addresses::{
    Address, Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart,
};

use crate::prelude::*;

fn key_hash(hex_repr: &str) -> Result<Hash<28>, Error> {
    let bytes = hex::decode(hex_repr).map_err(Error::parse)?;

    let bytes: [u8; 28] = bytes
        .try_into()
        .map_err(|_| Error::parse(format!("invalid key hash length in {hex_repr}")))?;

    Ok(Hash::new(bytes))
}

/// Canonical bech32 form of an address given in raw hex.
pub fn bech32_from_hex(hex_repr: &str) -> Result<String, Error> {
    let bytes = hex::decode(hex_repr).map_err(Error::parse)?;
    let address = Address::from_bytes(&bytes).map_err(Error::parse)?;

    address.to_bech32().map_err(Error::parse)
}

/// Raw hex form of a bech32 address.
pub fn hex_from_bech32(bech32: &str) -> Result<String, Error> {
    let address = Address::from_bech32(bech32).map_err(Error::parse)?;

    Ok(hex::encode(address.to_vec()))
}

/// Builds the mainnet bech32 address for a wallet given as payment and
/// (possibly empty) stake key hashes.
pub fn wallet_bech32(pkh: &str, skh: &str) -> Result<String, Error> {
    let payment = ShelleyPaymentPart::Key(key_hash(pkh)?);

    let delegation = if skh.is_empty() {
        ShelleyDelegationPart::Null
    } else {
        ShelleyDelegationPart::Key(key_hash(skh)?)
    };

    let address = ShelleyAddress::new(Network::Mainnet, payment, delegation);

    address.to_bech32().map_err(Error::parse)
}

/// Same as [`wallet_bech32`] but over the concatenated `pkh || skh` form
/// stored in order rows.
pub fn wallet_bech32_concat(concat: &str) -> Result<String, Error> {
    if concat.len() < 56 {
        return Err(Error::parse(format!("wallet hex too short: {concat}")));
    }

    wallet_bech32(&concat[..56], &concat[56..])
}

/// Hex of the payment credential of a bech32 address, when it has one.
pub fn payment_hash(bech32: &str) -> Option<String> {
    match Address::from_bech32(bech32) {
        Ok(Address::Shelley(x)) => Some(hex::encode(x.payment().as_hash())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // a Shelley address with both payment and stake parts
    const BASE_VECTOR: &str =
        "addr1q9dhugez3ka82k2kgh7r2lg0j7aztr8uell46kydfwu3vk6n8w2cdu8mn2ha278q6q25a9rc6gmpfeekavuargcd32vsvxhl7e";

    // a Shelley address with only payment part
    const ENTERPRISE_VECTOR: &str = "addr1vx2fxv2umyhttkxyxp8x0dlpdt3k6cwng5pxj3jhsydzers66hrl8";

    #[test]
    fn hex_bech32_roundtrip() {
        for vector in [BASE_VECTOR, ENTERPRISE_VECTOR] {
            let hex_repr = hex_from_bech32(vector).unwrap();
            assert_eq!(bech32_from_hex(&hex_repr).unwrap(), vector);
        }
    }

    #[test]
    fn wallet_from_parts_matches_decoded() {
        let hex_repr = hex_from_bech32(BASE_VECTOR).unwrap();

        // skip the header byte, then payment and stake hashes
        let pkh = &hex_repr[2..58];
        let skh = &hex_repr[58..];

        assert_eq!(wallet_bech32(pkh, skh).unwrap(), BASE_VECTOR);
        assert_eq!(
            wallet_bech32_concat(&hex_repr[2..]).unwrap(),
            BASE_VECTOR
        );
    }

    #[test]
    fn enterprise_wallet_has_no_stake_part() {
        let hex_repr = hex_from_bech32(ENTERPRISE_VECTOR).unwrap();
        let pkh = &hex_repr[2..58];

        assert_eq!(wallet_bech32(pkh, "").unwrap(), ENTERPRISE_VECTOR);
    }

    #[test]
    fn payment_hash_of_base_address() {
        let hex_repr = hex_from_bech32(BASE_VECTOR).unwrap();
        let payment = payment_hash(BASE_VECTOR).unwrap();

        assert_eq!(payment, hex_repr[2..58]);
    }

    #[test]
    fn payment_hash_rejects_garbage() {
        assert!(payment_hash("not-an-address").is_none());
    }
}
