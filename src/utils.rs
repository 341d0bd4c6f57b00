//! Identifier minting helpers

use bech32::Bech32m;
use uuid7::uuid7;

// mint a fresh entity id: uuid7 payload behind a bech32m human-readable prefix
pub fn new_bech32_id(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}
