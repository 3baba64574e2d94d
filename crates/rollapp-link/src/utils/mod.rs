// Utility functions and helpers

use crate::error::LinkError;

/// Normalise a transaction hash to the upper-case hex form CometBFT indexes.
///
/// Accepts an optional `0x`/`0X` prefix. The result must decode to 32 bytes.
pub fn normalize_tx_hash(tx_hash: &str) -> Result<String, LinkError> {
    let trimmed = tx_hash.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let bytes = hex::decode(stripped)
        .map_err(|e| LinkError::InvalidInput(format!("tx hash '{}' is not hex: {}", tx_hash, e)))?;
    if bytes.len() != 32 {
        return Err(LinkError::InvalidInput(format!(
            "tx hash '{}' has {} bytes, expected 32",
            tx_hash,
            bytes.len()
        )));
    }

    Ok(hex::encode_upper(bytes))
}

/// Human-readable prefix of a bech32 account address (`dym1...` -> `dym`).
pub fn address_prefix(address: &str) -> Result<String, LinkError> {
    let (hrp, _data, _variant) = bech32::decode(address)
        .map_err(|e| LinkError::InvalidInput(format!("'{}' is not a bech32 address: {}", address, e)))?;
    Ok(hrp)
}
