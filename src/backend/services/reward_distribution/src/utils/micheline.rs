use blake2::{digest::consts::U32, Blake2b, Digest};
use serde_json::Value;

use crate::utils::errors::{PayoutError, Result};

type Blake2b256 = Blake2b<U32>;

const EXPR_PREFIX: [u8; 4] = [13, 44, 64, 27];
const PACK_TAG: u8 = 0x05;
const BYTES_TAG: u8 = 0x0a;

/// Base58 prefixes of the address kinds the ledger can hold, with their binary tag.
const IMPLICIT_PREFIXES: [([u8; 3], u8); 4] = [
    ([6, 161, 159], 0), // tz1
    ([6, 161, 161], 1), // tz2
    ([6, 161, 164], 2), // tz3
    ([6, 161, 166], 3), // tz4
];
const ORIGINATED_PREFIX: [u8; 3] = [2, 90, 121]; // KT1

/// Helpers for reading Micheline JSON and addressing big-map entries.
pub struct MichelineUtils;

impl MichelineUtils {
    /// Expands a right comb of `Pair` nodes into its components.
    ///
    /// `Pair a (Pair b c)` and `Pair a b c` both yield `[a, b, c]`. Anything
    /// that is not a pair yields itself.
    pub fn flatten_pair(value: &Value) -> Vec<&Value> {
        let mut out = Vec::new();
        let mut current = value;

        loop {
            match pair_args(current).and_then(|args| args.split_last()) {
                Some((last, init)) => {
                    out.extend(init.iter());
                    current = last;
                }
                None => {
                    out.push(current);
                    return out;
                }
            }
        }
    }

    /// Reads a Micheline `{"int": "..."}` literal.
    pub fn int(value: &Value) -> Option<u128> {
        value.get("int")?.as_str()?.parse().ok()
    }

    /// Binary encoding of an implicit (`tz`) or originated (`KT1`) address.
    pub fn encode_address(address: &str) -> Result<Vec<u8>> {
        let decoded = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|_| PayoutError::InvalidAddress(address.to_string()))?;

        if decoded.len() != 23 {
            return Err(PayoutError::InvalidAddress(address.to_string()));
        }
        let (prefix, hash) = decoded.split_at(3);

        if prefix == ORIGINATED_PREFIX {
            let mut out = Vec::with_capacity(22);
            out.push(0x01);
            out.extend_from_slice(hash);
            out.push(0x00);
            return Ok(out);
        }

        let tag = IMPLICIT_PREFIXES
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, tag)| *tag)
            .ok_or_else(|| PayoutError::InvalidAddress(address.to_string()))?;

        let mut out = Vec::with_capacity(22);
        out.push(0x00);
        out.push(tag);
        out.extend_from_slice(hash);
        Ok(out)
    }

    /// Packs an address the way `PACK` does for a value of type `address`.
    pub fn pack_address(address: &str) -> Result<Vec<u8>> {
        let encoded = Self::encode_address(address)?;

        let mut packed = Vec::with_capacity(encoded.len() + 6);
        packed.push(PACK_TAG);
        packed.push(BYTES_TAG);
        packed.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        packed.extend_from_slice(&encoded);
        Ok(packed)
    }

    /// Script expression hash (`expr...`) used as the big-map key for an address.
    pub fn script_expr_hash(address: &str) -> Result<String> {
        let packed = Self::pack_address(address)?;
        let digest = Blake2b256::digest(&packed);

        let mut payload = Vec::with_capacity(EXPR_PREFIX.len() + digest.len());
        payload.extend_from_slice(&EXPR_PREFIX);
        payload.extend_from_slice(&digest);

        Ok(bs58::encode(payload).with_check().into_string())
    }
}

fn pair_args(value: &Value) -> Option<&Vec<Value>> {
    if value.get("prim")?.as_str()? != "Pair" {
        return None;
    }
    value.get("args")?.as_array()
}
