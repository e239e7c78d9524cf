//! Transport encoding for snapshots.
//!
//! Format: a JSON document (schema v2, snake_case keys) wrapped in padded
//! standard base64 so it can live in any string-valued tag store.
//!
//! Decoding is lenient. Only an unreadable transport layer or a non-object
//! top level is an error; every field-level anomaly falls back to a default.
//! Documents written by the legacy v1 writer (camelCase keys, upper-case enum
//! names, flat capture fields, no `schema` key) decode through the same path.

use crate::model::{
    CaptureMetadata, DEFAULT_DISCOUNT, DEFAULT_MAX_HEALTH, ItemDescriptor, Snapshot, TradeOffer,
    UNKNOWN_SOURCE,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use vessel_common::{Biome, EntityId, Profession};

/// Schema version written by [`encode`].
pub const SCHEMA_VERSION: u32 = 2;
/// Version assumed for documents without a `schema` key.
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,
    #[error("transport encoding is corrupt: {0}")]
    Transport(#[from] base64::DecodeError),
    #[error("payload is not a JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("top level is {0}, expected an object")]
    NotAnObject(&'static str),
}

/// A decoded snapshot plus what the decoder learned about the document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSnapshot {
    pub snapshot: Snapshot,
    pub schema: u32,
    /// Required fields that were absent and filled with defaults.
    pub missing: Vec<&'static str>,
}

impl DecodedSnapshot {
    /// Both merchant kind fields were present in the document.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Serialize)]
struct Document<'a> {
    schema: u32,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

/// Serialize a snapshot into its transport string. Output is deterministic.
pub fn encode(snapshot: &Snapshot) -> Result<String, EncodeError> {
    let json = serde_json::to_vec(&Document {
        schema: SCHEMA_VERSION,
        snapshot,
    })?;
    Ok(STANDARD.encode(json))
}

pub fn decode(payload: &str) -> Result<Snapshot, DecodeError> {
    decode_document(payload).map(|d| d.snapshot)
}

pub fn decode_document(payload: &str) -> Result<DecodedSnapshot, DecodeError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = STANDARD.decode(payload)?;
    let value: Value = serde_json::from_slice(&bytes)?;
    let root = match &value {
        Value::Object(map) => Fields(map),
        other => return Err(DecodeError::NotAnObject(json_kind(other))),
    };

    let schema = root
        .int(&["schema"])
        .map(|v| v.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(LEGACY_SCHEMA_VERSION);
    if schema > SCHEMA_VERSION {
        tracing::debug!(schema, "decoding snapshot from a newer schema");
    }

    let mut missing = Vec::new();
    let variant = root.get(&["variant_kind", "profession"]);
    if variant.is_none() {
        missing.push("variant_kind");
    }
    let biome = root.get(&["biome_variant", "type"]);
    if biome.is_none() {
        missing.push("biome_variant");
    }

    let max_health = root
        .float(&["max_health", "maxHealth"])
        .filter(|m| *m > 0.0)
        .unwrap_or(DEFAULT_MAX_HEALTH);

    let snapshot = Snapshot {
        variant_kind: variant
            .and_then(Value::as_str)
            .map(Profession::parse_or_default)
            .unwrap_or_default(),
        biome_variant: biome
            .and_then(Value::as_str)
            .map(Biome::parse_or_default)
            .unwrap_or_default(),
        level: root
            .int(&["level"])
            .map(|v| v.clamp(0, u8::MAX as i64) as u8)
            .unwrap_or(1),
        experience: root.uint(&["experience"]).unwrap_or(0),
        is_adult: root.boolean(&["is_adult", "adult"]).unwrap_or(true),
        age_ticks: root
            .int(&["age_ticks", "age"])
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(0),
        age_locked: root.boolean(&["age_locked", "ageLock"]).unwrap_or(false),
        health: root.float(&["health"]).unwrap_or(max_health),
        max_health,
        display_name: root.string(&["display_name", "customName"]),
        trade_offers: root
            .array(&["trade_offers", "recipes"])
            .iter()
            .filter_map(|v| v.as_object().map(|m| decode_offer(Fields(m))))
            .collect(),
        capture: decode_capture(root.object(&["capture"]).unwrap_or(root)),
        created_at: root
            .int(&["created_at", "timestamp"])
            .map(|v| v.max(0) as u64)
            .unwrap_or(0),
    }
    .normalized();

    Ok(DecodedSnapshot {
        snapshot,
        schema,
        missing,
    })
}

fn decode_capture(fields: Fields<'_>) -> CaptureMetadata {
    CaptureMetadata {
        captured: fields.boolean(&["captured"]).unwrap_or(false),
        owner: fields
            .string(&["owner"])
            .and_then(|s| EntityId::parse(&s)),
        discount_factor: fields
            .float(&["discount_factor", "customDiscount"])
            .unwrap_or(DEFAULT_DISCOUNT),
        creation_source: fields
            .string(&["creation_source", "creationSource"])
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
    }
}

fn decode_offer(fields: Fields<'_>) -> TradeOffer {
    let input_items = fields
        .array(&["input_items", "ingredients"])
        .iter()
        .filter_map(|v| v.as_object().map(|m| decode_item(Fields(m))))
        .collect();
    let output_item = fields
        .object(&["output_item", "result"])
        .map(decode_item)
        .unwrap_or_else(ItemDescriptor::filler);
    // v1 stored the experience flag under `experienceReward` and the amount
    // under `villagerExperience`; v2 uses `grants_experience`/`experience_reward`.
    let grants_experience = fields
        .boolean(&["grants_experience", "experienceReward"])
        .unwrap_or(true);
    TradeOffer {
        input_items,
        output_item,
        uses: fields.uint(&["uses"]).unwrap_or(0),
        max_uses: fields.uint(&["max_uses", "maxUses"]).unwrap_or(1),
        grants_experience,
        experience_reward: fields
            .uint(&["experience_reward", "villagerExperience"])
            .unwrap_or(0),
        price_multiplier: fields
            .float(&["price_multiplier", "priceMultiplier"])
            .unwrap_or(0.0),
        demand: fields.int32(&["demand"]).unwrap_or(0),
        special_price_delta: fields
            .int32(&["special_price_delta", "specialPrice"])
            .unwrap_or(0),
    }
}

fn decode_item(fields: Fields<'_>) -> ItemDescriptor {
    ItemDescriptor {
        kind: fields
            .string(&["kind", "type"])
            .map(|k| k.trim().to_string())
            .unwrap_or_default(),
        count: fields.uint(&["count", "amount"]).unwrap_or(1),
        display_name: fields.string(&["display_name", "displayName"]),
        lore_lines: fields
            .array(&["lore_lines", "lore"])
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        enchantments: fields.levels(&["enchantments", "enchants"]),
        stored_enchantments: fields.levels(&["stored_enchantments", "storedEnchants"]),
        custom_model_tag: fields
            .int(&["custom_model_tag", "customModelData"])
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
        flags: fields
            .array(&["flags"])
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<BTreeSet<_>>(),
        unbreakable: fields.boolean(&["unbreakable"]).unwrap_or(false),
    }
}

/// Tolerant accessor over a JSON object. Each lookup takes the current key
/// first and any legacy spellings after it; explicit `null` counts as absent.
#[derive(Clone, Copy)]
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn get(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|k| self.0.get(*k))
            .find(|v| !v.is_null())
    }

    fn int(&self, keys: &[&str]) -> Option<i64> {
        match self.get(keys)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
            }
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn uint(&self, keys: &[&str]) -> Option<u32> {
        self.int(keys).map(|v| v.clamp(0, u32::MAX as i64) as u32)
    }

    fn int32(&self, keys: &[&str]) -> Option<i32> {
        self.int(keys)
            .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
    }

    fn float(&self, keys: &[&str]) -> Option<f64> {
        match self.get(keys)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|f| f.is_finite())
    }

    fn boolean(&self, keys: &[&str]) -> Option<bool> {
        match self.get(keys)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|f| f != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn string(&self, keys: &[&str]) -> Option<String> {
        self.get(keys)?.as_str().map(str::to_string)
    }

    fn array(&self, keys: &[&str]) -> &'a [Value] {
        self.get(keys)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn object(&self, keys: &[&str]) -> Option<Fields<'a>> {
        self.get(keys).and_then(Value::as_object).map(Fields)
    }

    fn levels(&self, keys: &[&str]) -> BTreeMap<String, u32> {
        let Some(map) = self.object(keys) else {
            return BTreeMap::new();
        };
        map.0
            .keys()
            .filter_map(|k| map.uint(&[k.as_str()]).map(|lvl| (k.clone(), lvl)))
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
