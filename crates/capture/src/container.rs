//! Container items: a bucket carrying an encoded snapshot under a reserved key.
//!
//! The summary shown on the item is rendered from the same snapshot that was
//! encoded, so what the item says and what it holds cannot disagree.

use sha2::{Digest, Sha256};
use std::fmt;
use vessel_common::merchant_title;
use vessel_kernel::item::BUCKET;
use vessel_kernel::{ItemMeta, ItemStack, TagValue};
use vessel_persist::{DecodeError, DecodedSnapshot, Snapshot, decode_document};

/// Reserved tag holding the transport string.
pub const CONTAINER_KEY: &str = "vessel:merchant_data";

/// Content identity of a container, derived from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Presentation settings applied to every container built.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStyle {
    pub name: String,
    pub custom_model_data: Option<i32>,
}

impl Default for ContainerStyle {
    fn default() -> Self {
        Self {
            name: "Merchant Vessel".into(),
            custom_model_data: Some(1000),
        }
    }
}

/// What an item turned out to be on closer inspection.
#[derive(Debug)]
pub enum ContainerState {
    NotAContainer,
    /// The reserved key is present but its value does not decode.
    Corrupt(DecodeError),
    /// Decodes, but the merchant kind fields were missing.
    Incomplete(DecodedSnapshot),
    Valid(DecodedSnapshot),
}

pub fn build(snapshot: &Snapshot, payload: String, style: &ContainerStyle) -> ItemStack {
    let mut meta = ItemMeta {
        display_name: Some(style.name.clone()),
        lore: summary_lines(snapshot),
        custom_model_data: style.custom_model_data,
        ..ItemMeta::default()
    };
    meta.data
        .insert(CONTAINER_KEY.to_string(), TagValue::String(payload));
    ItemStack::new(BUCKET, 1).with_meta(meta)
}

/// The plain counterpart handed back after a release.
pub fn empty() -> ItemStack {
    ItemStack::new(BUCKET, 1)
}

/// Key presence only. Cheap enough for every interaction.
pub fn is_container(item: &ItemStack) -> bool {
    item.meta.data.contains_key(CONTAINER_KEY)
}

/// A plain bucket that can take a merchant.
pub fn is_empty_container(item: &ItemStack) -> bool {
    item.kind == BUCKET && !item.is_air() && !is_container(item)
}

pub fn payload(item: &ItemStack) -> Option<&str> {
    match item.meta.data.get(CONTAINER_KEY)? {
        TagValue::String(payload) => Some(payload),
        _ => None,
    }
}

/// Identity of whatever sits under the reserved key. A string hashes its
/// bytes; other tag kinds hash a typed form so they still identify the item
/// and are refused later as unreadable.
pub fn fingerprint(item: &ItemStack) -> Option<ContainerId> {
    let mut hasher = Sha256::new();
    match item.meta.data.get(CONTAINER_KEY)? {
        TagValue::String(payload) => hasher.update(payload.as_bytes()),
        TagValue::Bool(value) => {
            hasher.update(b"bool:");
            hasher.update([u8::from(*value)]);
        }
        TagValue::Double(value) => {
            hasher.update(b"double:");
            hasher.update(value.to_bits().to_le_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Some(ContainerId(u64::from_le_bytes(bytes)))
}

pub fn inspect(item: &ItemStack) -> ContainerState {
    if !is_container(item) {
        return ContainerState::NotAContainer;
    }
    let Some(payload) = payload(item) else {
        return ContainerState::Corrupt(DecodeError::Empty);
    };
    match decode_document(payload) {
        Ok(decoded) if decoded.is_complete() => ContainerState::Valid(decoded),
        Ok(decoded) => ContainerState::Incomplete(decoded),
        Err(error) => ContainerState::Corrupt(error),
    }
}

/// A container whose payload decodes and names both merchant kind fields.
/// Decodes the payload; only used on the release path.
pub fn is_valid(item: &ItemStack) -> bool {
    matches!(inspect(item), ContainerState::Valid(_))
}

fn summary_lines(snapshot: &Snapshot) -> Vec<String> {
    let mut lore = vec![
        merchant_title(snapshot.biome_variant, snapshot.variant_kind),
        format!("Type: {}", snapshot.biome_variant.display_name()),
        format!("Profession: {}", snapshot.variant_kind.display_name()),
        format!("Level: {}", snapshot.level),
        format!("Experience: {}", snapshot.experience),
        if snapshot.is_adult { "Adult" } else { "Baby" }.to_string(),
    ];
    if let Some(name) = &snapshot.display_name {
        lore.push(format!("Name: {name}"));
    }
    lore.push(format!("Trades: {}", snapshot.trade_count()));
    lore
}
