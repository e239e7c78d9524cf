//! Persistence: the merchant snapshot model and its transport codec.
//!
//! # Invariants
//! - `decode(encode(s)) == s` for every normalized snapshot `s`.
//! - Decoding never fails on field-level anomalies or older schema versions;
//!   only corrupt transport encoding or a non-object document is an error.

pub mod codec;
pub mod model;

pub use codec::{
    DecodeError, DecodedSnapshot, EncodeError, LEGACY_SCHEMA_VERSION, SCHEMA_VERSION, decode,
    decode_document, encode,
};
pub use model::{CaptureMetadata, ItemDescriptor, Snapshot, TradeOffer, clamp_health};
