//! Wire format of one individual: a bincode record compressed with zstd.
//!
//! The record carries the id, the generation, the tagged chromosome and the optional
//! tagged fitness value. Every request and response message body is one such record.

use std::io::Read;

use bincode::config::Config;
use thiserror::Error;

use crate::consts::{COMPRESSION_LEVEL, MAX_PAYLOAD_BYTES};
use crate::evolution::Individual;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Corrupt individual payload: {0}")]
    CorruptPayload(String),
    #[error("Failed to encode individual {id}: {reason}")]
    Encode { id: i64, reason: String },
}

fn wire_config() -> impl Config {
    bincode::config::standard().with_limit::<{ MAX_PAYLOAD_BYTES }>()
}

pub fn encode(individual: &Individual) -> Result<Vec<u8>, CodecError> {
    let record =
        bincode::serde::encode_to_vec(individual, wire_config()).map_err(|e| CodecError::Encode {
            id: individual.id,
            reason: e.to_string(),
        })?;
    zstd::stream::encode_all(record.as_slice(), COMPRESSION_LEVEL).map_err(|e| CodecError::Encode {
        id: individual.id,
        reason: e.to_string(),
    })
}

pub fn decode(payload: &[u8]) -> Result<Individual, CodecError> {
    let decoder = zstd::stream::read::Decoder::new(payload)
        .map_err(|e| CodecError::CorruptPayload(format!("decompression failed: {}", e)))?;

    let mut record = Vec::new();
    decoder
        .take(MAX_PAYLOAD_BYTES as u64 + 1)
        .read_to_end(&mut record)
        .map_err(|e| CodecError::CorruptPayload(format!("decompression failed: {}", e)))?;
    if record.len() > MAX_PAYLOAD_BYTES {
        return Err(CodecError::CorruptPayload(format!(
            "record exceeds {} bytes",
            MAX_PAYLOAD_BYTES
        )));
    }

    let (individual, consumed): (Individual, usize) =
        bincode::serde::decode_from_slice(&record, wire_config())
            .map_err(|e| CodecError::CorruptPayload(e.to_string()))?;
    if consumed != record.len() {
        return Err(CodecError::CorruptPayload(format!(
            "{} trailing bytes after the record",
            record.len() - consumed
        )));
    }
    Ok(individual)
}
