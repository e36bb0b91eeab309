//! Positional IDs for synthetic test entities: `"<prefix>:<index>"`.

use vigil_core::{Result, VigilError};

pub const TEST_ENTITY_PREFIX: &str = "test-entity";

pub fn encode_test_entity_id(index: usize) -> String {
    format!("{}:{}", TEST_ENTITY_PREFIX, index)
}

/// Recover the test index from an engine result ID.
///
/// Anything that is not exactly `"<prefix>:<decimal index>"` is a contract
/// violation; there is no fallback index.
pub fn decode_test_entity_id(id: &str) -> Result<usize> {
    let (prefix, index) = id.split_once(':').ok_or_else(|| {
        VigilError::EngineContract(format!("result ID '{}' has no index separator", id))
    })?;
    if prefix != TEST_ENTITY_PREFIX {
        return Err(VigilError::EngineContract(format!(
            "result ID '{}' has unexpected prefix '{}'",
            id, prefix
        )));
    }
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VigilError::EngineContract(format!(
            "result ID '{}' has a non-numeric index",
            id
        )));
    }
    index.parse::<usize>().map_err(|e| {
        VigilError::EngineContract(format!("result ID '{}' index does not fit: {}", id, e))
    })
}
