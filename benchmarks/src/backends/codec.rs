//! Fixed-width little-endian record layout
//!
//! ```text
//! key i64 | timestamp i64 | bid f64 | ask f64 | bid_size i32 | ask_size i32 | symbol u8 | provider u8
//! ```
//!
//! Symbols and providers are stored as indexes into the generator tables.

use crate::engine::{Record, Tick};
use crate::error::{StorageError, StorageResult};
use crate::generator::{PROVIDERS, SYMBOLS};

/// Encoded size of one record in bytes
pub const RECORD_WIDTH: usize = 8 + 8 + 8 + 8 + 4 + 4 + 1 + 1;

fn table_index(table: &[&str], value: &str, what: &str) -> StorageResult<u8> {
    table
        .iter()
        .position(|entry| *entry == value)
        .map(|index| index as u8)
        .ok_or_else(|| StorageError::engine(format!("Unknown {}: {}", what, value)))
}

pub fn encode(record: &Record, buf: &mut [u8; RECORD_WIDTH]) -> StorageResult<()> {
    let (key, tick) = record;

    buf[0..8].copy_from_slice(&key.to_le_bytes());
    buf[8..16].copy_from_slice(&tick.timestamp.to_le_bytes());
    buf[16..24].copy_from_slice(&tick.bid.to_le_bytes());
    buf[24..32].copy_from_slice(&tick.ask.to_le_bytes());
    buf[32..36].copy_from_slice(&tick.bid_size.to_le_bytes());
    buf[36..40].copy_from_slice(&tick.ask_size.to_le_bytes());
    buf[40] = table_index(SYMBOLS, tick.symbol, "symbol")?;
    buf[41] = table_index(PROVIDERS, tick.provider, "provider")?;

    Ok(())
}

pub fn decode(buf: &[u8; RECORD_WIDTH], location: &str) -> StorageResult<Record> {
    let corrupted = |reason: String| StorageError::Corrupted {
        location: location.to_string(),
        reason,
    };

    let symbol = SYMBOLS
        .get(usize::from(buf[40]))
        .ok_or_else(|| corrupted(format!("symbol index {}", buf[40])))?;
    let provider = PROVIDERS
        .get(usize::from(buf[41]))
        .ok_or_else(|| corrupted(format!("provider index {}", buf[41])))?;

    let key = i64::from_le_bytes(field(buf, 0));
    let tick = Tick {
        symbol,
        timestamp: i64::from_le_bytes(field(buf, 8)),
        bid: f64::from_le_bytes(field(buf, 16)),
        ask: f64::from_le_bytes(field(buf, 24)),
        bid_size: i32::from_le_bytes(field(buf, 32)),
        ask_size: i32::from_le_bytes(field(buf, 36)),
        provider,
    };

    Ok((key, tick))
}

fn field<const N: usize>(buf: &[u8; RECORD_WIDTH], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_record_decodes_to_same_tick() {
        let record = (
            42,
            Tick {
                symbol: "USDJPY",
                timestamp: 1_356_998_400_042,
                bid: 1.23456,
                ask: 1.23470,
                bid_size: 12,
                ask_size: 999,
                provider: "Oanda",
            },
        );

        let mut buf = [0u8; RECORD_WIDTH];
        encode(&record, &mut buf).unwrap();
        assert_eq!(decode(&buf, "test").unwrap(), record);
    }

    #[test]
    fn test_decode_rejects_unknown_table_index() {
        let mut buf = [0u8; RECORD_WIDTH];
        buf[40] = 200;

        let err = decode(&buf, "flow-0").unwrap_err();
        assert!(matches!(err, StorageError::Corrupted { .. }));
        assert!(err.to_string().contains("flow-0"));
    }
}
