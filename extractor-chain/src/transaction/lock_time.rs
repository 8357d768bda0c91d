use std::io;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    block::Height,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// A transaction's nLockTime field.
///
/// Bitcoin overloads this field: values below 500,000,000 are interpreted as
/// a block height below which the transaction is not valid, and values at or
/// above that threshold are interpreted as a Unix timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LockTime {
    Height(Height),
    Time(DateTime<Utc>),
}

/// Transactions with an nLockTime below this value are interpreted as a block height.
const LOCKTIME_THRESHOLD: u32 = 500_000_000;

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        match self {
            LockTime::Height(height) => height.0.bitcoin_serialize(writer),
            LockTime::Time(time) => {
                let time_u32 = (time.timestamp() as u32).max(LOCKTIME_THRESHOLD);
                time_u32.bitcoin_serialize(writer)
            }
        }
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if raw < LOCKTIME_THRESHOLD {
            Ok(LockTime::Height(Height(raw)))
        } else {
            let time = Utc
                .timestamp_opt(raw as i64, 0)
                .single()
                .ok_or(SerializationError::Parse("locktime timestamp out of range"))?;
            Ok(LockTime::Time(time))
        }
    }
}
