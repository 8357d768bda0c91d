//! Known-good raw wire bytes for use in round-trip tests.

/// A single-input, single-output, non-SegWit transaction, 85 bytes once
/// serialized. Spends an arbitrary (non-coinbase) outpoint to a standard
/// P2PKH output.
#[rustfmt::skip]
pub const DUMMY_TX1: &[u8] = &[
    // version = 1
    0x01, 0x00, 0x00, 0x00,
    // input count = 1
    0x01,
        // previous output: 32-byte txid, output index 0
        0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
        0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
        0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
        0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
        0x00, 0x00, 0x00, 0x00,
        // scriptSig length = 0 (unsigned)
        0x00,
        // sequence
        0xff, 0xff, 0xff, 0xff,
    // output count = 1
    0x01,
        // value = 5_000_000_000 satoshis
        0x00, 0xf2, 0x05, 0x2a, 0x01, 0x00, 0x00, 0x00,
        // scriptPubKey length = 25 (P2PKH)
        0x19,
        0x76, 0xa9, 0x14,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x88, 0xac,
    // locktime
    0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;
    use extractor_chain::serialization::BitcoinDeserializeInto;
    use extractor_chain::transaction::Transaction;

    #[test]
    fn dummy_tx1_is_exactly_85_bytes_round_trip() {
        let tx: Transaction = DUMMY_TX1.bitcoin_deserialize_into().unwrap();
        assert_eq!(tx.len(), 85);
        assert_eq!(tx.bitcoin_serialize_to_vec().unwrap(), DUMMY_TX1);
    }
}
