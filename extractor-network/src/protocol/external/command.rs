//! The 12-byte, null-padded ASCII command string that names a Bitcoin message.

use std::io;

use extractor_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A single Bitcoin message type, as named by its wire command string.
///
/// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#Message_structure)
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
#[allow(missing_docs)]
pub enum Command {
    Version,
    Verack,
    Addr,
    Inv,
    GetData,
    NotFound,
    GetBlocks,
    GetHeaders,
    Tx,
    Block,
    Headers,
    GetAddr,
    MemPool,
    Ping,
    Pong,
    Reject,
    FilterLoad,
    FilterAdd,
    FilterClear,
    MerkleBlock,
    Alert,
    SendHeaders,
    FeeFilter,
    SendCmpct,
    CmpctBlock,
    GetBlockTxn,
    BlockTxn,
}

impl Command {
    /// The raw, null-padded 12-byte wire name for this command.
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Addr => b"addr\0\0\0\0\0\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::NotFound => b"notfound\0\0\0\0",
            Command::GetBlocks => b"getblocks\0\0\0",
            Command::GetHeaders => b"getheaders\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Headers => b"headers\0\0\0\0\0",
            Command::GetAddr => b"getaddr\0\0\0\0\0",
            Command::MemPool => b"mempool\0\0\0\0\0",
            Command::Ping => b"ping\0\0\0\0\0\0\0\0",
            Command::Pong => b"pong\0\0\0\0\0\0\0\0",
            Command::Reject => b"reject\0\0\0\0\0\0",
            Command::FilterLoad => b"filterload\0\0",
            Command::FilterAdd => b"filteradd\0\0\0",
            Command::FilterClear => b"filterclear\0",
            Command::MerkleBlock => b"merkleblock\0",
            Command::Alert => b"alert\0\0\0\0\0\0\0",
            Command::SendHeaders => b"sendheaders\0",
            Command::FeeFilter => b"feefilter\0\0\0",
            Command::SendCmpct => b"sendcmpct\0\0\0",
            Command::CmpctBlock => b"cmpctblock\0\0",
            Command::GetBlockTxn => b"getblocktxn\0",
            Command::BlockTxn => b"blocktxn\0\0\0\0",
        }
    }

    fn from_bytes(bytes: &[u8; 12]) -> Result<Command, SerializationError> {
        // Trim the trailing NUL padding before matching the ASCII name.
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(12);
        match &bytes[..end] {
            b"version" => Ok(Command::Version),
            b"verack" => Ok(Command::Verack),
            b"addr" => Ok(Command::Addr),
            b"inv" => Ok(Command::Inv),
            b"getdata" => Ok(Command::GetData),
            b"notfound" => Ok(Command::NotFound),
            b"getblocks" => Ok(Command::GetBlocks),
            b"getheaders" => Ok(Command::GetHeaders),
            b"tx" => Ok(Command::Tx),
            b"block" => Ok(Command::Block),
            b"headers" => Ok(Command::Headers),
            b"getaddr" => Ok(Command::GetAddr),
            b"mempool" => Ok(Command::MemPool),
            b"ping" => Ok(Command::Ping),
            b"pong" => Ok(Command::Pong),
            b"reject" => Ok(Command::Reject),
            b"filterload" => Ok(Command::FilterLoad),
            b"filteradd" => Ok(Command::FilterAdd),
            b"filterclear" => Ok(Command::FilterClear),
            b"merkleblock" => Ok(Command::MerkleBlock),
            b"alert" => Ok(Command::Alert),
            b"sendheaders" => Ok(Command::SendHeaders),
            b"feefilter" => Ok(Command::FeeFilter),
            b"sendcmpct" => Ok(Command::SendCmpct),
            b"cmpctblock" => Ok(Command::CmpctBlock),
            b"getblocktxn" => Ok(Command::GetBlockTxn),
            b"blocktxn" => Ok(Command::BlockTxn),
            _ => Err(SerializationError::Parse("unrecognized command string")),
        }
    }
}

impl BitcoinSerialize for Command {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        target.write_all(self.bytes())
    }
}

impl BitcoinDeserialize for Command {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = <[u8; 12]>::bitcoin_deserialize(reader)?;
        Command::from_bytes(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_are_twelve_long_and_null_padded() {
        for command in [
            Command::Version,
            Command::Verack,
            Command::GetBlocks,
            Command::MerkleBlock,
            Command::GetBlockTxn,
        ] {
            assert_eq!(command.bytes().len(), 12);
        }
    }

    #[test]
    fn command_round_trips_through_bytes() {
        for command in [
            Command::Version,
            Command::Tx,
            Command::Block,
            Command::CmpctBlock,
            Command::SendCmpct,
        ] {
            let raw: [u8; 12] = command.bytes().try_into().unwrap();
            assert_eq!(Command::from_bytes(&raw).unwrap(), command);
        }
    }
}
