//! Peer address gossip entries, as carried by `addr` messages.

use std::{io, net::SocketAddr};

use chrono::{DateTime, TimeZone, Utc};
use extractor_chain::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use crate::protocol::external::types::PeerServices;

/// A single entry in an `addr` message: a peer's address, the services it
/// advertises, and the last time it was seen active.
///
/// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#Network_address)
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MetaAddr {
    /// The peer's address and port.
    pub addr: SocketAddr,
    /// The services the peer advertised the last time it was seen.
    pub services: PeerServices,
    /// The last time this peer was seen active, to the nearest second.
    pub last_seen: DateTime<Utc>,
}

impl BitcoinSerialize for MetaAddr {
    fn bitcoin_serialize<W: io::Write>(&self, mut target: W) -> Result<(), io::Error> {
        let timestamp = self.last_seen.timestamp().clamp(0, u32::MAX as i64) as u32;
        timestamp.bitcoin_serialize(&mut target)?;
        self.services.bitcoin_serialize(&mut target)?;
        self.addr.bitcoin_serialize(&mut target)
    }
}

impl BitcoinDeserialize for MetaAddr {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let timestamp = u32::bitcoin_deserialize(&mut reader)? as i64;
        let services = PeerServices::bitcoin_deserialize(&mut reader)?;
        let addr = SocketAddr::bitcoin_deserialize(&mut reader)?;
        let last_seen = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or(SerializationError::Parse("addr timestamp out of range"))?;
        Ok(MetaAddr {
            addr,
            services,
            last_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn meta_addr_round_trips() {
        let addr = MetaAddr {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 6)), 8333),
            services: PeerServices::NODE_NETWORK | PeerServices::NODE_WITNESS,
            last_seen: Utc.timestamp_opt(1_600_000_000, 0).single().unwrap(),
        };
        let bytes = addr.bitcoin_serialize_to_vec().unwrap();
        let parsed = MetaAddr::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(addr, parsed);
    }
}
