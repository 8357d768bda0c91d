//! Bitcoin P2P wire protocol: message types and their codec.

pub mod external;
