//! DNS transport selection for the tunnel resolver
//!
//! The resolver asks which upstream ("transport") should answer each
//! query. The answer depends on the operating mode and the global domain
//! rules:
//!
//! ```text
//! query ──▶ mode?
//!            ├─ DNS only ─────▶ Trust → BlockFree, Block → BlockAll, else Preferred
//!            ├─ DNS+Firewall ─▶ bypass/trusted → Alg, Block → BlockAll, else Preferred
//!            └─ Firewall ─────▶ Preferred
//! ```
//!
//! Ids other than `Alg` and raw `BlockAll` pass through
//! [`DnsTransportSelector::determine`], which honours the resolver's
//! suggestion and the cache prefix.

pub mod transport;

pub use transport::{DnsTransportSelector, ALG, BLOCK_ALL, BLOCK_FREE, CACHE_PREFIX, PREFERRED};
