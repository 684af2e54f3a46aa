//! DNS resolution substrate: a self-contained async core for dispatching
//! rate-limited, retried, wildcard-aware DNS queries across a pool of
//! upstream resolvers, plus NSEC zone walking and hygiene probes.
//!
//! This crate is the resolution engine only. Source/sink wiring, CLI
//! parsing, and persistence live above it; see [`pipeline`] for the
//! worker-pool glue a caller plugs those into.

pub mod base_resolver;
pub mod config;
pub mod dns;
pub mod error;
pub mod exchange;
pub mod failure_detector;
pub mod http;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod priority;
pub mod probes;
pub mod rate_limiter;
pub mod retry;
pub mod walker;
pub mod wildcard;

pub use base_resolver::Resolver;
pub use config::{PoolConfig, ResolverConfig, WalkConfig, WildcardConfig};
pub use dns::{DNSPacket, DNSResourceType};
pub use error::DnsError;
pub use pool::Pool;
pub use priority::Priority;
pub use walker::Walker;
pub use wildcard::WildcardType;
