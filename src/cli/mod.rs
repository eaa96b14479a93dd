//! CLI commands for hqpool
//!
//! # Usage
//!
//! ```bash
//! # Probe the configured quote servers and list them best first
//! hqpool --config hosts.yaml rank --top 5
//!
//! # Same, as JSON
//! hqpool --config hosts.yaml rank --json
//!
//! # Exercise failover against a simulated network
//! hqpool --config hosts.yaml simulate --calls 50 --failure-rate 0.2 --seed 7
//! ```

pub mod commands;
