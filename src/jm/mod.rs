pub mod asyncutil;
pub mod build_info;
pub mod cli;
pub mod config;
pub mod consistency;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod failures;
pub mod gateway;
pub mod jmctl_cli;
pub mod job;
pub mod logging;
pub mod reconciler;
pub mod rpc;
pub mod runner;
pub mod store;
pub mod supervisor;
pub mod systemd;

#[cfg(test)]
pub(crate) mod testutil;
