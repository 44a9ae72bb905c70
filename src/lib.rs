//! jxlaunch: store Jagex account credentials and start pre-authenticated
//! RuneLite clients on this machine or on daemon agents across the LAN.

pub mod accounts;
pub mod config;
pub mod daemon;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod server;
