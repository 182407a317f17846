//! Core library for the looper project.
//!
//! Projects a leveraged collateralized debt position built by looping ETH
//! collateral into DAI debt, validates it against protocol and contract
//! limits, and submits it to the leverage contract.

pub mod chain;
pub mod config;
pub mod errors;
pub mod models;
pub mod position;
pub mod session;
pub mod utils;
