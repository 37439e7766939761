//! Host modules exposed to definition scripts
//!
//! Each module is generic over a provider trait so the caller decides where
//! values come from and where output goes:
//! - `env`: variables and secrets supplied by the caller (`--var`, secret store)
//! - `log`: messages emitted while the definition is evaluated

pub mod env;
pub mod log;

pub use env::{EnvModule, MapVarProvider, VarProvider};
pub use log::{LogModule, LogSink};
