//! Firefox desktop collaborators for the extension runner
//!
//! - `profile`: profile directories, proxy installs and process launch
//! - `rdp`: remote debugging protocol client used for temporary installs and reloads

mod prefs;
mod process;
mod profile;
mod rdp;

pub use profile::FirefoxProfiles;
pub use rdp::RdpConnector;
