//! Controller configuration file.
//!
//! [`ConfigFile`] is the on-disk form of every tunable. Components build
//! their runtime configs from it with `From<&ConfigFile>`:
//!
//! ```
//! use netsys_ser::config::ConfigFile;
//! use netsys_ser::recovery::RecoveryConfig;
//!
//! let file = ConfigFile::default();
//! let recovery = RecoveryConfig::from(&file);
//! assert_eq!(recovery, RecoveryConfig::default());
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, LoggingSettings, MonitorSettings, RecoverySettings, RendezvousSettings};
