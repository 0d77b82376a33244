//! `tileworker resolve`: show where workers would be bootstrapped from.

use std::path::Path;
use tileworker::worker::{BootstrapSettings, ChannelConfig};

use crate::error::CliError;
use crate::runner::load_config;

/// Command-line overrides for the configured bootstrap settings.
#[derive(Debug, Default)]
pub struct ResolveOverrides {
    pub entry: Option<String>,
    pub override_location: Option<String>,
}

/// Run the resolve command.
pub fn run(config_path: Option<&Path>, overrides: ResolveOverrides) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let mut channel = ChannelConfig::from(&config);
    apply(&mut channel.bootstrap, overrides);

    let resolved = channel.resolve_bootstrap();
    println!("{}", resolved.location);
    println!("  resolver:  {}", resolved.resolver);
    println!("  pool size: {}", channel.pool_size);
    Ok(())
}

fn apply(settings: &mut BootstrapSettings, overrides: ResolveOverrides) {
    if let Some(entry) = overrides.entry {
        settings.entry = entry;
    }
    if overrides.override_location.is_some() {
        settings.override_location = overrides.override_location;
    }
}
