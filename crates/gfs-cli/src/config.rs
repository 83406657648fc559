//! INI configuration loading: `[<service-name>]` sections become node
//! roster entries, `[Exclusions:<dir>]` sections are delegated to
//! `gfs_exclusions`.

use std::path::Path;

use gfs_exclusions::ExclusionConfig;
use gfs_node_client::NodeRoster;

/// Everything read out of one INI configuration file.
pub struct Config {
    pub roster: NodeRoster,
    pub exclusions: ExclusionConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ini::Error> {
        let ini = ini::Ini::load_from_file(path)?;
        let exclusions = ExclusionConfig::from_ini(&ini);

        let mut roster = NodeRoster::new();
        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            if section.starts_with("Exclusions:") {
                continue;
            }
            if let Some(address) = props.get("address") {
                roster.register(section, address);
            }
        }
        Ok(Self { roster, exclusions })
    }

    /// An empty configuration: no known nodes, nothing excluded.
    pub fn empty() -> Self {
        Self { roster: NodeRoster::new(), exclusions: ExclusionConfig::empty() }
    }
}
