//! Campaign files describing which tests run on which elements.
//!
//! A campaign is read through the `config` crate, so TOML, JSON and YAML
//! files all work, and any key can be overridden from the environment with
//! the `DQMWATCH_` prefix (e.g. `DQMWATCH_STORE=other.json`).
//!
//! ```toml
//! store = "objects.json"
//! reference = "reference.json"
//!
//! [[qtests]]
//! name = "chi2"
//! type = "Chi2Test"
//! parameters = { ComparisonType = "UW", ErrorLimit = 0.1 }
//!
//! [[elements]]
//! path = "/calo"
//! name = "energy"
//! qtests = ["chi2"]
//! ```
//!
//! Relative store paths are resolved against the campaign file's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use dqmwatch_core::{ConfigElement, JsonFileStore, MonitorElementManager, QualityTestDefinition};
use serde::Deserialize;
use tracing::{info, warn};

/// An element to read from the object store and the tests to attach to it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElementEntry {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub qtests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Campaign {
    /// JSON object store holding the monitored objects.
    pub store: PathBuf,
    /// JSON object store holding the references, keyed like `store`.
    #[serde(default)]
    pub reference: Option<PathBuf>,
    #[serde(default)]
    pub qtests: Vec<QualityTestDefinition>,
    #[serde(default)]
    pub elements: Vec<ElementEntry>,
}

impl Campaign {
    /// Read the campaign at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("DQMWATCH"))
            .build()
            .with_context(|| format!("failed to read campaign {}", path.display()))?;
        let mut campaign: Campaign = config
            .try_deserialize()
            .with_context(|| format!("invalid campaign {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        campaign.store = base.join(&campaign.store);
        campaign.reference = campaign.reference.map(|r| base.join(r));
        Ok(campaign)
    }

    /// Create the tests, read the elements and attach everything.
    ///
    /// Any failure aborts: a campaign is either fully set up or not at all.
    pub fn build(&self) -> Result<MonitorElementManager> {
        let mut manager = MonitorElementManager::new();

        for definition in &self.qtests {
            manager
                .create_quality_test(&ConfigElement::from(definition))
                .with_context(|| format!("cannot create quality test '{}'", definition.name))?;
        }

        let store = JsonFileStore::open(&self.store)
            .with_context(|| format!("cannot open object store {}", self.store.display()))?;
        for entry in &self.elements {
            manager
                .read_monitor_element(&store, &entry.path, &entry.name)
                .with_context(|| format!("cannot read monitor element '{}/{}'", entry.path, entry.name))?;
            for qtest in &entry.qtests {
                manager
                    .add_quality_test(&entry.path, &entry.name, qtest)
                    .with_context(|| format!("cannot attach '{qtest}' to '{}/{}'", entry.path, entry.name))?;
            }
        }

        if let Some(reference) = &self.reference {
            let references = JsonFileStore::open(reference)
                .with_context(|| format!("cannot open reference store {}", reference.display()))?;
            let attached = manager.attach_references(&references);
            if attached < self.elements.len() {
                warn!(
                    "Only {} of {} element(s) have a reference",
                    attached,
                    self.elements.len()
                );
            }
        }

        info!(
            "Campaign ready: {} quality test(s), {} element(s)",
            self.qtests.len(),
            self.elements.len()
        );
        Ok(manager)
    }
}
