//! On-disk plan artifacts.
//!
//! Computing a plan and applying it can run as separate steps. The plan is
//! handed over through three JSON files in an artifacts directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::{MigrateError, Result};
use crate::modification::Modification;
use crate::snapshot::ListSchema;

/// Ordered modifications.
pub const MODIFICATIONS_FILE: &str = "modifications.json";

/// Schema to record once the modifications are applied.
pub const SCHEMA_FILE: &str = "schema.json";

/// Id of the snapshot the plan was computed against.
pub const BASELINE_FILE: &str = "baseline.json";

/// A computed plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanArtifacts {
    /// Ordered modifications.
    pub modifications: Vec<Modification>,
    /// Full current schema.
    pub schema: Vec<ListSchema>,
    /// Latest snapshot id when the plan was computed.
    pub baseline: Option<i64>,
}

impl PlanArtifacts {
    /// Returns true if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Writes the plan into `dir`, creating it if needed.
    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_json(&dir.join(MODIFICATIONS_FILE), &self.modifications)?;
        write_json(&dir.join(SCHEMA_FILE), &self.schema)?;
        write_json(&dir.join(BASELINE_FILE), &self.baseline)?;
        info!(
            dir = %dir.display(),
            modifications = self.modifications.len(),
            "Wrote plan artifacts"
        );
        Ok(())
    }

    /// Reads a plan written by [`PlanArtifacts::write`].
    pub fn read(dir: &Path) -> Result<Self> {
        Ok(Self {
            modifications: read_json(&dir.join(MODIFICATIONS_FILE))?,
            schema: read_json(&dir.join(SCHEMA_FILE))?,
            baseline: read_json(&dir.join(BASELINE_FILE))?,
        })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(MigrateError::configuration(format!(
            "Missing plan artifact '{}', run create-modifications first",
            path.display()
        )));
    }
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|source| MigrateError::Artifact {
        path: PathBuf::from(path),
        source,
    })
}
