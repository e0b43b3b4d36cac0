//! Ad-hoc database repairs.

use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::commands::{Reply, Session};

impl Session<'_> {
    /// Drops backlog entries recorded before `before`.
    pub fn prune_backlog(&self, before: NaiveDate) -> Result<Reply> {
        let removed = self.store.prune_backlog(before)?;
        Ok(Reply::text(format!(
            "Removed {removed} backlog entries recorded before {before}"
        )))
    }

    /// Marks the player `name` resolves to as (in)active. Snapshots are kept.
    pub fn set_active(&self, name: &str, active: bool) -> Result<Reply> {
        let identity = match self.identity_named(name)? {
            Ok(identity) => identity,
            Err(reply) => return Ok(reply),
        };
        if identity.active == active {
            return Ok(Reply::text(format!(
                "{} is already {}",
                identity.preferred_name(),
                if active { "active" } else { "inactive" }
            )));
        }
        self.store.set_active(identity.key, active)?;
        info!("Player {} active = {}", identity.key, active);
        Ok(Reply::text(format!(
            "{} {}",
            if active { "Reactivated" } else { "Deactivated" },
            identity.preferred_name()
        )))
    }

    /// Adds every spelling in a newline-delimited file that the dictionary lacks.
    pub fn import_dictionary(&self, path: &Path) -> Result<Reply> {
        let mut ingestor = self.ingestor()?;
        let added = ingestor.seed_dictionary(path)?;
        Ok(Reply::text(format!(
            "Added {} words from {} to the dictionary",
            added,
            path.display()
        )))
    }
}
