//! Last-good deployment record per environment.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::layout::StateLayout;
use crate::application::persist;
use crate::domain::id::RunId;
use crate::domain::service::ServiceSet;
use crate::error::Result;

const FILE_NAME: &str = "last-good.json";

/// Service set of the most recent completed deploying run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastGood {
    pub run_id: RunId,
    pub recorded_at: DateTime<Utc>,
    pub services: ServiceSet,
}

#[derive(Debug, Clone)]
pub struct LastGoodStore {
    layout: StateLayout,
}

impl LastGoodStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    fn path(&self, environment: &str) -> PathBuf {
        self.layout.environment_dir(environment).join(FILE_NAME)
    }

    pub fn save(&self, run_id: &RunId, services: &ServiceSet) -> Result<()> {
        let record = LastGood {
            run_id: run_id.clone(),
            recorded_at: Utc::now(),
            services: services.clone(),
        };
        persist::write_json(&self.path(&services.environment), &record)
    }

    /// Load and re-validate the stored set.
    pub fn load(&self, environment: &str) -> Result<Option<LastGood>> {
        let record: Option<LastGood> = persist::read_json(&self.path(environment))?;
        if let Some(record) = &record {
            record.services.validate()?;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::Service;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastGoodStore::new(StateLayout::new(dir.path()));
        assert!(store.load("dev").unwrap().is_none());

        let set = ServiceSet::new(
            "acme",
            "dev",
            vec![Service::new("db", "postgres:16")],
            Vec::new(),
            None,
        )
        .unwrap();
        let run = RunId::new();
        store.save(&run, &set).unwrap();

        let loaded = store.load("dev").unwrap().unwrap();
        assert_eq!(loaded.run_id, run);
        assert_eq!(loaded.services, set);
        assert!(store.load("prod").unwrap().is_none());
    }
}
