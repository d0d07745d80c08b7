use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use lorekeep_core::PersistenceError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MigrationVersion(pub u64);

impl MigrationVersion {
    pub fn as_i64(self) -> Result<i64, PersistenceError> {
        i64::try_from(self.0)
            .map_err(|_| PersistenceError::migration(self, "version does not fit into BIGINT"))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

/// One versioned schema change with its optional up and down scripts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Migration {
    pub version: MigrationVersion,
    pub name: String,
    pub up: Option<String>,
    pub down: Option<String>,
}

impl Migration {
    pub fn new(version: u64, name: impl Into<String>) -> Self {
        Self {
            version: MigrationVersion(version),
            name: name.into(),
            up: None,
            down: None,
        }
    }

    pub fn with_up(mut self, script: impl Into<String>) -> Self {
        self.up = Some(script.into());
        self
    }

    pub fn with_down(mut self, script: impl Into<String>) -> Self {
        self.down = Some(script.into());
        self
    }
}

/// Known migrations, sorted ascending by version with no duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

const EMBEDDED: &[(u64, &str, &str, &str)] = &[
    (
        1,
        "initial_schema",
        include_str!("../../migrations/000001_initial_schema.up.sql"),
        include_str!("../../migrations/000001_initial_schema.down.sql"),
    ),
    (
        2,
        "message_session_index",
        include_str!("../../migrations/000002_message_session_index.up.sql"),
        include_str!("../../migrations/000002_message_session_index.down.sql"),
    ),
];

impl MigrationSet {
    pub fn new(migrations: Vec<Migration>) -> Result<Self, PersistenceError> {
        let mut by_version = BTreeMap::new();
        for migration in migrations {
            let version = migration.version;
            if by_version.insert(version, migration).is_some() {
                return Err(PersistenceError::migration(version, "duplicate migration version"));
            }
        }
        Ok(Self {
            migrations: by_version.into_values().collect(),
        })
    }

    /// The schema compiled into this crate.
    pub fn embedded() -> Self {
        Self {
            migrations: EMBEDDED
                .iter()
                .map(|(version, name, up, down)| {
                    Migration::new(*version, *name).with_up(*up).with_down(*down)
                })
                .collect(),
        }
    }

    /// Loads `{version}_{name}.up.sql` and `{version}_{name}.down.sql` files.
    /// Other file names are skipped with a warning.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|error| {
            PersistenceError::InvalidConfig(format!(
                "cannot read migration directory {}: {error}",
                dir.display()
            ))
        })?;

        let mut units: BTreeMap<MigrationVersion, Migration> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|error| {
                PersistenceError::InvalidConfig(format!("cannot read migration entry: {error}"))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let Some((version, name, direction)) = parse_file_name(file_name) else {
                tracing::warn!(file = %file_name, "skipping file with unrecognised migration name");
                continue;
            };

            let script = std::fs::read_to_string(&path).map_err(|error| {
                PersistenceError::migration(version, format!("cannot read {file_name}: {error}"))
            })?;

            let unit = units
                .entry(version)
                .or_insert_with(|| Migration::new(version.0, name));
            if unit.name != name {
                return Err(PersistenceError::migration(
                    version,
                    format!("conflicting names '{}' and '{name}'", unit.name),
                ));
            }
            match direction {
                Direction::Up => unit.up = Some(script),
                Direction::Down => unit.down = Some(script),
            }
        }

        Ok(Self {
            migrations: units.into_values().collect(),
        })
    }

    pub fn get(&self, version: MigrationVersion) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |migration| migration.version)
            .ok()
            .map(|index| &self.migrations[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn latest(&self) -> Option<MigrationVersion> {
        self.migrations.last().map(|migration| migration.version)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

fn parse_file_name(file_name: &str) -> Option<(MigrationVersion, &str, Direction)> {
    let (stem, direction) = if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, Direction::Up)
    } else {
        (file_name.strip_suffix(".down.sql")?, Direction::Down)
    };
    let (version, name) = stem.split_once('_')?;
    if name.is_empty() || !version.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let version = version.parse().ok()?;
    Some((MigrationVersion(version), name, direction))
}

/// Splits a script on `;`, dropping fragments that hold only comments.
pub(crate) fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|fragment| {
            fragment.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            })
        })
        .collect()
}
