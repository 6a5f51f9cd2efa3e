//! Reference catalog: statuses, criticalities, centers and tools.
//!
//! Lookup data the rest of the system consults on every write. Rows live
//! in the database; this module seeds them idempotently, caches all four
//! tables in memory and answers lookups. Entries are never deleted at
//! runtime: tickets hold ids into these tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::error::TicketError;
use crate::store::TicketStore;

/// Statuses excluded from default listings.
pub const HIDDEN_STATUS_VALUES: &[&str] = &["discarted", "solved", "closed", "deleted"];

/// The four reference kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Statuses,
    Crits,
    Centers,
    Tools,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 4] = [
        CatalogKind::Statuses,
        CatalogKind::Crits,
        CatalogKind::Centers,
        CatalogKind::Tools,
    ];

    /// Database table holding this kind.
    pub fn table(&self) -> &'static str {
        match self {
            CatalogKind::Statuses => "statuses",
            CatalogKind::Crits => "crits",
            CatalogKind::Centers => "centers",
            CatalogKind::Tools => "tools",
        }
    }

    /// Seed file name in a seed directory.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.table())
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

impl FromStr for CatalogKind {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "statuses" => Ok(CatalogKind::Statuses),
            "crits" => Ok(CatalogKind::Crits),
            "centers" => Ok(CatalogKind::Centers),
            "tools" => Ok(CatalogKind::Tools),
            other => Err(TicketError::validation(format!(
                "Unknown catalog kind '{}' (expected statuses, crits, centers or tools)",
                other
            ))),
        }
    }
}

/// One catalog row. `value` is the stable machine code, `desc` the human
/// label shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub value: String,
    pub desc: String,
}

/// Declarative seed datum; ids are assigned by the store on first insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub value: String,
    pub desc: String,
}

impl SeedEntry {
    pub fn new(value: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            desc: desc.into(),
        }
    }
}

/// Seed data for all four kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSet {
    pub statuses: Vec<SeedEntry>,
    pub crits: Vec<SeedEntry>,
    pub centers: Vec<SeedEntry>,
    pub tools: Vec<SeedEntry>,
}

impl SeedSet {
    pub fn for_kind(&self, kind: CatalogKind) -> &[SeedEntry] {
        match kind {
            CatalogKind::Statuses => &self.statuses,
            CatalogKind::Crits => &self.crits,
            CatalogKind::Centers => &self.centers,
            CatalogKind::Tools => &self.tools,
        }
    }

    pub fn for_kind_mut(&mut self, kind: CatalogKind) -> &mut Vec<SeedEntry> {
        match kind {
            CatalogKind::Statuses => &mut self.statuses,
            CatalogKind::Crits => &mut self.crits,
            CatalogKind::Centers => &mut self.centers,
            CatalogKind::Tools => &mut self.tools,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogData {
    statuses: Vec<CatalogEntry>,
    crits: Vec<CatalogEntry>,
    centers: Vec<CatalogEntry>,
    tools: Vec<CatalogEntry>,
}

impl CatalogData {
    fn for_kind(&self, kind: CatalogKind) -> &[CatalogEntry] {
        match kind {
            CatalogKind::Statuses => &self.statuses,
            CatalogKind::Crits => &self.crits,
            CatalogKind::Centers => &self.centers,
            CatalogKind::Tools => &self.tools,
        }
    }
}

/// Cheaply cloneable handle over the cached reference tables. Reloadable
/// on demand; holders never observe a half-reloaded catalog.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<RwLock<CatalogData>>,
}

impl Catalog {
    /// Seed missing rows from `seeds`, then cache all four tables.
    pub fn load(store: &TicketStore, seeds: &SeedSet) -> Result<Self, TicketError> {
        for kind in CatalogKind::ALL {
            store.seed_catalog(kind, seeds.for_kind(kind))?;
        }
        let catalog = Self {
            inner: Arc::new(RwLock::new(CatalogData::default())),
        };
        catalog.reload(store)?;
        Ok(catalog)
    }

    /// Re-read the four tables from the store.
    pub fn reload(&self, store: &TicketStore) -> Result<(), TicketError> {
        let data = CatalogData {
            statuses: store.catalog_entries(CatalogKind::Statuses)?,
            crits: store.catalog_entries(CatalogKind::Crits)?,
            centers: store.catalog_entries(CatalogKind::Centers)?,
            tools: store.catalog_entries(CatalogKind::Tools)?,
        };
        *self.inner.write().unwrap() = data;
        Ok(())
    }

    pub fn entries(&self, kind: CatalogKind) -> Vec<CatalogEntry> {
        self.inner.read().unwrap().for_kind(kind).to_vec()
    }

    pub fn statuses(&self) -> Vec<CatalogEntry> {
        self.entries(CatalogKind::Statuses)
    }

    pub fn crits(&self) -> Vec<CatalogEntry> {
        self.entries(CatalogKind::Crits)
    }

    pub fn centers(&self) -> Vec<CatalogEntry> {
        self.entries(CatalogKind::Centers)
    }

    pub fn tools(&self) -> Vec<CatalogEntry> {
        self.entries(CatalogKind::Tools)
    }

    fn find_by_id(&self, kind: CatalogKind, id: i64) -> Option<CatalogEntry> {
        self.inner
            .read()
            .unwrap()
            .for_kind(kind)
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    fn find_by_value(&self, kind: CatalogKind, value: &str) -> Option<CatalogEntry> {
        self.inner
            .read()
            .unwrap()
            .for_kind(kind)
            .iter()
            .find(|e| e.value == value)
            .cloned()
    }

    pub fn status_by_id(&self, id: i64) -> Option<CatalogEntry> {
        self.find_by_id(CatalogKind::Statuses, id)
    }

    pub fn status_by_value(&self, value: &str) -> Option<CatalogEntry> {
        self.find_by_value(CatalogKind::Statuses, value)
    }

    pub fn crit_by_id(&self, id: i64) -> Option<CatalogEntry> {
        self.find_by_id(CatalogKind::Crits, id)
    }

    pub fn center_by_id(&self, id: i64) -> Option<CatalogEntry> {
        self.find_by_id(CatalogKind::Centers, id)
    }

    pub fn tool_by_id(&self, id: i64) -> Option<CatalogEntry> {
        self.find_by_id(CatalogKind::Tools, id)
    }

    /// The status new tickets start in.
    pub fn initial_status(&self) -> Result<CatalogEntry, TicketError> {
        self.status_by_value("created").ok_or_else(|| {
            TicketError::Storage("Reference catalog has no 'created' status".to_string())
        })
    }

    /// Ids of the statuses excluded from default listings.
    pub fn hidden_status_ids(&self) -> Vec<i64> {
        let data = self.inner.read().unwrap();
        data.statuses
            .iter()
            .filter(|e| HIDDEN_STATUS_VALUES.contains(&e.value.as_str()))
            .map(|e| e.id)
            .collect()
    }
}

pub mod seed {
    //! Seed data for the reference catalog.
    //!
    //! `default_seed` is the single built-in copy. A seed directory of JSON
    //! files (one array of `{value, desc}` per kind) overrides whole kinds;
    //! absent files keep the built-ins.

    use std::fs;
    use std::path::Path;

    use super::{CatalogKind, SeedEntry, SeedSet};
    use crate::error::TicketError;

    /// Built-in seed set.
    pub fn default_seed() -> SeedSet {
        SeedSet {
            statuses: vec![
                SeedEntry::new("created", "Creada"),
                SeedEntry::new("reviewed", "Revisada"),
                SeedEntry::new("discarted", "Descartada"),
                SeedEntry::new("resolving", "En resolució"),
                SeedEntry::new("notified", "Notificada"),
                SeedEntry::new("solved", "Resolta"),
                SeedEntry::new("closed", "Tancada"),
                SeedEntry::new("deleted", "Eliminada"),
                SeedEntry::new("on_hold", "Aturada"),
                SeedEntry::new("reopened", "Reoberta"),
            ],
            crits: vec![
                SeedEntry::new("low", "Baixa"),
                SeedEntry::new("mid", "Mitja"),
                SeedEntry::new("high", "Alta"),
                SeedEntry::new("critical", "Crítica"),
            ],
            centers: vec![
                SeedEntry::new("305", "EAP St. Andreu de Llavaneres"),
                SeedEntry::new("273", "EAP Arenys de Mar"),
                SeedEntry::new("302", "EAP Mataró- 3 (Perú)"),
                SeedEntry::new("279", "EAP Mataró- 1 (La Riera)"),
                SeedEntry::new("281", "EAP Mataró- 7 (Ronda Prim)"),
            ],
            tools: vec![
                SeedEntry::new("ecap", "ECAP"),
                SeedEntry::new("econsulta", "eConsulta"),
                SeedEntry::new("lms", "La Meva Salut"),
                SeedEntry::new("sire", "SIRE - Recepta electrònica"),
                SeedEntry::new("correu", "Correu corporatiu"),
                SeedEntry::new("ofimatica", "Ofimàtica"),
                SeedEntry::new("impressores", "Impressores"),
                SeedEntry::new("xarxa", "Xarxa i connectivitat"),
            ],
        }
    }

    /// Built-ins overridden per kind by the JSON files present in `dir`.
    /// Returns the merged set and which kinds came from files.
    pub fn load_dir(dir: &Path) -> Result<(SeedSet, Vec<CatalogKind>), TicketError> {
        let mut seeds = default_seed();
        let mut overridden = Vec::new();

        for kind in CatalogKind::ALL {
            let path = dir.join(kind.file_name());
            if path.exists() {
                *seeds.for_kind_mut(kind) = parse_file(&path)?;
                overridden.push(kind);
            }
        }

        Ok((seeds, overridden))
    }

    /// Parse and validate one seed file.
    pub fn parse_file(path: &Path) -> Result<Vec<SeedEntry>, TicketError> {
        let content = fs::read_to_string(path).map_err(|e| {
            TicketError::Storage(format!("Failed to read seed file {:?}: {}", path, e))
        })?;
        let entries: Vec<SeedEntry> = serde_json::from_str(&content).map_err(|e| {
            TicketError::validation(format!("Seed file {:?} is not valid: {}", path, e))
        })?;

        for entry in &entries {
            if entry.value.trim().is_empty() || entry.desc.trim().is_empty() {
                return Err(TicketError::validation(format!(
                    "Seed file {:?} has an entry with an empty value or desc",
                    path
                )));
            }
        }
        Ok(entries)
    }

    /// Write one seed file in canonical form.
    pub fn write_file(path: &Path, entries: &[SeedEntry]) -> Result<(), TicketError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TicketError::Storage(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(path, content)
            .map_err(|e| TicketError::Storage(format!("Failed to write {:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_catalog() -> (Catalog, TicketStore) {
        let store = TicketStore::open_in_memory().unwrap();
        let catalog = Catalog::load(&store, &seed::default_seed()).unwrap();
        (catalog, store)
    }

    #[test]
    fn test_load_seeds_and_caches() {
        let (catalog, _store) = test_catalog();
        assert_eq!(catalog.statuses().len(), 10);
        assert_eq!(catalog.crits().len(), 4);
        assert_eq!(catalog.centers().len(), 5);
        assert!(!catalog.tools().is_empty());

        let created = catalog.status_by_value("created").unwrap();
        assert_eq!(created.desc, "Creada");
        assert_eq!(catalog.initial_status().unwrap().id, created.id);
    }

    #[test]
    fn test_second_load_adds_nothing() {
        let store = TicketStore::open_in_memory().unwrap();
        let seeds = seed::default_seed();
        Catalog::load(&store, &seeds).unwrap();
        let catalog = Catalog::load(&store, &seeds).unwrap();
        assert_eq!(catalog.statuses().len(), seeds.statuses.len());
    }

    #[test]
    fn test_lookups_by_id_and_value() {
        let (catalog, _store) = test_catalog();
        let high = catalog
            .crits()
            .into_iter()
            .find(|c| c.value == "high")
            .unwrap();
        assert_eq!(catalog.crit_by_id(high.id).unwrap().desc, "Alta");
        assert!(catalog.crit_by_id(9999).is_none());
        assert!(catalog.status_by_value("no_such_status").is_none());
    }

    #[test]
    fn test_hidden_status_ids() {
        let (catalog, _store) = test_catalog();
        let hidden = catalog.hidden_status_ids();
        assert_eq!(hidden.len(), 4);
        let solved = catalog.status_by_value("solved").unwrap();
        assert!(hidden.contains(&solved.id));
        let created = catalog.status_by_value("created").unwrap();
        assert!(!hidden.contains(&created.id));
    }

    #[test]
    fn test_reload_picks_up_new_rows() {
        let (catalog, store) = test_catalog();
        store
            .seed_catalog(
                CatalogKind::Tools,
                &[SeedEntry::new("gecat", "GECAT Facturació")],
            )
            .unwrap();

        // Cache is stale until reload.
        let before = catalog.tools().len();
        catalog.reload(&store).unwrap();
        assert_eq!(catalog.tools().len(), before + 1);
    }

    #[test]
    fn test_seed_dir_overrides_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        seed::write_file(
            &dir.path().join("crits.json"),
            &[SeedEntry::new("urgent", "Urgent")],
        )
        .unwrap();

        let (seeds, overridden) = seed::load_dir(dir.path()).unwrap();
        assert_eq!(overridden, vec![CatalogKind::Crits]);
        assert_eq!(seeds.crits.len(), 1);
        assert_eq!(seeds.crits[0].value, "urgent");
        // Untouched kinds keep the built-ins.
        assert_eq!(seeds.statuses.len(), 10);
    }

    #[test]
    fn test_malformed_seed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tools.json"), "{\"not\": \"a list\"}").unwrap();
        assert!(seed::load_dir(dir.path()).is_err());

        std::fs::write(
            dir.path().join("tools.json"),
            "[{\"value\": \"\", \"desc\": \"Buit\"}]",
        )
        .unwrap();
        assert!(seed::load_dir(dir.path()).is_err());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("statuses".parse::<CatalogKind>().unwrap(), CatalogKind::Statuses);
        assert_eq!("tools".parse::<CatalogKind>().unwrap(), CatalogKind::Tools);
        assert!("users".parse::<CatalogKind>().is_err());
        assert_eq!(CatalogKind::Crits.file_name(), "crits.json");
    }
}
