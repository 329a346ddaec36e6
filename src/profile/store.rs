use crate::profile::ConnectionProfile;
use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FOLDER: &str = "DEFAULT";

const STORE_FILE: &str = "profiles.json";

/// Outcome of a JSON import: how many records landed, and what was skipped.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<String>,
}

/// Folder-scoped store of connection profiles, persisted as a single JSON
/// document under an explicitly supplied directory. Profile names are unique
/// within a folder; the `DEFAULT` folder always exists and cannot be removed.
pub struct ProfileStore {
    path: PathBuf,
    folders: BTreeMap<String, Vec<ConnectionProfile>>,
}

impl ProfileStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create profile dir {}", dir.display()))?;
        let path = dir.join(STORE_FILE);
        let folders = match fs::read_to_string(&path) {
            Ok(raw) => parse_folders(&raw).unwrap_or_else(|e| {
                warn!("could not parse {}: {e:#}, starting empty", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        let mut store = Self { path, folders };
        store
            .folders
            .entry(DEFAULT_FOLDER.to_string())
            .or_default();
        Ok(store)
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.folders)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!("saved {} profile folder(s)", self.folders.len());
        Ok(())
    }

    pub fn folders(&self) -> Vec<String> {
        self.folders.keys().cloned().collect()
    }

    pub fn profiles(&self, folder: &str) -> &[ConnectionProfile] {
        self.folders.get(folder).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Find a profile by name, searching one folder or all of them.
    /// Returns the profile with its folder and index.
    pub fn find_by_name(
        &self,
        name: &str,
        folder: Option<&str>,
    ) -> Option<(&ConnectionProfile, &str, usize)> {
        let folders: Vec<&String> = match folder {
            Some(f) => self.folders.keys().filter(|k| k.as_str() == f).collect(),
            None => self.folders.keys().collect(),
        };
        for key in folders {
            if let Some((i, profile)) = self.folders[key]
                .iter()
                .enumerate()
                .find(|(_, p)| p.name == name)
            {
                return Some((profile, key.as_str(), i));
            }
        }
        None
    }

    pub fn add_profile(&mut self, profile: ConnectionProfile, folder: &str) -> Result<()> {
        if !profile.is_valid() {
            bail!("profile is missing required fields (name, target, user, gateway)");
        }
        let entries = self.folders.entry(folder.to_string()).or_default();
        if entries.iter().any(|p| p.name == profile.name) {
            bail!("a profile named {:?} already exists in folder {folder:?}", profile.name);
        }
        entries.push(profile);
        self.save()
    }

    pub fn update_profile(
        &mut self,
        folder: &str,
        index: usize,
        profile: ConnectionProfile,
    ) -> Result<()> {
        if !profile.is_valid() {
            bail!("profile is missing required fields (name, target, user, gateway)");
        }
        let entries = self
            .folders
            .get_mut(folder)
            .with_context(|| format!("no folder named {folder:?}"))?;
        let slot = entries
            .get_mut(index)
            .with_context(|| format!("no profile at index {index} in folder {folder:?}"))?;
        *slot = profile;
        self.save()
    }

    pub fn delete_profile(&mut self, folder: &str, index: usize) -> Result<()> {
        let entries = self
            .folders
            .get_mut(folder)
            .with_context(|| format!("no folder named {folder:?}"))?;
        if index >= entries.len() {
            bail!("no profile at index {index} in folder {folder:?}");
        }
        entries.remove(index);
        self.save()
    }

    pub fn add_folder(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            bail!("folder name is empty");
        }
        if self.folders.contains_key(name) {
            bail!("folder {name:?} already exists");
        }
        self.folders.insert(name.to_string(), Vec::new());
        self.save()
    }

    pub fn rename_folder(&mut self, old: &str, new: &str) -> Result<()> {
        if old == DEFAULT_FOLDER {
            bail!("the {DEFAULT_FOLDER} folder cannot be renamed");
        }
        if new.is_empty() || old == new {
            bail!("invalid folder name {new:?}");
        }
        if self.folders.contains_key(new) {
            bail!("folder {new:?} already exists");
        }
        let entries = self
            .folders
            .remove(old)
            .with_context(|| format!("no folder named {old:?}"))?;
        self.folders.insert(new.to_string(), entries);
        self.save()
    }

    pub fn delete_folder(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_FOLDER {
            bail!("the {DEFAULT_FOLDER} folder cannot be deleted");
        }
        if self.folders.remove(name).is_none() {
            bail!("no folder named {name:?}");
        }
        self.save()
    }

    pub fn move_profile(&mut self, source: &str, index: usize, target: &str) -> Result<()> {
        if !self.folders.contains_key(target) {
            bail!("no folder named {target:?}");
        }
        let entries = self
            .folders
            .get_mut(source)
            .with_context(|| format!("no folder named {source:?}"))?;
        if index >= entries.len() {
            bail!("no profile at index {index} in folder {source:?}");
        }
        let profile = entries.remove(index);
        self.folders
            .get_mut(target)
            .unwrap_or_else(|| unreachable!("checked above"))
            .push(profile);
        self.save()
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.folders)?)
    }

    /// Merge profiles from a JSON document into the store. Accepts either a
    /// folder map or a bare profile list (which lands in `DEFAULT`). Invalid
    /// records are skipped and reported, valid ones are imported regardless.
    pub fn import_json(&mut self, json: &str) -> Result<ImportReport> {
        let value: Value = serde_json::from_str(json).context("import data is not valid JSON")?;
        let folders: BTreeMap<String, Value> = match value {
            Value::Object(map) => map.into_iter().collect(),
            Value::Array(list) => {
                let mut map = BTreeMap::new();
                map.insert(DEFAULT_FOLDER.to_string(), Value::Array(list));
                map
            }
            _ => bail!("import data must be a folder map or a profile list"),
        };

        let mut report = ImportReport::default();
        for (folder, entries) in folders {
            let Value::Array(entries) = entries else {
                report
                    .errors
                    .push(format!("folder {folder:?} does not contain a list"));
                continue;
            };
            for entry in entries {
                let profile: ConnectionProfile = match serde_json::from_value(entry) {
                    Ok(p) => p,
                    Err(e) => {
                        report.errors.push(format!("bad record in {folder:?}: {e}"));
                        continue;
                    }
                };
                if !profile.is_valid() {
                    report
                        .errors
                        .push(format!("profile {:?} is missing required fields", profile.name));
                    continue;
                }
                self.folders
                    .entry(folder.clone())
                    .or_default()
                    .push(profile);
                report.imported += 1;
            }
        }

        if report.imported > 0 {
            self.save()?;
        }
        Ok(report)
    }
}

/// On-disk document is normally a folder map; old exports were a bare list,
/// which is migrated into the `DEFAULT` folder.
fn parse_folders(raw: &str) -> Result<BTreeMap<String, Vec<ConnectionProfile>>> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Array(_) => {
            let profiles: Vec<ConnectionProfile> = serde_json::from_value(value)?;
            let mut map = BTreeMap::new();
            map.insert(DEFAULT_FOLDER.to_string(), profiles);
            Ok(map)
        }
        _ => Ok(serde_json::from_value(value)?),
    }
}
