//! Startup data: the creature catalog and the account list.
//!
//! Both are JSON arrays on disk. The catalog is read once and never changes.
//! The account list is rewritten in full after every catch.

use crate::error::ServerError;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::CreatureTemplate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Stats a template must carry to take part in battles.
pub const COMBAT_STATS: [&str; 4] = ["HP", "Attack", "Defense", "Speed"];

#[derive(Debug, Clone)]
pub struct Catalog {
    templates: Vec<CreatureTemplate>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ServerError::data(path, e))?;
        let templates: Vec<CreatureTemplate> =
            serde_json::from_slice(&bytes).map_err(|e| ServerError::data(path, e))?;
        let catalog = Self::from_templates(templates).map_err(|reason| ServerError::data(path, reason))?;
        info!("Loaded {} creature templates from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Builds a catalog, rejecting duplicate ids and templates without combat stats.
    pub fn from_templates(templates: Vec<CreatureTemplate>) -> Result<Self, String> {
        if templates.is_empty() {
            return Err("catalog is empty".to_string());
        }

        let mut by_id = HashMap::new();
        for (index, template) in templates.iter().enumerate() {
            if let Some(stat) = COMBAT_STATS.iter().find(|s| template.stat(s).is_none()) {
                return Err(format!(
                    "creature '{}' has no numeric '{}' stat",
                    template.id, stat
                ));
            }
            if by_id.insert(template.id.clone(), index).is_some() {
                return Err(format!("duplicate creature id '{}'", template.id));
            }
        }

        Ok(Self { templates, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&CreatureTemplate> {
        self.by_id.get(id).map(|&i| &self.templates[i])
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &CreatureTemplate {
        // from_templates guarantees at least one entry
        self.templates.choose(rng).unwrap_or(&self.templates[0])
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
    #[serde(alias = "pokeBalls", default)]
    pub creatures: Vec<CreatureTemplate>,
}

impl Account {
    /// Owned creature ids joined with `-`, in catch order.
    pub fn creature_list(&self) -> String {
        self.creatures
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn owned_count(&self, creature_id: &str) -> usize {
        self.creatures.iter().filter(|c| c.id == creature_id).count()
    }
}

#[derive(Debug)]
pub struct AccountStore {
    accounts: Vec<Account>,
    path: Option<PathBuf>,
}

impl AccountStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let path = path.into();
        let bytes = fs::read(&path).map_err(|e| ServerError::data(&path, e))?;
        let accounts: Vec<Account> =
            serde_json::from_slice(&bytes).map_err(|e| ServerError::data(&path, e))?;
        info!("Loaded {} accounts from {}", accounts.len(), path.display());
        Ok(Self {
            accounts,
            path: Some(path),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(accounts: Vec<Account>) -> Self {
        Self {
            accounts,
            path: None,
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.accounts
            .iter()
            .any(|a| a.username == username && a.password == password)
    }

    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.username == username)
    }

    /// Appends a caught creature and persists the whole list.
    ///
    /// The append is undone if the write fails.
    pub fn record_catch(
        &mut self,
        username: &str,
        template: CreatureTemplate,
    ) -> Result<(), ServerError> {
        let index = self
            .accounts
            .iter()
            .position(|a| a.username == username)
            .ok_or_else(|| ServerError::auth(username, "no such account"))?;

        self.accounts[index].creatures.push(template);
        if let Err(e) = self.persist() {
            self.accounts[index].creatures.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Rewrites the account file through a temporary sibling and a rename.
    pub fn persist(&self) -> Result<(), ServerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&self.accounts)
            .map_err(|e| ServerError::data(path, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
