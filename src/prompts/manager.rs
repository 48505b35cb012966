//! Custom prompt CRUD.

use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;
use slug::slugify;
use tokio::sync::Mutex;

use super::errors::PromptError;
use super::prompt::{CustomPrompt, DEFAULT_CATEGORY};
use crate::storage::YamlStore;

/// Input for creating a prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrompt {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Editable prompt fields. The id cannot be changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

pub struct PromptManager {
    store: YamlStore<CustomPrompt>,
    write_lock: Mutex<()>,
}

impl PromptManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            store: YamlStore::new(dir),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn create(&self, new: NewPrompt) -> Result<CustomPrompt, PromptError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(PromptError::Invalid {
                reason: "name is required".into(),
            });
        }
        let id = slugify(name);
        if id.is_empty() {
            return Err(PromptError::Invalid {
                reason: format!("cannot derive an id from '{name}'"),
            });
        }

        let _write = self.write_lock.lock().await;
        if self.store.exists(&id)? {
            return Err(PromptError::AlreadyExists { id });
        }

        let now = Utc::now();
        let prompt = CustomPrompt {
            id,
            name: name.to_string(),
            description: new.description,
            category: new
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            prompt_template: new.prompt_template,
            created_at: now,
            updated_at: now,
        };
        self.store.save(&prompt)?;
        tracing::info!(prompt = %prompt.id, "custom prompt created");
        Ok(prompt)
    }

    /// Apply an update. Renaming keeps the original id.
    pub async fn update(&self, id: &str, update: PromptUpdate) -> Result<CustomPrompt, PromptError> {
        let _write = self.write_lock.lock().await;
        let mut prompt = self.store.get(id)?.ok_or_else(|| PromptError::NotFound {
            id: id.to_string(),
        })?;

        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(PromptError::Invalid {
                    reason: "name must not be empty".into(),
                });
            }
            prompt.name = name;
        }
        if let Some(description) = update.description {
            prompt.description = description;
        }
        if let Some(template) = update.prompt_template {
            prompt.prompt_template = template;
        }
        if let Some(category) = update.category {
            prompt.category = category;
        }
        prompt.updated_at = Utc::now();

        self.store.save(&prompt)?;
        Ok(prompt)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, PromptError> {
        let _write = self.write_lock.lock().await;
        Ok(self.store.delete(id)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<CustomPrompt>, PromptError> {
        Ok(self.store.get(id)?)
    }

    /// All prompts, ordered by case-insensitive name.
    pub fn list(&self) -> Result<Vec<CustomPrompt>, PromptError> {
        let mut prompts = self.store.list()?;
        prompts.sort_by_key(|p| p.name.to_lowercase());
        Ok(prompts)
    }
}
