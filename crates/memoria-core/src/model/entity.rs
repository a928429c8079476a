//! Entity — a hub document for a person/project/system/concept mentioned by
//! one or more memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub agent_id: String,
    pub slug: String,
    pub display_name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub memory_count: u64,
    pub last_seen_at: DateTime<Utc>,
}

impl Entity {
    pub fn new(agent_id: impl Into<String>, slug: impl Into<String>, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            agent_id: agent_id.into(),
            slug: slug.into(),
            display_name: display_name.into(),
            aliases: BTreeSet::new(),
            summary: String::new(),
            attributes: BTreeMap::new(),
            memory_count: 0,
            last_seen_at: now,
        }
    }

    /// Turn free text into a stable entity slug: lowercase, ascii-alnum, `-`-joined.
    pub fn slugify(text: &str) -> String {
        let mut slug = String::with_capacity(text.len());
        let mut last_was_dash = true;
        for ch in text.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
                last_was_dash = false;
            } else if !last_was_dash {
                slug.push('-');
                last_was_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_normalizes() {
        assert_eq!(Entity::slugify("PostgreSQL Database!"), "postgresql-database");
        assert_eq!(Entity::slugify("  multiple   spaces "), "multiple-spaces");
    }
}
