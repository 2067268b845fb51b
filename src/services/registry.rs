// src/services/registry.rs

//! Source registry.
//!
//! The ordered, immutable set of sources a run processes. Built once
//! from configuration (and optionally a remote list catalog); every
//! structural problem is reported here as a configuration error so the
//! rest of the pipeline can assume well-formed sources.

use std::collections::HashSet;

use md5::{Digest, Md5};
use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Config, CustomCheck, SourceSpec, SyntaxKind};
use crate::utils::is_safe_filename;

/// Ordered collection of validated sources.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceSpec>,
}

impl SourceRegistry {
    /// Build a registry, rejecting duplicate names/filenames and bad entries.
    pub fn new(sources: Vec<SourceSpec>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut filenames = HashSet::new();

        for source in &sources {
            Self::check_source(source)?;
            if !names.insert(source.name.as_str()) {
                return Err(AppError::config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if !filenames.insert(source.filename.as_str()) {
                return Err(AppError::config(format!(
                    "duplicate output filename '{}' (source '{}')",
                    source.filename, source.name
                )));
            }
        }

        Ok(Self { sources })
    }

    /// Build the registry from configuration, filling in default thresholds.
    pub fn from_config(config: &Config) -> Result<Self> {
        let default_min = config.validation.default_min_rules.max(1);
        let sources = config
            .sources
            .iter()
            .cloned()
            .map(|mut s| {
                s.min_rules.get_or_insert(default_min);
                s
            })
            .collect();
        Self::new(sources)
    }

    /// Append sources from a list catalog, skipping URLs already registered.
    ///
    /// Returns the number of sources added.
    pub fn extend_from_catalog(&mut self, catalog_json: &str, default_min: usize) -> Result<usize> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(catalog_json)?;
        let known_urls: HashSet<String> = self.sources.iter().map(|s| s.url.clone()).collect();

        let mut combined = self.sources.clone();
        let mut added = 0;
        let mut seen = HashSet::new();

        for entry in entries {
            let single = entry.sources.len() == 1;
            for source in entry.sources {
                if known_urls.contains(&source.url) || !seen.insert(source.url.clone()) {
                    continue;
                }
                let filename = catalog_filename(&source.url);
                let syntax = source.syntax();
                let name = source
                    .title
                    .clone()
                    .or_else(|| entry.title.clone().filter(|_| single))
                    .unwrap_or_else(|| filename.trim_end_matches(".txt").to_string());
                let name = unique_name(&combined, name, &filename);
                combined.push(
                    SourceSpec::new(name, source.url, filename, syntax)
                        .with_min_rules(default_min.max(1)),
                );
                added += 1;
            }
        }

        *self = Self::new(combined)?;
        Ok(added)
    }

    /// Ordered sources.
    pub fn list_sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn by_filename(&self, filename: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.filename == filename)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn check_source(source: &SourceSpec) -> Result<()> {
        if source.name.trim().is_empty() {
            return Err(AppError::config("source with empty name"));
        }
        if !is_safe_filename(&source.filename) {
            return Err(AppError::config(format!(
                "source '{}': output filename '{}' must be a plain *.txt name",
                source.name, source.filename
            )));
        }
        let url = url::Url::parse(&source.url).map_err(|e| {
            AppError::config(format!("source '{}': invalid URL: {}", source.name, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::config(format!(
                "source '{}': unsupported scheme '{}'",
                source.name,
                url.scheme()
            )));
        }
        match &source.check {
            Some(CustomCheck::ContainsPattern { pattern }) => {
                Regex::new(pattern).map_err(|e| {
                    AppError::config(format!("source '{}': bad pattern: {}", source.name, e))
                })?;
            }
            Some(CustomCheck::ContainsLine { line }) if line.trim().is_empty() => {
                return Err(AppError::config(format!(
                    "source '{}': contains_line check needs a line",
                    source.name
                )));
            }
            Some(CustomCheck::HeaderField { name, .. }) if name.trim().is_empty() => {
                return Err(AppError::config(format!(
                    "source '{}': header_field check needs a name",
                    source.name
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

fn unique_name(existing: &[SourceSpec], name: String, filename: &str) -> String {
    if existing.iter().any(|s| s.name == name) {
        format!("{} ({})", name, filename.trim_end_matches(".txt"))
    } else {
        name
    }
}

/// Output filename for a catalog source: hex MD5 of its URL.
pub fn catalog_filename(url: &str) -> String {
    format!("{}.txt", hex::encode(Md5::digest(url.as_bytes())))
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    sources: Vec<CatalogSource>,
}

#[derive(Debug, Deserialize)]
struct CatalogSource {
    url: String,
    #[serde(default)]
    title: Option<String>,
    /// `Standard` or `Hosts`
    #[serde(default)]
    format: Option<String>,
}

impl CatalogSource {
    fn syntax(&self) -> SyntaxKind {
        match self.format.as_deref() {
            Some(format) if format.eq_ignore_ascii_case("hosts") => SyntaxKind::Hosts,
            _ => SyntaxKind::Adblock,
        }
    }
}
