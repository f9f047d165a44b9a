//! Method-presence checks for instantiated extensions
//!
//! A script is only trusted to be a provider once its instance exposes the
//! methods every caller relies on. Registry loads are always checked strictly;
//! ad-hoc loads follow the configured mode.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::{Category, InstanceSurface};
use crate::core::error::{ReelError, Result};

/// Methods every provider must expose, whatever its category
pub const UNIVERSAL_METHODS: [&str; 3] = ["search", "fetchEpisodeSources", "fetchEpisodeServers"];

/// Method an extractor instance must expose
pub const EXTRACTOR_METHOD: &str = "extract";

/// How missing universal methods are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Missing methods reject the extension
    #[default]
    Strict,
    /// Missing universal methods are logged and the extension is kept
    Permissive,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Permissive => "permissive",
        }
    }
}

/// Methods required on top of the universal set for a category
pub fn category_methods(category: Category) -> &'static [&'static str] {
    match category {
        Category::Anime => &["fetchAnimeInfo"],
        Category::Movies => &["fetchMediaInfo"],
        _ => &[],
    }
}

/// Every method a provider of the given category must expose
pub fn required_methods(category: Option<Category>) -> Vec<&'static str> {
    let mut methods = UNIVERSAL_METHODS.to_vec();
    if let Some(category) = category {
        methods.extend_from_slice(category_methods(category));
    }
    methods
}

fn missing<'a>(surface: &InstanceSurface, methods: &[&'a str]) -> Vec<&'a str> {
    methods
        .iter()
        .copied()
        .filter(|m| !surface.has_method(m))
        .collect()
}

/// Check a provider instance
///
/// Category methods are always enforced. `Permissive` only relaxes the
/// universal set, and only for instances without a known category.
pub fn validate_provider(
    id: &str,
    surface: &InstanceSurface,
    category: Option<Category>,
    mode: ValidationMode,
) -> Result<()> {
    let universal = missing(surface, &UNIVERSAL_METHODS);
    if !universal.is_empty() {
        if mode == ValidationMode::Permissive && category.is_none() {
            warn!(
                extension = %id,
                missing = %universal.join(", "),
                "Extension is missing provider methods, keeping it in permissive mode"
            );
        } else {
            return Err(ReelError::Validation(format!(
                "extension {} is missing required method(s): {}",
                id,
                universal.join(", ")
            )));
        }
    }

    if let Some(category) = category {
        let specific = missing(surface, category_methods(category));
        if !specific.is_empty() {
            return Err(ReelError::Validation(format!(
                "{} extension {} is missing required method(s): {}",
                category,
                id,
                specific.join(", ")
            )));
        }
    }

    Ok(())
}

/// Check an extractor instance
pub fn validate_extractor(id: &str, surface: &InstanceSurface) -> Result<()> {
    if surface.has_method(EXTRACTOR_METHOD) {
        Ok(())
    } else {
        Err(ReelError::Validation(format!(
            "extractor {} is missing required method(s): {}",
            id, EXTRACTOR_METHOD
        )))
    }
}
