// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Project file loading.
//!
//! Project files are YAML or JSON, chosen by file extension. Loading only
//! reads and parses; [`crate::schema::ProjectConfig::validate`] is a
//! separate step so callers can report every problem at once.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use modua_core::error::{ConfigError, ConfigResult};

use crate::schema::ProjectConfig;

// =============================================================================
// ProjectFormat
// =============================================================================

/// Supported project file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFormat {
    /// YAML format (`.yaml`, `.yml`).
    Yaml,
    /// JSON format (`.json`).
    Json,
}

impl ProjectFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ProjectFormat::Yaml),
            Some("json") => Ok(ProjectFormat::Json),
            Some(other) => Err(ConfigError::parse(
                path,
                format!("unsupported project format '{other}'"),
            )),
            None => Err(ConfigError::parse(path, "missing file extension")),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Loads a project file.
pub fn load_project(path: impl AsRef<Path>) -> ConfigResult<ProjectConfig> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading project file");

    let format = ProjectFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let project = load_project_str(&content, format)
        .map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::parse(path, message),
            other => other,
        })?;

    debug!(
        channels = project.channels.len(),
        tags = project.tag_count(),
        "Project file parsed"
    );
    Ok(project)
}

/// Parses a project from a string in the given format.
pub fn load_project_str(content: &str, format: ProjectFormat) -> ConfigResult<ProjectConfig> {
    match format {
        ProjectFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse("<inline>", e.to_string())),
        ProjectFormat::Json => serde_json::from_str(content)
            .map_err(|e| ConfigError::parse("<inline>", e.to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================
