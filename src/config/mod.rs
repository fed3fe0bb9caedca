// src/config/mod.rs
// =============================================================================
// Crawl definitions: the files an operator writes, and the loader that turns
// them into validated crawl targets.
//
// A definition file is TOML or JSON (picked by extension) holding a list of
// targets:
//
//   [[target]]
//   name = "catalog"
//   start_url = "https://example.edu/courses"
//
//   [[target.steps]]
//   type = "find"
//   repeating_selector = "div.course"
//   fields = { title = "h3", link = "a::attr(href)" }
//
// A directory loads every definition file inside it, in file name order.
//
// Submodules:
// - compile: TargetConfig -> CrawlTarget, where every selector, URL and
//   pattern is checked before anything is fetched
// =============================================================================

mod compile;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::crawl::CrawlTarget;
use crate::select::SelectorError;

/// Default id pattern for dynamic-find links.
pub const DEFAULT_ID_PATTERN: &str = r"coid=(\d+)";
/// Default recursion bound for recursive search.
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not a .toml or .json file")]
    UnsupportedFormat(PathBuf),

    #[error("no crawl targets found in {0}")]
    Empty(PathBuf),

    #[error("target '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("target '{target}': {reason}")]
    Invalid { target: String, reason: String },

    #[error("target '{target}': invalid selector at {location}: {source}")]
    Selector {
        target: String,
        location: String,
        #[source]
        source: SelectorError,
    },
}

/// File formats a definition can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Format> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "toml" => Some(Format::Toml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// Top level of a definition file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, alias = "targets")]
    pub target: Vec<TargetConfig>,
}

/// One crawl target as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Also names the output file.
    pub name: String,
    pub start_url: String,
    /// Pages need scripts to run before extraction.
    #[serde(default, alias = "use_playwright")]
    pub render: bool,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default, alias = "tasks")]
    pub steps: Vec<StepConfig>,
    /// Add the page URL as a `source` field to found records.
    #[serde(default)]
    pub attach_source: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Find {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_space: Option<String>,
        repeating_selector: String,
        fields: IndexMap<String, String>,
        #[serde(default)]
        num_required: usize,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        include: IndexMap<String, String>,
    },
    Follow {
        link_field: String,
        #[serde(default)]
        next_steps: Vec<StepConfig>,
    },
    DynamicFind {
        search_space: String,
        base_url: String,
        #[serde(alias = "catoid")]
        category_id: CategoryId,
        fields: IndexMap<String, String>,
        #[serde(default = "default_id_pattern")]
        id_pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra_query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pagination_selector: Option<String>,
    },
}

/// Category ids show up both as numbers and as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryId {
    Number(u64),
    Text(String),
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryId::Number(n) => write!(f, "{}", n),
            CategoryId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationConfig {
    #[default]
    None,
    #[serde(alias = "listed_links")]
    EnumeratedLinks {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_space: Option<String>,
        link_selector: String,
    },
    #[serde(alias = "search_links")]
    RecursiveSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        search_space: Option<String>,
        link_selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_page_selector: Option<String>,
        #[serde(default = "default_max_depth")]
        max_depth: usize,
        /// Defaults to the start URL's host.
        #[serde(default, alias = "base_url", skip_serializing_if = "Option::is_none")]
        contains: Option<String>,
    },
}

fn default_id_pattern() -> String {
    DEFAULT_ID_PATTERN.to_string()
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Parses definition text in the given format.
pub fn parse_str(text: &str, format: Format, path: &Path) -> Result<ConfigFile, ConfigError> {
    match format {
        Format::Toml => toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        Format::Json => serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads raw target definitions from a file or a directory of files.
pub fn load_path(path: &Path) -> Result<Vec<TargetConfig>, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let files = if path.is_dir() {
        let mut files: Vec<PathBuf> = fs::read_dir(path)
            .map_err(io_error)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && Format::from_path(p).is_some())
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut targets = Vec::new();
    for file in &files {
        let format =
            Format::from_path(file).ok_or_else(|| ConfigError::UnsupportedFormat(file.clone()))?;
        let text = fs::read_to_string(file).map_err(|source| ConfigError::Io {
            path: file.clone(),
            source,
        })?;
        let parsed = parse_str(&text, format, file)?;
        debug!("Loaded {} target(s) from {}", parsed.target.len(), file.display());
        targets.extend(parsed.target);
    }

    if targets.is_empty() {
        return Err(ConfigError::Empty(path.to_path_buf()));
    }

    Ok(targets)
}

/// Compiles raw definitions, rejecting duplicate names.
pub fn compile_all(configs: Vec<TargetConfig>) -> Result<Vec<CrawlTarget>, ConfigError> {
    let mut names = HashSet::new();
    configs
        .into_iter()
        .map(|config| {
            if !names.insert(config.name.clone()) {
                return Err(ConfigError::DuplicateName(config.name));
            }
            CrawlTarget::try_from(config)
        })
        .collect()
}

/// Loads and compiles every target under `path`.
pub fn load_targets(path: &Path) -> Result<Vec<CrawlTarget>, ConfigError> {
    compile_all(load_path(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG_TOML: &str = r#"
        [[target]]
        name = "catalog"
        start_url = "https://example.edu/courses"
        attach_source = true

        [target.pagination]
        type = "enumerated_links"
        search_space = "nav.pages"
        link_selector = "a::attr(href)"

        [[target.steps]]
        type = "find"
        search_space = "xpath://div[@id='results']"
        repeating_selector = "div.course"
        num_required = 1
        fields = { title = "h3", link = "a::attr(href)" }

        [[target.steps]]
        type = "follow"
        link_field = "link"

        [[target.steps.next_steps]]
        type = "find"
        repeating_selector = "body"
        fields = { description = "p::text join" }
    "#;

    #[test]
    fn test_parse_toml_definition() {
        let file = parse_str(CATALOG_TOML, Format::Toml, Path::new("catalog.toml")).unwrap();
        assert_eq!(file.target.len(), 1);

        let target = &file.target[0];
        assert_eq!(target.name, "catalog");
        assert!(target.attach_source);
        assert!(matches!(
            target.pagination,
            PaginationConfig::EnumeratedLinks { .. }
        ));
        assert_eq!(target.steps.len(), 2);

        let StepConfig::Find { fields, num_required, .. } = &target.steps[0] else {
            panic!("expected a find step");
        };
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["title", "link"]);
        assert_eq!(*num_required, 1);

        let StepConfig::Follow { next_steps, .. } = &target.steps[1] else {
            panic!("expected a follow step");
        };
        assert_eq!(next_steps.len(), 1);
    }

    #[test]
    fn test_parse_json_with_legacy_names() {
        let json = r#"{
            "targets": [{
                "name": "appstate",
                "start_url": "https://bulletin.example.edu/content.php?catoid=34&navoid=2104",
                "use_playwright": true,
                "pagination": { "type": "search_links", "link_selector": "a", "base_url": "example.edu" },
                "tasks": [{
                    "type": "dynamic_find",
                    "search_space": "xpath://a[contains(@href, 'preview_course_nopop.php')]",
                    "base_url": "https://bulletin.example.edu/ajax/preview_course.php",
                    "catoid": 34,
                    "fields": { "title": "xpath://h3//text()join" }
                }]
            }]
        }"#;
        let file = parse_str(json, Format::Json, Path::new("appstate.json")).unwrap();
        let target = &file.target[0];

        assert!(target.render);
        let PaginationConfig::RecursiveSearch { max_depth, contains, .. } = &target.pagination
        else {
            panic!("expected recursive search");
        };
        assert_eq!(*max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(contains.as_deref(), Some("example.edu"));

        let StepConfig::DynamicFind { category_id, id_pattern, .. } = &target.steps[0] else {
            panic!("expected a dynamic find step");
        };
        assert_eq!(category_id.to_string(), "34");
        assert_eq!(id_pattern, DEFAULT_ID_PATTERN);
    }

    #[test]
    fn test_unknown_step_type_rejected() {
        let toml = r#"
            [[target]]
            name = "x"
            start_url = "https://example.com/"
            [[target.steps]]
            type = "scroll"
        "#;
        let err = parse_str(toml, Format::Toml, Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_unknown_target_key_rejected() {
        let json = r#"{"target": [{"name": "x", "start_url": "https://example.com/", "colour": 1}]}"#;
        assert!(parse_str(json, Format::Json, Path::new("x.json")).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a.toml")), Some(Format::Toml));
        assert_eq!(Format::from_path(Path::new("a.JSON")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("a.yaml")), None);
        assert_eq!(Format::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_load_directory_in_name_order() {
        let dir = TempDir::new().unwrap();
        let entry = |name: &str| {
            format!(
                "[[target]]\nname = \"{}\"\nstart_url = \"https://example.com/\"\n\
                 [[target.steps]]\ntype = \"find\"\nrepeating_selector = \"h1\"\n\
                 fields = {{ title = \"h1\" }}\n",
                name
            )
        };
        fs::write(dir.path().join("b.toml"), entry("second")).unwrap();
        fs::write(dir.path().join("a.toml"), entry("first")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let names: Vec<_> = load_path(dir.path())
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);

        let targets = load_targets(dir.path()).unwrap();
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(load_path(dir.path()), Err(ConfigError::Empty(_))));
    }

    #[test]
    fn test_unsupported_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("targets.yaml");
        fs::write(&path, "name: x").unwrap();
        assert!(matches!(
            load_path(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut file = parse_str(CATALOG_TOML, Format::Toml, Path::new("c.toml")).unwrap();
        file.target.push(file.target[0].clone());
        assert!(matches!(
            compile_all(file.target),
            Err(ConfigError::DuplicateName(name)) if name == "catalog"
        ));
    }
}
