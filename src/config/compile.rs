// src/config/compile.rs
// =============================================================================
// Compiling a TargetConfig into a CrawlTarget.
//
// Everything that can be wrong with a definition is found here, before the
// first request:
// - name usable as a file name
// - start URL parses and has a host
// - at least one step
// - every selector compiles
// - dynamic-find URLs and id patterns are valid
// - a follow step reads a field some earlier step in its chain produces
//
// A follow step ends its chain. Steps declared after one are accepted but
// never run, and a warning says so.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;
use url::Url;

use super::{ConfigError, PaginationConfig, StepConfig, TargetConfig};
use crate::crawl::{
    CrawlTarget, DynamicFindStep, EnumeratedLinks, FollowStep, Pagination, RecursiveSearch, Step,
};
use crate::extract::{FindStep, SOURCE_FIELD};
use crate::select::SelectorExpr;

impl TryFrom<TargetConfig> for CrawlTarget {
    type Error = ConfigError;

    fn try_from(config: TargetConfig) -> Result<Self, Self::Error> {
        let compiler = Compiler {
            target: &config.name,
            attach_source: config.attach_source,
        };

        compiler.check_name()?;

        let start_url = Url::parse(&config.start_url)
            .map_err(|e| compiler.invalid(format!("start_url '{}': {}", config.start_url, e)))?;
        let host = start_url
            .host_str()
            .ok_or_else(|| compiler.invalid(format!("start_url '{}' has no host", start_url)))?
            .to_string();

        if config.steps.is_empty() {
            return Err(compiler.invalid("no steps defined"));
        }

        let (steps, _) = compiler.chain(&config.steps, "steps", HashSet::new())?;
        let pagination = compiler.pagination(&config.pagination, &host)?;

        Ok(CrawlTarget {
            name: config.name.clone(),
            start_url,
            steps,
            pagination,
            render: config.render,
            attach_source: config.attach_source,
        })
    }
}

struct Compiler<'c> {
    target: &'c str,
    attach_source: bool,
}

impl Compiler<'_> {
    // Builds the error for a definition problem of this target
    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            target: self.target.to_string(),
            reason: reason.into(),
        }
    }

    // The name becomes part of the output file name, so it must be a plain
    // file name component
    fn check_name(&self) -> Result<(), ConfigError> {
        let usable = !self.target.is_empty()
            && self
                .target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if usable {
            Ok(())
        } else {
            Err(self.invalid("name must be non-empty and use only letters, digits, '_', '-' or '.'"))
        }
    }

    // Compiles one selector; `location` says where in the definition it sits
    // (e.g. "steps[0].fields.title")
    fn selector(&self, raw: &str, location: &str) -> Result<SelectorExpr, ConfigError> {
        SelectorExpr::parse(raw).map_err(|source| ConfigError::Selector {
            target: self.target.to_string(),
            location: location.to_string(),
            source,
        })
    }

    // Compiles a field map, keeping declaration order
    fn fields(
        &self,
        fields: &IndexMap<String, String>,
        location: &str,
    ) -> Result<IndexMap<String, SelectorExpr>, ConfigError> {
        if fields.is_empty() {
            return Err(self.invalid(format!("{} has no fields", location)));
        }
        fields
            .iter()
            .map(|(name, raw)| {
                let expr = self.selector(raw, &format!("{}.fields.{}", location, name))?;
                Ok((name.clone(), expr))
            })
            .collect()
    }

    // Compiles one chain. `available` holds the fields the carry record can
    // have when the chain starts; the returned set is what it can have at
    // the end.
    fn chain(
        &self,
        configs: &[StepConfig],
        location: &str,
        mut available: HashSet<String>,
    ) -> Result<(Arc<[Step]>, HashSet<String>), ConfigError> {
        let mut steps = Vec::with_capacity(configs.len());

        for (i, config) in configs.iter().enumerate() {
            let location = format!("{}[{}]", location, i);
            let step = match config {
                StepConfig::Find {
                    search_space,
                    repeating_selector,
                    fields,
                    num_required,
                    include,
                } => {
                    let fields = self.fields(fields, &location)?;
                    if *num_required > fields.len() {
                        return Err(self.invalid(format!(
                            "{} requires {} fields but declares {}",
                            location,
                            num_required,
                            fields.len()
                        )));
                    }

                    let mut step = FindStep::new(
                        self.selector(repeating_selector, &format!("{}.repeating_selector", location))?,
                        fields,
                    )
                    .with_required(*num_required);
                    if let Some(raw) = search_space {
                        step = step
                            .with_search_space(self.selector(raw, &format!("{}.search_space", location))?);
                    }
                    step.include = include.clone();

                    available = step.produced_fields().map(str::to_string).collect();
                    if self.attach_source {
                        available.insert(SOURCE_FIELD.to_string());
                    }
                    Step::Find(step)
                }
                StepConfig::Follow {
                    link_field,
                    next_steps,
                } => {
                    if !available.contains(link_field) {
                        return Err(self.invalid(format!(
                            "{} follows field '{}', which no earlier step produces",
                            location, link_field
                        )));
                    }
                    let (next_steps, nested) =
                        self.chain(next_steps, &format!("{}.next_steps", location), HashSet::new())?;
                    available.extend(nested);

                    if i + 1 < configs.len() {
                        warn!(
                            "Target '{}': {} ends its chain, the {} step(s) after it never run",
                            self.target,
                            location,
                            configs.len() - i - 1
                        );
                    }

                    Step::Follow(FollowStep {
                        link_field: link_field.clone(),
                        next_steps,
                    })
                }
                StepConfig::DynamicFind {
                    search_space,
                    base_url,
                    category_id,
                    fields,
                    id_pattern,
                    extra_query,
                    pagination_selector,
                } => {
                    let step = self.dynamic_find(
                        &location,
                        search_space,
                        base_url,
                        &category_id.to_string(),
                        fields,
                        id_pattern,
                        extra_query.clone(),
                        pagination_selector.as_deref(),
                    )?;

                    available = step.fields.keys().cloned().collect();
                    available.insert("title".to_string());
                    available.insert("description".to_string());
                    if self.attach_source {
                        available.insert(SOURCE_FIELD.to_string());
                    }
                    Step::DynamicFind(step)
                }
            };
            steps.push(step);
        }

        Ok((steps.into(), available))
    }

    // Validates a derived-URL step: the base URL must be a web address, the
    // category id non-empty and the id pattern must capture the id
    #[allow(clippy::too_many_arguments)]
    fn dynamic_find(
        &self,
        location: &str,
        search_space: &str,
        base_url: &str,
        category_id: &str,
        fields: &IndexMap<String, String>,
        id_pattern: &str,
        extra_query: Option<String>,
        pagination_selector: Option<&str>,
    ) -> Result<DynamicFindStep, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| self.invalid(format!("{}.base_url '{}': {}", location, base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(self.invalid(format!("{}.base_url '{}' is not a web address", location, base_url)));
        }

        if category_id.trim().is_empty() {
            return Err(self.invalid(format!("{}.category_id is empty", location)));
        }

        let id_pattern = Regex::new(id_pattern)
            .map_err(|e| self.invalid(format!("{}.id_pattern: {}", location, e)))?;
        if id_pattern.captures_len() < 2 {
            return Err(self.invalid(format!(
                "{}.id_pattern needs a capture group for the id",
                location
            )));
        }

        let pagination_selector = pagination_selector
            .map(|raw| self.selector(raw, &format!("{}.pagination_selector", location)))
            .transpose()?;

        Ok(DynamicFindStep {
            search_space: self.selector(search_space, &format!("{}.search_space", location))?,
            base_url,
            category_id: category_id.trim().to_string(),
            fields: self.fields(fields, location)?,
            id_pattern,
            extra_query,
            pagination_selector,
        })
    }

    // Compiles the pagination strategy. `host` is the default link filter of
    // a recursive search
    fn pagination(&self, config: &PaginationConfig, host: &str) -> Result<Pagination, ConfigError> {
        let optional = |raw: &Option<String>, location: &str| {
            raw.as_deref()
                .map(|raw| self.selector(raw, location))
                .transpose()
        };

        Ok(match config {
            PaginationConfig::None => Pagination::None,
            PaginationConfig::EnumeratedLinks {
                search_space,
                link_selector,
            } => Pagination::EnumeratedLinks(EnumeratedLinks {
                search_space: optional(search_space, "pagination.search_space")?,
                link_selector: self.selector(link_selector, "pagination.link_selector")?,
            }),
            PaginationConfig::RecursiveSearch {
                search_space,
                link_selector,
                target_page_selector,
                max_depth,
                contains,
            } => {
                let contains = match contains.as_deref().map(str::trim) {
                    Some("") => return Err(self.invalid("pagination.contains is empty")),
                    Some(filter) => filter.to_string(),
                    None => host.to_string(),
                };
                Pagination::RecursiveSearch(RecursiveSearch {
                    search_space: optional(search_space, "pagination.search_space")?,
                    link_selector: self.selector(link_selector, "pagination.link_selector")?,
                    target_page_selector: optional(
                        target_page_selector,
                        "pagination.target_page_selector",
                    )?,
                    max_depth: *max_depth,
                    contains,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryId;

    fn find(fields: &[(&str, &str)], num_required: usize) -> StepConfig {
        StepConfig::Find {
            search_space: None,
            repeating_selector: "div.row".to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            num_required,
            include: IndexMap::new(),
        }
    }

    fn follow(link_field: &str, next_steps: Vec<StepConfig>) -> StepConfig {
        StepConfig::Follow {
            link_field: link_field.to_string(),
            next_steps,
        }
    }

    fn config(steps: Vec<StepConfig>) -> TargetConfig {
        TargetConfig {
            name: "catalog".to_string(),
            start_url: "https://example.edu/courses".to_string(),
            render: false,
            pagination: PaginationConfig::None,
            steps,
            attach_source: false,
        }
    }

    fn reason(err: ConfigError) -> String {
        match err {
            ConfigError::Invalid { reason, .. } => reason,
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_find_and_follow() {
        let target = CrawlTarget::try_from(config(vec![
            find(&[("title", "h3"), ("link", "a::attr(href)")], 1),
            follow("link", vec![find(&[("body", "p")], 0)]),
        ]))
        .unwrap();

        assert_eq!(target.steps.len(), 2);
        assert_eq!(target.steps[0].kind(), "find");
        let Step::Follow(step) = &target.steps[1] else {
            panic!("expected follow");
        };
        assert_eq!(step.next_steps.len(), 1);
    }

    #[test]
    fn test_recursive_search_contains_defaults_to_host() {
        let mut raw = config(vec![find(&[("title", "h3")], 0)]);
        raw.pagination = PaginationConfig::RecursiveSearch {
            search_space: None,
            link_selector: "a".to_string(),
            target_page_selector: Some("table.courses".to_string()),
            max_depth: 2,
            contains: None,
        };
        let target = CrawlTarget::try_from(raw).unwrap();

        let Pagination::RecursiveSearch(search) = &target.pagination else {
            panic!("expected recursive search");
        };
        assert_eq!(search.contains, "example.edu");
        assert_eq!(search.max_depth, 2);
    }

    #[test]
    fn test_follow_needs_a_producing_step() {
        let err = CrawlTarget::try_from(config(vec![
            find(&[("title", "h3")], 0),
            follow("link", Vec::new()),
        ]))
        .unwrap_err();
        assert!(reason(err).contains("'link'"));
    }

    #[test]
    fn test_steps_after_follow_are_kept_but_inert() {
        let target = CrawlTarget::try_from(config(vec![
            find(&[("title", "h3"), ("link", "a::attr(href)")], 1),
            follow("link", Vec::new()),
            find(&[("ad", "span")], 1),
        ]))
        .unwrap();
        assert_eq!(target.steps.len(), 3);
        assert_eq!(target.steps[1].kind(), "follow");
    }

    #[test]
    fn test_follow_may_read_source_when_attached() {
        let mut raw = config(vec![find(&[("title", "h3")], 0), follow("source", Vec::new())]);
        assert!(CrawlTarget::try_from(raw.clone()).is_err());
        raw.attach_source = true;
        assert!(CrawlTarget::try_from(raw).is_ok());
    }

    #[test]
    fn test_bad_selector_reports_location() {
        let err = CrawlTarget::try_from(config(vec![find(&[("title", "xpath://h3[")], 0)]))
            .unwrap_err();
        let ConfigError::Selector { location, .. } = err else {
            panic!("expected selector error");
        };
        assert_eq!(location, "steps[0].fields.title");
    }

    #[test]
    fn test_start_url_without_host_rejected() {
        let mut raw = config(vec![find(&[("title", "h3")], 0)]);
        raw.start_url = "file:///tmp/page.html".to_string();
        assert!(reason(CrawlTarget::try_from(raw).unwrap_err()).contains("no host"));
    }

    #[test]
    fn test_missing_steps_rejected() {
        assert!(reason(CrawlTarget::try_from(config(Vec::new())).unwrap_err()).contains("no steps"));
    }

    #[test]
    fn test_name_must_be_file_safe() {
        let mut raw = config(vec![find(&[("title", "h3")], 0)]);
        raw.name = "../escape".to_string();
        assert!(CrawlTarget::try_from(raw).is_err());
    }

    #[test]
    fn test_required_count_bounded_by_fields() {
        let err = CrawlTarget::try_from(config(vec![find(&[("title", "h3")], 2)])).unwrap_err();
        assert!(reason(err).contains("requires 2"));
    }

    #[test]
    fn test_dynamic_find_pattern_needs_group() {
        let step = StepConfig::DynamicFind {
            search_space: "a".to_string(),
            base_url: "https://example.edu/ajax/preview.php".to_string(),
            category_id: CategoryId::Number(34),
            fields: [("title".to_string(), "h3".to_string())].into_iter().collect(),
            id_pattern: r"coid=\d+".to_string(),
            extra_query: None,
            pagination_selector: None,
        };
        let err = CrawlTarget::try_from(config(vec![step])).unwrap_err();
        assert!(reason(err).contains("capture group"));
    }
}
