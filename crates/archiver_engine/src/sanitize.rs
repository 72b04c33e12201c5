use std::collections::HashSet;

use archiver_logging::archive_trace;
use ego_tree::NodeId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::markup::Document;

/// Publisher-specific cleaning rules. Loaded from configuration as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Attribute names to drop. A trailing `*` matches a prefix (`data-*`).
    pub remove_attributes: Vec<String>,
    /// Element names removed together with their content.
    pub remove_elements: Vec<String>,
    /// Class names removed from `class` attributes; the element stays.
    pub strip_classes: Vec<String>,
    /// Regexes over single class names; a matching element is removed.
    pub remove_class_patterns: Vec<String>,
    /// Substrings that mark an href as pointing into the corpus.
    pub internal_link_patterns: Vec<String>,
    /// CSS selectors tried in order to find the article body.
    pub content_selectors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid class pattern `{pattern}`: {source}")]
    ClassPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid content selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
}

/// An `<img>` whose source can be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub node: NodeId,
    /// The `src` value as written in the markup.
    pub raw: String,
    /// `raw` resolved to an absolute URL.
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Sanitized {
    pub document: Document,
    /// Every fetchable image in document order, duplicates kept.
    pub images: Vec<ImageRef>,
    /// Every internal href in document order, duplicates kept.
    pub internal_links: Vec<String>,
}

/// A [`RuleSet`] compiled once and shared by every post of a run.
#[derive(Debug)]
pub struct Sanitizer {
    exact_attributes: HashSet<String>,
    attribute_prefixes: Vec<String>,
    remove_elements: HashSet<String>,
    strip_classes: HashSet<String>,
    class_patterns: Vec<Regex>,
    internal_patterns: Vec<String>,
}

impl Sanitizer {
    pub fn new(rules: &RuleSet) -> Result<Self, RuleError> {
        let mut exact_attributes = HashSet::new();
        let mut attribute_prefixes = Vec::new();
        for name in &rules.remove_attributes {
            match name.strip_suffix('*') {
                Some(prefix) => attribute_prefixes.push(prefix.to_ascii_lowercase()),
                None => {
                    exact_attributes.insert(name.to_ascii_lowercase());
                }
            }
        }

        let class_patterns = rules
            .remove_class_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| RuleError::ClassPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            exact_attributes,
            attribute_prefixes,
            remove_elements: rules
                .remove_elements
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
            strip_classes: rules.strip_classes.iter().cloned().collect(),
            class_patterns,
            internal_patterns: rules
                .internal_link_patterns
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
        })
    }

    pub fn is_internal(&self, href: &str) -> bool {
        self.internal_patterns.iter().any(|p| href.contains(p.as_str()))
    }

    /// Cleans `html` and reports the image and internal-link references left in it.
    ///
    /// Element removal runs first so references inside removed subtrees are
    /// never reported. Relative image sources are resolved against `base_url`;
    /// `data:` URIs and relative sources without a base are left alone.
    pub fn sanitize(&self, html: &str, base_url: Option<&str>) -> Sanitized {
        let mut document = Document::parse(html);
        let base = base_url.and_then(|b| Url::parse(b).ok());

        let doomed: Vec<NodeId> = document
            .node_ids()
            .into_iter()
            .filter(|&id| {
                document.element(id).is_some_and(|el| {
                    self.remove_elements.contains(&el.name)
                        || el
                            .classes()
                            .any(|class| self.class_patterns.iter().any(|re| re.is_match(class)))
                })
            })
            .collect();
        for id in doomed {
            document.detach(id);
        }

        let mut images = Vec::new();
        let mut internal_links = Vec::new();
        for id in document.node_ids() {
            document.edit_element(id, |el| {
                el.retain_attrs(|name| !self.removes_attribute(name));
                self.strip_class_names(el);

                match el.name.as_str() {
                    "img" => {
                        if let Some(raw) = el.attr("src") {
                            match resolve_image_url(raw, base.as_ref()) {
                                Some(url) => images.push(ImageRef {
                                    node: id,
                                    raw: raw.to_string(),
                                    url,
                                }),
                                None => archive_trace!("leaving image source {raw} as is"),
                            }
                        }
                    }
                    "a" => {
                        if let Some(href) = el.attr("href") {
                            if self.is_internal(href) {
                                internal_links.push(href.trim().to_string());
                            }
                        }
                    }
                    _ => {}
                }
            });
        }

        Sanitized {
            document,
            images,
            internal_links,
        }
    }

    fn removes_attribute(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.exact_attributes.contains(&name)
            || self
                .attribute_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()))
    }

    fn strip_class_names(&self, el: &mut crate::markup::ElementData) {
        if self.strip_classes.is_empty() || el.attr("class").is_none() {
            return;
        }
        let kept: Vec<&str> = el
            .classes()
            .filter(|class| !self.strip_classes.contains(*class))
            .collect();
        if kept.is_empty() {
            el.remove_attr("class");
        } else {
            let joined = kept.join(" ");
            el.set_attr("class", joined);
        }
    }
}

/// Absolute URL for an image source, or `None` when it cannot be fetched.
pub(crate) fn resolve_image_url(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.to_string()),
        Ok(_) => None,
        Err(_) => base.and_then(|b| b.join(raw).ok()).map(|u| u.to_string()),
    }
}
