//! Per-entity configuration.
//!
//! Everything the query engine needs to know about one entity collection is
//! data in this registry: default sort field, the structured pre-filter
//! parameters the routing layer accepts, the group-by allow-list, the
//! default search projection, and which related entities a detail request
//! may hydrate. The registry is built at startup and handed to the engine,
//! so alternate configurations can coexist in tests.

use std::collections::HashMap;

use crate::query::Predicate;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Works,
    Authors,
    Concepts,
    Institutions,
    Publishers,
    Sources,
    Topics,
    Fields,
    Subfields,
    Domains,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Works,
        EntityKind::Authors,
        EntityKind::Concepts,
        EntityKind::Institutions,
        EntityKind::Publishers,
        EntityKind::Sources,
        EntityKind::Topics,
        EntityKind::Fields,
        EntityKind::Subfields,
        EntityKind::Domains,
    ];

    /// Collection name: lower-case plural.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Works => "works",
            EntityKind::Authors => "authors",
            EntityKind::Concepts => "concepts",
            EntityKind::Institutions => "institutions",
            EntityKind::Publishers => "publishers",
            EntityKind::Sources => "sources",
            EntityKind::Topics => "topics",
            EntityKind::Fields => "fields",
            EntityKind::Subfields => "subfields",
            EntityKind::Domains => "domains",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            EntityKind::Works => "work",
            EntityKind::Authors => "author",
            EntityKind::Concepts => "concept",
            EntityKind::Institutions => "institution",
            EntityKind::Publishers => "publisher",
            EntityKind::Sources => "source",
            EntityKind::Topics => "topic",
            EntityKind::Fields => "field",
            EntityKind::Subfields => "subfield",
            EntityKind::Domains => "domain",
        }
    }

    pub fn parse(name: &str) -> Option<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.collection() == name)
    }
}

/// Coercion rule for one structured pre-filter parameter: what the raw query
/// parameter means and which document path it targets.
#[derive(Debug, Clone, Copy)]
pub enum PreFilterRule {
    /// Case-insensitive substring match.
    Contains(&'static str),
    /// Integer equality; unparseable values drop the parameter.
    IntEquals(&'static str),
    StrEquals(&'static str),
    UppercaseEquals(&'static str),
    LowercaseEquals(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct PreFilterField {
    pub name: &'static str,
    pub rule: PreFilterRule,
}

impl PreFilterField {
    pub fn predicate(&self, raw: &str) -> Option<Predicate> {
        match self.rule {
            PreFilterRule::Contains(path) => Some(Predicate::Matches {
                path: path.to_string(),
                pattern: raw.to_string(),
            }),
            PreFilterRule::IntEquals(path) => match raw.parse::<i64>() {
                Ok(n) => Some(Predicate::Equals {
                    path: path.to_string(),
                    value: Value::from(n),
                }),
                Err(_) => {
                    tracing::debug!(
                        parameter = self.name,
                        value = raw,
                        "dropping non-integer pre-filter value"
                    );
                    None
                }
            },
            PreFilterRule::StrEquals(path) => Some(Predicate::Equals {
                path: path.to_string(),
                value: Value::String(raw.to_string()),
            }),
            PreFilterRule::UppercaseEquals(path) => Some(Predicate::Equals {
                path: path.to_string(),
                value: Value::String(raw.to_uppercase()),
            }),
            PreFilterRule::LowercaseEquals(path) => Some(Predicate::Equals {
                path: path.to_string(),
                value: Value::String(raw.to_lowercase()),
            }),
        }
    }
}

const NAME_FILTER: PreFilterField = PreFilterField {
    name: "name",
    rule: PreFilterRule::Contains("display_name"),
};

#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub kind: EntityKind,
    pub default_sort_field: &'static str,
    pub pre_filters: &'static [PreFilterField],
    pub group_by_fields: &'static [&'static str],
    /// Default projection for search results.
    pub search_fields: &'static [&'static str],
    /// Document field on works pointing back at this entity, for hydrating a
    /// related-works list. None for works themselves.
    pub related_works_key: Option<&'static str>,
    /// Works store contributor id lists (`_author_ids`, `_concept_ids`) that
    /// a detail request may hydrate.
    pub hydrates_contributors: bool,
}

pub struct EntityRegistry {
    configs: HashMap<EntityKind, EntityConfig>,
}

impl EntityRegistry {
    /// The standard per-entity configuration.
    pub fn standard() -> Self {
        let mut configs = HashMap::new();
        for kind in EntityKind::ALL {
            configs.insert(kind, standard_config(kind));
        }
        Self { configs }
    }

    pub fn config(&self, kind: EntityKind) -> &EntityConfig {
        self.configs
            .get(&kind)
            .expect("registry covers every entity kind")
    }
}

fn standard_config(kind: EntityKind) -> EntityConfig {
    match kind {
        EntityKind::Works => EntityConfig {
            kind,
            default_sort_field: "cited_by_count",
            pre_filters: &[
                PreFilterField {
                    name: "title",
                    rule: PreFilterRule::Contains("title"),
                },
                PreFilterField {
                    name: "year",
                    rule: PreFilterRule::IntEquals("publication_year"),
                },
                PreFilterField {
                    name: "type",
                    rule: PreFilterRule::StrEquals("type"),
                },
            ],
            group_by_fields: &[
                "publication_year",
                "type",
                "language",
                "open_access.is_oa",
                "is_retracted",
            ],
            search_fields: &[
                "title",
                "publication_year",
                "authorships",
                "type",
                "_citation_key",
            ],
            related_works_key: None,
            hydrates_contributors: true,
        },
        EntityKind::Authors => EntityConfig {
            kind,
            default_sort_field: "cited_by_count",
            pre_filters: &[NAME_FILTER],
            group_by_fields: &["has_orcid", "last_known_institutions.country_code"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("author_ids"),
            hydrates_contributors: false,
        },
        EntityKind::Concepts => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[
                NAME_FILTER,
                PreFilterField {
                    name: "level",
                    rule: PreFilterRule::IntEquals("level"),
                },
            ],
            group_by_fields: &["level"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("concept_ids"),
            hydrates_contributors: false,
        },
        EntityKind::Institutions => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[
                NAME_FILTER,
                PreFilterField {
                    name: "country",
                    rule: PreFilterRule::UppercaseEquals("country_code"),
                },
            ],
            group_by_fields: &["country_code", "type"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("institution_ids"),
            hydrates_contributors: false,
        },
        EntityKind::Publishers => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[NAME_FILTER],
            group_by_fields: &["hierarchy_level", "country_codes"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("publisher_id"),
            hydrates_contributors: false,
        },
        EntityKind::Sources => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[
                NAME_FILTER,
                PreFilterField {
                    name: "type",
                    rule: PreFilterRule::LowercaseEquals("type"),
                },
            ],
            group_by_fields: &["type", "country_code"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("source_id"),
            hydrates_contributors: false,
        },
        EntityKind::Topics => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[NAME_FILTER],
            group_by_fields: &["domain.id", "field.id"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("topic_id"),
            hydrates_contributors: false,
        },
        EntityKind::Fields => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[NAME_FILTER],
            group_by_fields: &["domain.id"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("field_id"),
            hydrates_contributors: false,
        },
        EntityKind::Subfields => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[NAME_FILTER],
            group_by_fields: &["field.id"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("subfield_id"),
            hydrates_contributors: false,
        },
        EntityKind::Domains => EntityConfig {
            kind,
            default_sort_field: "works_count",
            pre_filters: &[NAME_FILTER],
            group_by_fields: &["display_name"],
            search_fields: &["display_name", "works_count"],
            related_works_key: Some("domain_id"),
            hydrates_contributors: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_covers_all_kinds() {
        let registry = EntityRegistry::standard();
        for kind in EntityKind::ALL {
            assert_eq!(registry.config(kind).kind, kind);
        }
    }

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.collection()), Some(kind));
        }
        assert_eq!(EntityKind::parse("journals"), None);
    }

    #[test]
    fn test_default_sort_fields() {
        let registry = EntityRegistry::standard();
        assert_eq!(
            registry.config(EntityKind::Works).default_sort_field,
            "cited_by_count"
        );
        assert_eq!(
            registry.config(EntityKind::Authors).default_sort_field,
            "cited_by_count"
        );
        assert_eq!(
            registry.config(EntityKind::Concepts).default_sort_field,
            "works_count"
        );
    }

    #[test]
    fn test_pre_filter_coercion() {
        let year = PreFilterField {
            name: "year",
            rule: PreFilterRule::IntEquals("publication_year"),
        };
        let pred = year.predicate("2021").unwrap();
        assert_eq!(pred.to_query_doc(), json!({"publication_year": 2021}));
        assert!(year.predicate("not-a-year").is_none());

        let country = PreFilterField {
            name: "country",
            rule: PreFilterRule::UppercaseEquals("country_code"),
        };
        let pred = country.predicate("us").unwrap();
        assert_eq!(pred.to_query_doc(), json!({"country_code": "US"}));

        let name = NAME_FILTER.predicate("harvard").unwrap();
        assert_eq!(
            name.to_query_doc(),
            json!({"display_name": {"$regex": "harvard", "$options": "i"}})
        );
    }
}
