/// Sentinel sort field meaning "order by search relevance score". Only
/// meaningful inside a search operation.
pub const RELEVANCE_SORT_FIELD: &str = "relevance_score";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Field(String, SortDirection),
    Relevance,
}

/// Parsed `sort` parameter: an ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    /// Parses `field:asc|desc` comma lists. An unknown or omitted direction
    /// defaults to descending.
    pub fn parse(param: Option<&str>) -> SortSpec {
        let Some(param) = param else {
            return SortSpec::default();
        };
        let keys = param
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                let (field, direction) = match token.split_once(':') {
                    Some((field, dir)) if dir.trim().eq_ignore_ascii_case("asc") => {
                        (field.trim(), SortDirection::Ascending)
                    }
                    Some((field, _)) => (field.trim(), SortDirection::Descending),
                    None => (token, SortDirection::Descending),
                };
                if field == RELEVANCE_SORT_FIELD {
                    SortKey::Relevance
                } else {
                    SortKey::Field(field.to_string(), direction)
                }
            })
            .collect();
        SortSpec { keys }
    }

    /// Sort order for a plain listing. The relevance sentinel is invalid
    /// here: it is filtered out, and if nothing remains the entity's default
    /// field applies, descending.
    pub fn listing_order(&self, default_field: &str) -> Vec<(String, SortDirection)> {
        let fields: Vec<(String, SortDirection)> = self
            .keys
            .iter()
            .filter_map(|key| match key {
                SortKey::Field(name, dir) => Some((name.clone(), *dir)),
                SortKey::Relevance => {
                    tracing::debug!("dropping relevance_score sort outside a search operation");
                    None
                }
            })
            .collect();
        if fields.is_empty() {
            vec![(default_field.to_string(), SortDirection::Descending)]
        } else {
            fields
        }
    }

    /// Explicit field order for a search operation, or None to keep the
    /// default relevance ordering.
    pub fn search_order(&self) -> Option<Vec<(String, SortDirection)>> {
        let fields: Vec<(String, SortDirection)> = self
            .keys
            .iter()
            .filter_map(|key| match key {
                SortKey::Field(name, dir) => Some((name.clone(), *dir)),
                SortKey::Relevance => None,
            })
            .collect();
        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directions() {
        let spec = SortSpec::parse(Some("cited_by_count:desc,publication_year:asc"));
        assert_eq!(
            spec.keys,
            vec![
                SortKey::Field("cited_by_count".into(), SortDirection::Descending),
                SortKey::Field("publication_year".into(), SortDirection::Ascending),
            ]
        );
    }

    #[test]
    fn test_omitted_direction_defaults_to_descending() {
        let spec = SortSpec::parse(Some("works_count"));
        assert_eq!(
            spec.keys,
            vec![SortKey::Field("works_count".into(), SortDirection::Descending)]
        );
    }

    #[test]
    fn test_unknown_direction_defaults_to_descending() {
        let spec = SortSpec::parse(Some("works_count:sideways"));
        assert_eq!(
            spec.keys,
            vec![SortKey::Field("works_count".into(), SortDirection::Descending)]
        );
    }

    #[test]
    fn test_relevance_sentinel() {
        let spec = SortSpec::parse(Some("relevance_score"));
        assert_eq!(spec.keys, vec![SortKey::Relevance]);
        assert!(spec.search_order().is_none());
    }

    #[test]
    fn test_listing_drops_relevance_and_falls_back() {
        let spec = SortSpec::parse(Some("relevance_score"));
        assert_eq!(
            spec.listing_order("works_count"),
            vec![("works_count".to_string(), SortDirection::Descending)]
        );
    }

    #[test]
    fn test_listing_keeps_other_fields_when_relevance_dropped() {
        let spec = SortSpec::parse(Some("relevance_score,cited_by_count:asc"));
        assert_eq!(
            spec.listing_order("works_count"),
            vec![("cited_by_count".to_string(), SortDirection::Ascending)]
        );
    }

    #[test]
    fn test_absent_parameter_uses_default() {
        let spec = SortSpec::parse(None);
        assert_eq!(
            spec.listing_order("cited_by_count"),
            vec![("cited_by_count".to_string(), SortDirection::Descending)]
        );
    }
}
