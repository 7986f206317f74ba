//! Relation include lists from query parameters.
//!
//! Clients may send `?includes=posts,roles` or `?include=posts` (or both).
//! The lists are merged in that order, trimmed, stripped of empty entries
//! and deduplicated keeping the first occurrence.

use serde::Deserialize;

/// Query parameters carrying include lists.
///
/// ```rust,ignore
/// async fn show(Query(params): Query<IncludeParams>) -> ApiResult<ApiResponse> {
///     let includes = params.parse();
///     ...
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IncludeParams {
    #[serde(default)]
    pub includes: Option<String>,
    #[serde(default)]
    pub include: Option<String>,
}

impl IncludeParams {
    pub fn parse(&self) -> Vec<String> {
        parse_includes(self.includes.as_deref(), self.include.as_deref())
    }
}

pub fn parse_includes(includes: Option<&str>, include: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in [includes, include]
        .into_iter()
        .flatten()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_both_parameters_in_order() {
        assert_eq!(
            parse_includes(Some("posts,roles"), Some("profile")),
            vec!["posts", "roles", "profile"]
        );
    }

    #[test]
    fn test_drops_empty_entries_and_duplicates() {
        assert_eq!(
            parse_includes(Some("posts,, roles ,"), Some("roles,posts.author")),
            vec!["posts", "roles", "posts.author"]
        );
        assert!(parse_includes(Some(""), None).is_empty());
        assert!(parse_includes(None, None).is_empty());
    }

    #[test]
    fn test_params_parse() {
        let params = IncludeParams {
            includes: None,
            include: Some("roles".into()),
        };
        assert_eq!(params.parse(), vec!["roles"]);
    }
}
