//! List query-string parsing: pagination, ordering, bracketed filters and search.

use tessera_core::{AppError, AppResult};
use tessera_domain::{FilterItem, FilterSchema, PaddingSchema, SearchItem, SearchSchema, SortSchema};

/// Parsed list endpoint parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub padding: PaddingSchema,
    pub sort: SortSchema,
    pub search: Option<SearchSchema>,
    pub filter: Option<FilterSchema>,
    pub select_load: Vec<String>,
}

impl ListQuery {
    /// Parses raw query pairs in arrival order; unknown keys are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> AppResult<Self> {
        let mut offset = 0_u64;
        let mut limit = PaddingSchema::default().limit();
        let mut sort = SortSchema::default();
        let mut filter = FilterSchema::default();
        let mut search = SearchSchema::default();
        let mut select_load = Vec::new();

        for (key, value) in pairs {
            let (base, subkeys) = split_key(key);
            match base {
                "offset" => offset = parse_number(key, value)?,
                "limit" => limit = parse_number(key, value)?,
                "sort_field" => sort.sort_field = value.trim().to_owned(),
                "desc" => sort.desc = parse_flag(key, value)?,
                "sort_case_ids" => {
                    let ids = split_list(value)
                        .iter()
                        .map(|id| parse_number(key, id))
                        .collect::<AppResult<Vec<i64>>>()?;
                    sort.sort_case_ids = (!ids.is_empty()).then_some(ids);
                }
                "select_load" => select_load.extend(split_list(value)),
                "filters_or" => filter.filters_or.push(filter_item(key, subkeys, value)?),
                "filters_and" => filter.filters_and.push(filter_item(key, subkeys, value)?),
                "search" => search.search.push(search_item(key, subkeys, value)?),
                _ => {}
            }
        }

        Ok(Self {
            padding: PaddingSchema::new(offset, limit)?,
            sort,
            search: search.into_usable(),
            filter: (!filter.is_empty()).then_some(filter),
            select_load,
        })
    }
}

/// Splits a comma separated value, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Splits `base[a][b]` into `base` and its subkeys.
///
/// Keys that are not well-formed bracket chains are returned whole with no
/// subkeys.
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };

    let (base, mut rest) = key.split_at(open);
    let mut subkeys = Vec::new();
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return (key, Vec::new());
        };
        let subkey = &inner[..close];
        if subkey.is_empty() || subkey.contains('[') {
            return (key, Vec::new());
        }
        subkeys.push(subkey);
        rest = &inner[close + 1..];
    }

    if !rest.is_empty() || base.is_empty() {
        return (key, Vec::new());
    }

    (base, subkeys)
}

fn filter_item(key: &str, mut subkeys: Vec<&str>, value: &str) -> AppResult<FilterItem> {
    if subkeys.len() == 2 && subkeys[1].bytes().all(|byte| byte.is_ascii_digit()) {
        subkeys.pop();
    }

    match subkeys.as_slice() {
        [attribute] => Ok(FilterItem::coerced(*attribute, value)),
        [relation, attribute] => Ok(FilterItem::nested(
            *relation,
            FilterItem::coerced(*attribute, value),
        )),
        _ => Err(malformed(key)),
    }
}

fn search_item(key: &str, subkeys: Vec<&str>, value: &str) -> AppResult<SearchItem> {
    match subkeys.as_slice() {
        [attribute] => Ok(SearchItem::text(*attribute, value)),
        [relation, attribute] => Ok(SearchItem::nested(
            *relation,
            SearchItem::text(*attribute, value),
        )),
        _ => Err(malformed(key)),
    }
}

fn malformed(key: &str) -> AppError {
    AppError::Validation(format!(
        "query parameter '{key}' must name an attribute as key[attribute] or key[relation][attribute]"
    ))
}

fn parse_number<N: std::str::FromStr>(key: &str, value: &str) -> AppResult<N> {
    value.trim().parse::<N>().map_err(|_| {
        AppError::Validation(format!(
            "query parameter '{key}' expects a number, got '{value}'"
        ))
    })
}

fn parse_flag(key: &str, value: &str) -> AppResult<bool> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "query parameter '{key}' expects true or false, got '{value}'"
        ))),
    }
}
