//! List/filter/paginate builder shared by every collection endpoint.
//!
//! Caller input only ever reaches SQL as bound parameters. Column names come
//! from the static whitelists of a [`ListSpec`].

mod page;

pub use page::{Page, PageMeta, Pagination, Stats, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use utoipa::IntoParams;

use crate::errors::AppResult;
use crate::ident::SequenceKind;

/// Raw list query string. Everything is optional and parsed leniently.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub role: Option<String>,
    pub featured: Option<String>,
    pub sort_column: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

impl ListParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "search" => &self.search,
            "status" => &self.status,
            "priority" => &self.priority,
            "category" => &self.category,
            "type" => &self.kind,
            "role" => &self.role,
            "featured" => &self.featured,
            _ => return None,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn search_term(&self) -> Option<&str> {
        self.get("search")
    }

    pub fn pagination(&self, default_page_size: u32) -> Pagination {
        Pagination::parse(self.page.as_deref(), self.page_size.as_deref(), default_page_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

/// Maps a raw query value onto a stored value; `None` means "ignore this filter".
pub type Normalizer = fn(&str) -> Option<FilterValue>;

#[derive(Clone)]
struct Filter {
    param: &'static str,
    column: &'static str,
    normalize: Normalizer,
}

/// Fixed predicate applied to every query of a spec.
#[derive(Debug, Clone)]
enum Scope {
    Eq(&'static str, FilterValue),
    /// SQL fragment with exactly one `?` placeholder.
    Bound(&'static str, FilterValue),
}

#[derive(Clone)]
pub struct ListSpec {
    table: &'static str,
    search_columns: &'static [&'static str],
    sequence: Option<SequenceKind>,
    filters: Vec<Filter>,
    scopes: Vec<Scope>,
    sortable: &'static [&'static str],
    default_page_size: u32,
}

impl ListSpec {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            search_columns: &[],
            sequence: None,
            filters: Vec::new(),
            scopes: Vec::new(),
            sortable: &[],
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn search(mut self, columns: &'static [&'static str]) -> Self {
        self.search_columns = columns;
        self
    }

    /// Makes numeric search terms match the sequential id exactly.
    pub fn sequence(mut self, kind: SequenceKind) -> Self {
        self.sequence = Some(kind);
        self
    }

    pub fn filter(mut self, param: &'static str, column: &'static str, normalize: Normalizer) -> Self {
        self.filters.push(Filter { param, column, normalize });
        self
    }

    pub fn scope_eq(mut self, column: &'static str, value: FilterValue) -> Self {
        self.scopes.push(Scope::Eq(column, value));
        self
    }

    pub fn scope_sql(mut self, fragment: &'static str, value: FilterValue) -> Self {
        self.scopes.push(Scope::Bound(fragment, value));
        self
    }

    pub fn sortable(mut self, columns: &'static [&'static str]) -> Self {
        self.sortable = columns;
        self
    }

    pub fn page_size(mut self, default_page_size: u32) -> Self {
        self.default_page_size = default_page_size;
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// `(column, direction)`; the column is replaced by `created_at` unless whitelisted.
    pub fn ordering(&self, params: &ListParams) -> (&'static str, &'static str) {
        let column = params
            .sort_column
            .as_deref()
            .map(str::trim)
            .and_then(|requested| self.sortable.iter().copied().find(|allowed| *allowed == requested))
            .unwrap_or("created_at");
        let direction = match params.sort_order.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            Some(order) if order == "asc" => "ASC",
            _ => "DESC",
        };
        (column, direction)
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>, params: &ListParams) {
        qb.push(" WHERE 1 = 1");

        for scope in &self.scopes {
            match scope {
                Scope::Eq(column, value) => {
                    qb.push(" AND ").push(*column).push(" = ");
                    push_value(qb, value.clone());
                }
                Scope::Bound(fragment, value) => {
                    let (head, tail) = fragment.split_once('?').unwrap_or((fragment, ""));
                    qb.push(" AND (").push(head);
                    push_value(qb, value.clone());
                    qb.push(tail).push(")");
                }
            }
        }

        if let Some(term) = params.search_term() {
            let pattern = format!("%{}%", escape_like(term));
            let mut first = true;
            qb.push(" AND (");
            for column in self.search_columns {
                if !first {
                    qb.push(" OR ");
                }
                first = false;
                qb.push(*column).push(" LIKE ");
                qb.push_bind(pattern.clone());
                qb.push(" ESCAPE '\\'");
            }
            if let Some(kind) = self.sequence {
                if !first {
                    qb.push(" OR ");
                }
                first = false;
                match kind.parse_number(term) {
                    Some(n) => {
                        qb.push("sample_id = ");
                        qb.push_bind(kind.format(n));
                    }
                    None => {
                        qb.push("sample_id LIKE ");
                        qb.push_bind(pattern.clone());
                        qb.push(" ESCAPE '\\'");
                    }
                }
            }
            if first {
                qb.push("1 = 1");
            }
            qb.push(")");
        }

        for filter in &self.filters {
            let Some(raw) = params.get(filter.param) else {
                continue;
            };
            match (filter.normalize)(raw) {
                Some(value) => {
                    qb.push(" AND ").push(filter.column).push(" = ");
                    push_value(qb, value);
                }
                None => {
                    tracing::debug!(table = self.table, param = filter.param, value = raw, "ignoring unknown filter value");
                }
            }
        }
    }

    pub async fn count(&self, pool: &SqlitePool, params: &ListParams) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", self.table));
        self.push_where(&mut qb, params);
        let total: i64 = qb.build_query_scalar().fetch_one(pool).await?;
        Ok(total)
    }

    pub async fn fetch_page<T>(&self, pool: &SqlitePool, params: &ListParams) -> AppResult<Page<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let pagination = params.pagination(self.default_page_size);
        let total = self.count(pool, params).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", self.table));
        self.push_where(&mut qb, params);
        self.push_order(&mut qb, params);
        qb.push(" LIMIT ");
        qb.push_bind(pagination.per_page as i64);
        qb.push(" OFFSET ");
        qb.push_bind(pagination.offset());

        let data = qb.build_query_as::<T>().fetch_all(pool).await?;
        Ok(Page::new(data, total, pagination))
    }

    /// Every matching row, ordered as the list would be. Used by exports.
    pub async fn fetch_all<T>(&self, pool: &SqlitePool, params: &ListParams) -> AppResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", self.table));
        self.push_where(&mut qb, params);
        self.push_order(&mut qb, params);
        Ok(qb.build_query_as::<T>().fetch_all(pool).await?)
    }

    fn push_order(&self, qb: &mut QueryBuilder<'_, Sqlite>, params: &ListParams) {
        let (column, direction) = self.ordering(params);
        qb.push(format!(" ORDER BY {column} {direction}, id {direction}"));
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: FilterValue) {
    match value {
        FilterValue::Text(text) => qb.push_bind(text),
        FilterValue::Int(n) => qb.push_bind(n),
    };
}

/// Escapes `%`, `_` and `\` for use with `LIKE ... ESCAPE '\'`.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Canonical form for lenient enum matching: trimmed, lowercase, spaces and hyphens as `_`.
pub fn filter_key(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn boolean_filter(raw: &str) -> Option<FilterValue> {
    match filter_key(raw).as_str() {
        "1" | "true" | "yes" | "on" => Some(FilterValue::Int(1)),
        "0" | "false" | "no" | "off" => Some(FilterValue::Int(0)),
        _ => None,
    }
}

/// Unfiltered counts: `total` plus one entry per `(key, stored value)` bucket.
pub async fn count_by(
    pool: &SqlitePool,
    table: &'static str,
    column: &'static str,
    buckets: &[(&'static str, &'static str)],
) -> AppResult<Stats> {
    let mut stats = Stats::new();

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    stats.insert("total".to_string(), total);

    let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
        "SELECT CAST({column} AS TEXT), COUNT(*) FROM {table} GROUP BY {column}"
    ))
    .fetch_all(pool)
    .await?;

    for (key, stored) in buckets {
        let count = rows
            .iter()
            .find(|(value, _)| value == stored)
            .map(|(_, count)| *count)
            .unwrap_or(0);
        stats.insert(key.to_string(), count);
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(sort_column: Option<&str>, sort_order: Option<&str>) -> ListParams {
        ListParams {
            sort_column: sort_column.map(String::from),
            sort_order: sort_order.map(String::from),
            ..ListParams::default()
        }
    }

    #[test]
    fn ordering_rejects_unlisted_columns() {
        let spec = ListSpec::new("complaints").sortable(&["full_name", "created_at"]);
        assert_eq!(spec.ordering(&params(Some("full_name"), Some("ASC"))), ("full_name", "ASC"));
        assert_eq!(
            spec.ordering(&params(Some("id; DROP TABLE users"), Some("asc"))),
            ("created_at", "ASC")
        );
        assert_eq!(spec.ordering(&params(None, Some("sideways"))), ("created_at", "DESC"));
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn filter_keys_are_lenient() {
        assert_eq!(filter_key(" In Review "), "in_review");
        assert_eq!(filter_key("press-release"), "press_release");
    }

    #[test]
    fn blank_params_are_absent() {
        let p = ListParams {
            status: Some("   ".into()),
            search: Some(" ada ".into()),
            ..ListParams::default()
        };
        assert_eq!(p.get("status"), None);
        assert_eq!(p.search_term(), Some("ada"));
        assert_eq!(p.get("unknown"), None);
    }

    #[test]
    fn boolean_filter_accepts_common_spellings() {
        assert_eq!(boolean_filter("TRUE"), Some(FilterValue::Int(1)));
        assert_eq!(boolean_filter("0"), Some(FilterValue::Int(0)));
        assert_eq!(boolean_filter("maybe"), None);
    }
}
