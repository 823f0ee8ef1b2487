use serde::{Deserialize, Serialize};

/// Restriction on a single named column, applied on top of the free-text filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ColumnFilter {
    Equals { column: String, value: String },
    AtLeast { column: String, value: i64 },
    AtMost { column: String, value: i64 },
}

impl ColumnFilter {
    pub fn column(&self) -> &str {
        match self {
            ColumnFilter::Equals { column, .. }
            | ColumnFilter::AtLeast { column, .. }
            | ColumnFilter::AtMost { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based.
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.number.saturating_sub(1)) * u64::from(self.size)
    }
}

/// Descriptor handed to the store for one load. Plain data, rebuilt per call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCriteria {
    pub filter: Option<String>,
    pub sort_field: Option<String>,
    pub descending: bool,
    #[serde(default)]
    pub column_filters: Vec<ColumnFilter>,
    #[serde(default)]
    pub page: Option<PageRequest>,
}

impl QueryCriteria {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(text: impl Into<String>) -> Self {
        Self {
            filter: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn sorted(field: impl Into<String>, descending: bool) -> Self {
        Self {
            sort_field: Some(field.into()),
            descending,
            ..Self::default()
        }
    }

    /// `None` when the filter is absent or empty; an empty filter matches everything.
    pub fn effective_filter(&self) -> Option<&str> {
        self.filter.as_deref().filter(|text| !text.is_empty())
    }

    pub fn effective_sort_field(&self) -> Option<&str> {
        self.sort_field
            .as_deref()
            .map(str::trim)
            .filter(|field| !field.is_empty())
    }
}

/// One page of query results plus the size of the whole filtered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: u64,
}

pub fn total_pages(total_items: u64, page_size: u32) -> u32 {
    if total_items == 0 || page_size == 0 {
        return 1;
    }
    let pages = total_items.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_never_drops_below_one() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(5, 0), 1);
    }

    #[test]
    fn column_filters_are_tagged_by_operator() {
        let filter = ColumnFilter::AtLeast {
            column: "year".into(),
            value: 2015,
        };
        let json = serde_json::to_value(&filter).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"op": "at_least", "column": "year", "value": 2015})
        );
    }

    #[test]
    fn criteria_without_filters_deserialize_from_minimal_json() {
        let criteria: QueryCriteria =
            serde_json::from_str(r#"{"filter":"an","sort_field":null,"descending":true}"#)
                .expect("deserialize");
        assert_eq!(criteria.effective_filter(), Some("an"));
        assert!(criteria.column_filters.is_empty());
        assert_eq!(criteria.page, None);
    }
}
