use serde::{Deserialize, Serialize};
use shared::query::ColumnFilter;

/// Select value meaning "any make".
pub const ANY_MAKE: &str = "all";

/// Free-text car filter form as the user fills it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarFilterForm {
    pub make: String,
    pub min_year: String,
    pub max_year: String,
    pub min_price: String,
    pub max_price: String,
}

impl Default for CarFilterForm {
    fn default() -> Self {
        Self {
            make: ANY_MAKE.into(),
            min_year: String::new(),
            max_year: String::new(),
            min_price: String::new(),
            max_price: String::new(),
        }
    }
}

impl CarFilterForm {
    /// Fields that are blank or do not parse contribute no filter.
    pub fn to_column_filters(&self) -> Vec<ColumnFilter> {
        let mut filters = Vec::new();

        let make = self.make.trim();
        if !make.is_empty() && make != ANY_MAKE {
            filters.push(ColumnFilter::Equals {
                column: "make".into(),
                value: make.to_string(),
            });
        }
        if let Some(value) = whole(&self.min_year) {
            filters.push(at_least("year", value));
        }
        if let Some(value) = whole(&self.max_year) {
            filters.push(at_most("year", value));
        }
        // Prices are whole currency units; fractional bounds round inward.
        if let Some(value) = decimal(&self.min_price) {
            filters.push(at_least("price", value.ceil() as i64));
        }
        if let Some(value) = decimal(&self.max_price) {
            filters.push(at_most("price", value.floor() as i64));
        }
        filters
    }
}

fn whole(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn at_least(column: &str, value: i64) -> ColumnFilter {
    ColumnFilter::AtLeast {
        column: column.into(),
        value,
    }
}

fn at_most(column: &str, value: i64) -> ColumnFilter {
    ColumnFilter::AtMost {
        column: column.into(),
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_form_filters_nothing() {
        assert!(CarFilterForm::default().to_column_filters().is_empty());
    }

    #[test]
    fn filled_form_converts_in_field_order() {
        let form = CarFilterForm {
            make: "Honda".into(),
            min_year: "2010".into(),
            max_year: " 2020 ".into(),
            min_price: "1500.5".into(),
            max_price: "30000".into(),
        };
        assert_eq!(
            form.to_column_filters(),
            vec![
                ColumnFilter::Equals {
                    column: "make".into(),
                    value: "Honda".into()
                },
                at_least("year", 2010),
                at_most("year", 2020),
                at_least("price", 1501),
                at_most("price", 30000),
            ]
        );
    }

    #[test]
    fn unparsable_numbers_are_ignored() {
        let form = CarFilterForm {
            min_year: "twenty ten".into(),
            max_price: "NaN".into(),
            ..CarFilterForm::default()
        };
        assert!(form.to_column_filters().is_empty());
    }
}
