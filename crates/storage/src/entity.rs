use shared::domain::{Car, CarDraft, CarId, Customer, CustomerDraft, CustomerId, Gender};
use sqlx::{sqlite::SqliteRow, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Integer,
        }
    }
}

pub const ID_COLUMN: Column = Column::integer("id");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
}

/// Table metadata and row mapping for a persisted record kind.
pub trait Entity: Clone + Send + Sync + Unpin + 'static {
    type Draft: Clone + Send + Sync + 'static;

    /// Lowercase human name, used in messages and log fields.
    const KIND: &'static str;
    const TABLE: &'static str;
    /// Writable columns in declaration order. `id` is store-assigned and not listed.
    const COLUMNS: &'static [Column];
    /// Columns the free-text filter matches against. Each has a `<name>_folded`
    /// shadow column in the schema.
    const SEARCH_COLUMNS: &'static [&'static str];
    /// Column whose value must be unique across the table, if any.
    const BUSINESS_KEY: Option<&'static str>;

    fn id(&self) -> i64;
    fn label(&self) -> String;
    fn from_draft(id: i64, draft: Self::Draft) -> Self;
    /// Values for `COLUMNS`, same order.
    fn draft_values(draft: &Self::Draft) -> Vec<SqlValue>;
    fn draft_business_key(draft: &Self::Draft) -> Option<&str>;
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error>;

    fn column(name: &str) -> Option<Column> {
        if name == ID_COLUMN.name {
            return Some(ID_COLUMN);
        }
        Self::COLUMNS.iter().find(|column| column.name == name).copied()
    }
}

/// Case folding shared by stored search text and filter text. SQLite's own
/// `LOWER` only folds ASCII.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Shadow column holding the folded copy of a search column.
pub fn folded_column(name: &str) -> String {
    format!("{name}_folded")
}

/// `(shadow column, folded text)` for every search column of `draft`.
pub(crate) fn folded_values<E: Entity>(draft: &E::Draft) -> Vec<(String, String)> {
    E::COLUMNS
        .iter()
        .zip(E::draft_values(draft))
        .filter_map(|(column, value)| match value {
            SqlValue::Text(text) if E::SEARCH_COLUMNS.contains(&column.name) => {
                Some((folded_column(column.name), fold_case(&text)))
            }
            _ => None,
        })
        .collect()
}

pub(crate) fn select_list<E: Entity>() -> String {
    std::iter::once(ID_COLUMN.name)
        .chain(E::COLUMNS.iter().map(|column| column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Entity for Customer {
    type Draft = CustomerDraft;

    const KIND: &'static str = "customer";
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static [Column] = &[
        Column::text("customer_name"),
        Column::text("email"),
        Column::integer("age"),
        Column::text("gender"),
        Column::text("location"),
        Column::text("job"),
        Column::integer("salary"),
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["customer_name"];
    const BUSINESS_KEY: Option<&'static str> = Some("email");

    fn id(&self) -> i64 {
        self.id.0
    }

    fn label(&self) -> String {
        self.customer_name.clone()
    }

    fn from_draft(id: i64, draft: CustomerDraft) -> Self {
        Customer::from_draft(CustomerId(id), draft)
    }

    fn draft_values(draft: &CustomerDraft) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(draft.customer_name.clone()),
            SqlValue::Text(draft.email.clone()),
            SqlValue::Integer(draft.age),
            SqlValue::Text(draft.gender.as_str().to_string()),
            SqlValue::Text(draft.location.clone()),
            SqlValue::Text(draft.job.clone()),
            SqlValue::Integer(draft.salary),
        ]
    }

    fn draft_business_key(draft: &CustomerDraft) -> Option<&str> {
        Some(&draft.email)
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let gender: String = row.try_get("gender")?;
        let gender = Gender::parse(&gender).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "gender".into(),
            source: format!("unknown gender '{gender}'").into(),
        })?;
        Ok(Customer {
            id: CustomerId(row.try_get("id")?),
            customer_name: row.try_get("customer_name")?,
            email: row.try_get("email")?,
            age: row.try_get("age")?,
            gender,
            location: row.try_get("location")?,
            job: row.try_get("job")?,
            salary: row.try_get("salary")?,
        })
    }
}

impl Entity for Car {
    type Draft = CarDraft;

    const KIND: &'static str = "car";
    const TABLE: &'static str = "cars";
    const COLUMNS: &'static [Column] = &[
        Column::text("make"),
        Column::text("model"),
        Column::text("version"),
        Column::integer("year"),
        Column::integer("price"),
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["make", "model", "version"];
    const BUSINESS_KEY: Option<&'static str> = None;

    fn id(&self) -> i64 {
        self.id.0
    }

    fn label(&self) -> String {
        format!("{} {}", self.make, self.model)
    }

    fn from_draft(id: i64, draft: CarDraft) -> Self {
        Car::from_draft(CarId(id), draft)
    }

    fn draft_values(draft: &CarDraft) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(draft.make.clone()),
            SqlValue::Text(draft.model.clone()),
            SqlValue::Text(draft.version.clone()),
            SqlValue::Integer(draft.year),
            SqlValue::Integer(draft.price),
        ]
    }

    fn draft_business_key(_draft: &CarDraft) -> Option<&str> {
        None
    }

    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Car {
            id: CarId(row.try_get("id")?),
            make: row.try_get("make")?,
            model: row.try_get("model")?,
            version: row.try_get("version")?,
            year: row.try_get("year")?,
            price: row.try_get("price")?,
        })
    }
}
