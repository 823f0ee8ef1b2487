//! Coerces raw form input into validated drafts.
//!
//! Fields are checked in declaration order. A field reports only the first
//! rule it fails, and a coercion failure counts as that field's failure.

use std::collections::HashMap;

use chrono::{Datelike, Utc};
use shared::{
    domain::{CarDraft, CustomerDraft, Gender},
    error::FieldErrors,
};

/// Untyped form submission: field name to raw text.
pub type RawInput = HashMap<String, String>;

pub trait Validate: Sized {
    fn validate(raw: &RawInput) -> Result<Self, FieldErrors>;
}

pub fn raw_input<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> RawInput {
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

struct Form<'a> {
    raw: &'a RawInput,
    errors: FieldErrors,
}

impl<'a> Form<'a> {
    fn new(raw: &'a RawInput) -> Self {
        Self {
            raw,
            errors: FieldErrors::new(),
        }
    }

    fn raw(&self, field: &str) -> &'a str {
        self.raw.get(field).map(String::as_str).unwrap_or_default()
    }

    fn fail<T>(&mut self, field: &str, message: impl Into<String>) -> Option<T> {
        self.errors.insert(field, message);
        None
    }

    fn text(&mut self, field: &str, label: &str, min_chars: usize) -> Option<String> {
        let value = self.raw(field).trim();
        if value.is_empty() {
            return self.fail(field, format!("{label} is required"));
        }
        if value.chars().count() < min_chars {
            return self.fail(
                field,
                format!("{label} must be at least {min_chars} characters"),
            );
        }
        Some(value.to_string())
    }

    fn email(&mut self, field: &str) -> Option<String> {
        let value = self.raw(field).trim();
        if value.is_empty() {
            return self.fail(field, "Email is required");
        }
        let domain_has_dot = value
            .rsplit_once('@')
            .is_some_and(|(_, domain)| domain.contains('.'));
        if !domain_has_dot {
            return self.fail(field, "Invalid email format");
        }
        Some(value.to_lowercase())
    }

    fn integer(&mut self, field: &str, label: &str) -> Option<i64> {
        match self.raw(field).trim().parse::<i64>() {
            Ok(value) => Some(value),
            Err(_) => self.fail(field, format!("{label} must be a valid number")),
        }
    }

    fn ensure(&mut self, field: &str, value: Option<i64>, ok: bool, message: &str) -> Option<i64> {
        let value = value?;
        if ok {
            Some(value)
        } else {
            self.fail(field, message)
        }
    }

    fn gender(&mut self, field: &str) -> Option<Gender> {
        let value = self.raw(field).trim();
        if value.is_empty() {
            return self.fail(field, "Gender is required");
        }
        match Gender::parse(value) {
            Some(gender) => Some(gender),
            None => self.fail(field, "Gender must be Male, Female, or Other"),
        }
    }
}

impl Validate for CustomerDraft {
    fn validate(raw: &RawInput) -> Result<Self, FieldErrors> {
        let mut form = Form::new(raw);

        let customer_name = form.text("customer_name", "Customer name", 2);
        let email = form.email("email");
        let age = form.integer("age", "Age");
        let age = form.ensure(
            "age",
            age,
            age.is_some_and(|age| (18..=120).contains(&age)),
            "Age must be between 18 and 120",
        );
        let gender = form.gender("gender");
        let location = form.text("location", "Location", 2);
        let job = form.text("job", "Job", 2);
        let salary = form.integer("salary", "Salary");
        let salary = form.ensure(
            "salary",
            salary,
            salary.is_some_and(|salary| salary >= 0),
            "Salary must be a positive number",
        );

        match (customer_name, email, age, gender, location, job, salary) {
            (
                Some(customer_name),
                Some(email),
                Some(age),
                Some(gender),
                Some(location),
                Some(job),
                Some(salary),
            ) => Ok(CustomerDraft {
                customer_name,
                email,
                age,
                gender,
                location,
                job,
                salary,
            }),
            _ => Err(form.errors),
        }
    }
}

/// Latest model year accepted for a car.
pub fn max_model_year() -> i64 {
    i64::from(Utc::now().year()) + 1
}

impl Validate for CarDraft {
    fn validate(raw: &RawInput) -> Result<Self, FieldErrors> {
        let mut form = Form::new(raw);
        let max_year = max_model_year();

        let make = form.text("make", "Make", 2);
        let model = form.text("model", "Model", 2);
        let version = form.text("version", "Version", 1);
        let year = form.integer("year", "Year");
        let year = form.ensure(
            "year",
            year,
            year.is_some_and(|year| (1900..=max_year).contains(&year)),
            &format!("Year must be between 1900 and {max_year}"),
        );
        let price = form.integer("price", "Price");
        let price = form.ensure(
            "price",
            price,
            price.is_some_and(|price| price >= 0),
            "Price must be a positive number",
        );

        match (make, model, version, year, price) {
            (Some(make), Some(model), Some(version), Some(year), Some(price)) => Ok(CarDraft {
                make,
                model,
                version,
                year,
                price,
            }),
            _ => Err(form.errors),
        }
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
