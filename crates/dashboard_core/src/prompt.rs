//! Builds the generation request for a selected record. Pure: the same
//! selection, seller profile and preferences always produce the same request.

use serde::{Deserialize, Serialize};
use shared::domain::Customer;

use crate::completion::{ChatMessage, CompletionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product {
    pub name: &'static str,
    pub description: &'static str,
    pub price_cents: u32,
}

impl Product {
    pub fn price_label(&self) -> String {
        format!("${}.{:02}", self.price_cents / 100, self.price_cents % 100)
    }
}

pub const CLOTHING_CATALOG: &[Product] = &[
    Product {
        name: "T-shirt",
        description: "A plain white t-shirt made of 100% cotton.",
        price_cents: 1099,
    },
    Product {
        name: "Jeans",
        description: "A pair of blue denim jeans with a straight leg fit.",
        price_cents: 2499,
    },
    Product {
        name: "Hoodie",
        description: "A black hoodie made of a cotton and polyester blend.",
        price_cents: 3499,
    },
    Product {
        name: "Cardigan",
        description: "A grey cardigan with a V-neck and long sleeves.",
        price_cents: 3699,
    },
    Product {
        name: "Joggers",
        description: "A pair of black joggers made of a cotton and polyester blend.",
        price_cents: 4499,
    },
    Product {
        name: "Dress",
        description: "A black dress made of 100% polyester.",
        price_cents: 4999,
    },
    Product {
        name: "Jacket",
        description: "A navy blue jacket made of 100% cotton.",
        price_cents: 5599,
    },
    Product {
        name: "Skirt",
        description: "A brown skirt made of a cotton and polyester blend.",
        price_cents: 2999,
    },
    Product {
        name: "Shorts",
        description: "A pair of black shorts made of a cotton and polyester blend.",
        price_cents: 1999,
    },
    Product {
        name: "Sweater",
        description: "A white sweater with a crew neck and long sleeves.",
        price_cents: 3999,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerProfile {
    pub name: String,
    pub website: String,
    pub catalog: &'static [Product],
}

impl Default for SellerProfile {
    fn default() -> Self {
        Self {
            name: "Reflex".into(),
            website: "https://reflex.dev".into(),
            catalog: CLOTHING_CATALOG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPreferences {
    pub tone: String,
    /// Target length in characters.
    pub length: u32,
}

impl Default for GenerationPreferences {
    fn default() -> Self {
        Self {
            tone: "😊 Formal".into(),
            length: 1000,
        }
    }
}

/// A record an email can be written about.
pub trait PromptSubject {
    fn addressee(&self) -> &str;
    /// Everything known about the addressee, as one paragraph.
    fn profile(&self) -> String;
}

impl PromptSubject for Customer {
    fn addressee(&self) -> &str {
        &self.customer_name
    }

    fn profile(&self) -> String {
        format!(
            "{name} (email {email}) is {age} years old and of {gender} gender. \
             {name} lives in {location}, works as a {job} and earns {salary} per year.",
            name = self.customer_name,
            email = self.email,
            age = self.age,
            gender = self.gender.as_str(),
            location = self.location,
            job = self.job,
            salary = self.salary,
        )
    }
}

pub fn system_directive(seller: &SellerProfile, preferences: &GenerationPreferences) -> String {
    let mut directive = format!(
        "You are a salesperson at {seller}, a company that sells clothing. You have a list of \
         products and customer data. Your task is to write a sales email to a customer \
         recommending one of the products. The email should be personalized and include a \
         recommendation based on the customer's data. The email should be {tone} and {length} \
         characters long.\n\nProducts:",
        seller = seller.name,
        tone = preferences.tone,
        length = preferences.length,
    );
    for product in seller.catalog {
        directive.push_str(&format!(
            "\n- {} ({}): {}",
            product.name,
            product.price_label(),
            product.description
        ));
    }
    directive
}

pub fn build_request<S: PromptSubject>(
    subject: &S,
    seller: &SellerProfile,
    preferences: &GenerationPreferences,
) -> CompletionRequest {
    let addressee = subject.addressee();
    let user_message = format!(
        "Based on these products write a sales email to {addressee}. {profile} \
         Make sure the email recommends one product only and is personalized to {addressee}. \
         The company is named {seller} and its website is {website}.",
        profile = subject.profile(),
        seller = seller.name,
        website = seller.website,
    );
    CompletionRequest {
        system_directive: system_directive(seller, preferences),
        conversation: vec![ChatMessage::user(user_message)],
        stream: true,
    }
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;
