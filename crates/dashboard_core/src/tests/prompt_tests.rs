use super::*;

use shared::domain::{CustomerId, Gender};

use crate::completion::Role;

fn ana() -> Customer {
    Customer {
        id: CustomerId(1),
        customer_name: "Ana".into(),
        email: "a@x.com".into(),
        age: 34,
        gender: Gender::Female,
        location: "Lisbon".into(),
        job: "Architect".into(),
        salary: 72_000,
    }
}

#[test]
fn request_is_deterministic_for_the_same_inputs() {
    let seller = SellerProfile::default();
    let preferences = GenerationPreferences::default();
    assert_eq!(
        build_request(&ana(), &seller, &preferences),
        build_request(&ana(), &seller, &preferences)
    );
}

#[test]
fn user_message_carries_every_customer_field() {
    let request = build_request(
        &ana(),
        &SellerProfile::default(),
        &GenerationPreferences::default(),
    );
    assert!(request.stream);
    assert_eq!(request.conversation.len(), 1);
    assert_eq!(request.conversation[0].role, Role::User);
    let message = &request.conversation[0].content;
    for expected in ["Ana", "a@x.com", "34", "Female", "Lisbon", "Architect", "72000"] {
        assert!(message.contains(expected), "missing {expected}: {message}");
    }
    assert!(message.contains("https://reflex.dev"));
}

#[test]
fn directive_lists_catalog_and_preferences() {
    let preferences = GenerationPreferences {
        tone: "🤝 Friendly".into(),
        length: 400,
    };
    let directive = system_directive(&SellerProfile::default(), &preferences);
    assert!(directive.contains("🤝 Friendly"));
    assert!(directive.contains("400 characters"));
    assert!(directive.contains("- Hoodie ($34.99)"));
    assert!(directive.contains("- Skirt ($29.99)"));
    for name in [
        "T-shirt", "Jeans", "Hoodie", "Cardigan", "Joggers", "Dress", "Jacket", "Skirt", "Shorts",
        "Sweater",
    ] {
        assert!(directive.contains(&format!("- {name} (")), "missing {name}");
    }
    assert_eq!(directive.matches("\n- ").count(), 10);
}

#[test]
fn price_label_pads_cents() {
    let product = Product {
        name: "Sock",
        description: "One sock.",
        price_cents: 305,
    };
    assert_eq!(product.price_label(), "$3.05");
}
