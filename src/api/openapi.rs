//! OpenAPI document for the REST surface, served through Swagger UI.

use utoipa::openapi::{Contact, License};
use utoipa::{Modify, OpenApi};

use crate::api::handlers::auth::types as auth_types;
use crate::api::handlers::health::Health;
use crate::api::handlers::shops::types as shop_types;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health,
        crate::api::handlers::auth::register::initiate,
        crate::api::handlers::auth::register::verify,
        crate::api::handlers::auth::register::resend,
        crate::api::handlers::auth::register::email_check,
        crate::api::handlers::auth::login::login,
        crate::api::handlers::auth::login::google,
        crate::api::handlers::auth::login::logout,
        crate::api::handlers::auth::forgot::initiate,
        crate::api::handlers::auth::forgot::verify,
        crate::api::handlers::auth::forgot::resend,
        crate::api::handlers::auth::forgot::reset,
        crate::api::handlers::shops::shops::create,
        crate::api::handlers::shops::shops::list,
        crate::api::handlers::shops::products::create,
        crate::api::handlers::shops::products::list,
    ),
    components(schemas(
        Health,
        auth_types::RegisterInitiateRequest,
        auth_types::RegisterInitiateResponse,
        auth_types::RegisterVerifyRequest,
        auth_types::RegisterResendRequest,
        auth_types::EmailCheckRequest,
        auth_types::EmailCheckResponse,
        auth_types::LoginRequest,
        auth_types::GoogleLoginRequest,
        auth_types::ForgotInitiateRequest,
        auth_types::ForgotInitiateResponse,
        auth_types::ForgotVerifyRequest,
        auth_types::ForgotResendRequest,
        auth_types::ForgotResendResponse,
        auth_types::ForgotResetRequest,
        auth_types::UserResponse,
        auth_types::UserEnvelope,
        auth_types::ActionResponse,
        shop_types::CreateShopRequest,
        shop_types::ShopResponse,
        shop_types::ShopEnvelope,
        shop_types::ShopListResponse,
        shop_types::CreateProductRequest,
        shop_types::ProductResponse,
        shop_types::ProductEnvelope,
        shop_types::ProductListResponse,
    )),
    tags(
        (name = "auth", description = "Registration, login, and password reset"),
        (name = "shops", description = "Shop management"),
        (name = "products", description = "Product management"),
        (name = "health", description = "Service health"),
    ),
    modifiers(&CargoInfo)
)]
pub struct ApiDoc;

/// Fill the info block from Cargo.toml metadata.
struct CargoInfo;

impl Modify for CargoInfo {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = env!("CARGO_PKG_NAME").to_string();
        openapi.info.version = env!("CARGO_PKG_VERSION").to_string();
        openapi.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
        openapi.info.contact = cargo_contact();
        openapi.info.license = cargo_license();
    }
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
