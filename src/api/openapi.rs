use super::handlers::{auth, health, me, users, verification};
use crate::gate::{require_action_token, require_authenticated, require_authorization, AllowedRoles};
use axum::middleware::{from_fn, from_fn_with_state};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Routes are grouped by guard: public, session (`Authorization: Bearer`),
/// admin (session plus the `ADMIN` role) and action (`X-Action-Token`).
/// Guards expect `Extension<AuthGate>` on the outer router.
pub(crate) fn api_router() -> OpenApiRouter {
    let public = OpenApiRouter::new()
        .routes(routes!(health::health))
        .routes(routes!(auth::sign_up))
        .routes(routes!(auth::login))
        .routes(routes!(verification::request_verification))
        .routes(routes!(verification::select_channel))
        .routes(routes!(verification::confirm_code));

    let session = OpenApiRouter::new()
        .routes(routes!(auth::keep_alive))
        .routes(routes!(auth::logout))
        .routes(routes!(me::me, me::update_me))
        .routes(routes!(me::change_password))
        .routes(routes!(verification::verify_password))
        .route_layer(from_fn(require_authenticated));

    // Layers run outside-in: authentication attaches the identity the role check reads.
    let admin = OpenApiRouter::new()
        .routes(routes!(users::list_users, users::create_user))
        .routes(routes!(users::get_user, users::update_user, users::delete_user))
        .routes(routes!(users::update_status))
        .routes(routes!(users::update_role))
        .route_layer(from_fn_with_state(AllowedRoles::ADMIN, require_authorization))
        .route_layer(from_fn(require_authenticated));

    let action = OpenApiRouter::new()
        .routes(routes!(verification::verification_info))
        .routes(routes!(verification::set_password))
        .route_layer(from_fn(require_action_token));

    OpenApiRouter::with_openapi(cargo_openapi())
        .merge(public)
        .merge(session)
        .merge(admin)
        .merge(action)
}

const TAGS: [(&str, &str); 5] = [
    ("auth", "Sign-up, login and session lifecycle"),
    ("verification", "Verification references and action tokens"),
    ("me", "The authenticated caller"),
    ("users", "Account administration"),
    ("health", "Service health"),
];

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = optional_str(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    let tags = TAGS
        .into_iter()
        .map(|(name, description)| {
            let mut tag = Tag::new(name);
            tag.description = Some(description.to_string());
            tag
        })
        .collect::<Vec<_>>();

    OpenApiBuilder::new().info(info).tags(Some(tags)).build()
}

// Cargo authors look like "Name <email>".
fn cargo_contact() -> Option<Contact> {
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (name.trim(), email.trim_end_matches('>').trim()),
        None => (primary, ""),
    };
    if name.is_empty() && email.is_empty() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = optional_str(name).map(str::to_string);
    contact.email = optional_str(email).map(str::to_string);
    Some(contact)
}

fn optional_str(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
