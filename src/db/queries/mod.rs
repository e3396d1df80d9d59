pub mod accounts;
pub mod comments;
pub mod content;
pub mod organization;
pub mod research;
pub mod services;
pub mod summer;
pub mod training;

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::openapi::Components;
use utoipa::Modify;

use crate::domain::actor::{Actor, Ownable};
use crate::error::AppError;

/// Adds the `bearerAuth` scheme referenced by every secured path.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.take().unwrap_or_else(Components::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        openapi.components = Some(components);
    }
}

/// Unwraps a lookup or turns it into a 404 for `what`.
pub(crate) fn found<T>(record: Option<T>, what: &'static str) -> Result<T, AppError> {
    record.ok_or(AppError::NotFound(what))
}

pub(crate) fn require_admin(actor: &Actor, action: &str) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Only administrators can {action}")))
    }
}

pub(crate) fn require_staff(actor: &Actor, action: &str) -> Result<(), AppError> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(AppError::forbidden(format!("Only moderators and administrators can {action}")))
    }
}

/// Trims `value` and records a field error when nothing is left.
pub(crate) fn required(
    errors: &mut crate::error::FieldErrors,
    field: &str,
    value: &str,
) -> String {
    let value = value.trim();
    errors.check(!value.is_empty(), field, "This field is required");
    value.to_string()
}

/// Unpublished content is only visible to its owner and to staff.
pub(crate) fn can_view(actor: &Actor, record: &impl Ownable, published: bool) -> bool {
    published || actor.is_staff() || actor.owns(record)
}
