use super::handlers::{self, health, password, profile, sso, staff};
use crate::directory::{Gender, StaffProfile};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        sso::login_form,
        sso::login,
        sso::logout,
        sso::service_validate,
        password::change,
        password::forgot,
        password::reset_form,
        password::reset,
        profile::profile,
        profile::update,
        staff::list,
        staff::get,
        staff::store,
        staff::delete,
    ),
    components(schemas(
        StaffProfile,
        Gender,
        handlers::Ack,
        handlers::Failure,
        handlers::FieldError,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "sso", description = "Ticket granting and service validation"),
        (name = "password", description = "Password change and recovery"),
        (name = "profile", description = "Self-service profile"),
        (name = "staff", description = "Staff administration"),
    )
)]
pub struct ApiDoc;
