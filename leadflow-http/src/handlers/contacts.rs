use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use leadflow::activity::ActivityKind;
use leadflow::contacts::{Contact, ContactFilter, ContactInput, ContactStatus};
use leadflow::types::now_ms;
use leadflow::{Channel, InterestLevel};
use serde::Deserialize;
use std::sync::Arc;

use super::{created, error_response, paginate, parse_optional, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListContactsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub interest_level: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListContactsQuery {
    fn filter(&self) -> leadflow::Result<ContactFilter> {
        Ok(ContactFilter {
            status: parse_optional(self.status.as_deref(), ContactStatus::parse)?,
            channel: parse_optional(self.channel.as_deref(), Channel::parse)?,
            interest_level: parse_optional(self.interest_level.as_deref(), InterestLevel::parse)?,
            tag: self.tag.clone().filter(|t| !t.trim().is_empty()),
            query: self.q.clone().filter(|q| !q.trim().is_empty()),
        })
    }
}

#[utoipa::path(
    post,
    path = "/1/contacts",
    tag = "contacts",
    request_body = ContactInput,
    responses(
        (status = 201, description = "Contact created", body = Contact),
        (status = 400, description = "Invalid contact")
    )
)]
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ContactInput>,
) -> Response {
    match state.contacts.create(input) {
        Ok(contact) => {
            state.activity.record(
                ActivityKind::ContactCreated,
                &contact.id,
                format!("Contact {} added on {}", contact.name, contact.channel),
            );
            created(contact)
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/contacts",
    tag = "contacts",
    params(
        ("status" = Option<String>, Query, description = "new, contacted, qualified, converted or lost"),
        ("channel" = Option<String>, Query, description = "Channel filter"),
        ("interestLevel" = Option<String>, Query, description = "hot, warm or cold"),
        ("tag" = Option<String>, Query, description = "Tag filter"),
        ("q" = Option<String>, Query, description = "Text search over name, email and handle"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20)"),
        ("offset" = Option<usize>, Query, description = "Items to skip")
    ),
    responses((status = 200, description = "Contacts page", body = serde_json::Value))
)]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListContactsQuery>,
) -> Response {
    match query.filter() {
        Ok(filter) => {
            Json(paginate(state.contacts.list(&filter), query.limit, query.offset)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/contacts/{id}",
    tag = "contacts",
    params(("id" = String, Path, description = "Contact id")),
    responses(
        (status = 200, description = "Contact", body = Contact),
        (status = 404, description = "Unknown contact")
    )
)]
pub async fn get_contact(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.contacts.get(&id) {
        Ok(contact) => Json(contact).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/1/contacts/{id}",
    tag = "contacts",
    params(("id" = String, Path, description = "Contact id")),
    request_body = ContactInput,
    responses(
        (status = 200, description = "Contact replaced", body = Contact),
        (status = 404, description = "Unknown contact")
    )
)]
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<ContactInput>,
) -> Response {
    match state.contacts.update(&id, input) {
        Ok(contact) => Json(contact).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    delete,
    path = "/1/contacts/{id}",
    tag = "contacts",
    params(("id" = String, Path, description = "Contact id")),
    responses(
        (status = 200, description = "Deleted contact; its active follow-ups are cancelled", body = Contact),
        (status = 404, description = "Unknown contact")
    )
)]
pub async fn delete_contact(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let contact = match state.contacts.delete(&id) {
        Ok(contact) => contact,
        Err(err) => return error_response(err),
    };
    // Left-over executions are also cancelled by the next follow-up run.
    if let Err(err) = state.followups.cancel_for_contact(&id, now_ms()) {
        tracing::warn!(contact_id = %id, error = %err, "failed to cancel follow-ups of deleted contact");
    }
    Json(contact).into_response()
}
