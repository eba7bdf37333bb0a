use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use leadflow::templates::{contact_variables, MessageTemplate, TemplateInput};
use leadflow::{Channel, LeadflowError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{created, error_response, paginate, parse_optional, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTemplatesQuery {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Preview input. Contact variables are filled in first, explicit
/// `variables` override them.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub template_id: String,
    pub body: String,
    pub variables: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/1/templates",
    tag = "templates",
    request_body = TemplateInput,
    responses(
        (status = 201, description = "Template created", body = MessageTemplate),
        (status = 400, description = "Invalid template")
    )
)]
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(input): Json<TemplateInput>,
) -> Response {
    match state.templates.create(input) {
        Ok(template) => created(template),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/templates",
    tag = "templates",
    params(
        ("channel" = Option<String>, Query, description = "Channel filter"),
        ("category" = Option<String>, Query, description = "Category filter"),
        ("limit" = Option<usize>, Query, description = "Page size (default 20)"),
        ("offset" = Option<usize>, Query, description = "Items to skip")
    ),
    responses((status = 200, description = "Templates page", body = serde_json::Value))
)]
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTemplatesQuery>,
) -> Response {
    match parse_optional(query.channel.as_deref(), Channel::parse) {
        Ok(channel) => {
            let templates = state.templates.list(channel, query.category.as_deref());
            Json(paginate(templates, query.limit, query.offset)).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    get,
    path = "/1/templates/{id}",
    tag = "templates",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Template", body = MessageTemplate),
        (status = 404, description = "Unknown template")
    )
)]
pub async fn get_template(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.templates.get(&id) {
        Ok(template) => Json(template).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    put,
    path = "/1/templates/{id}",
    tag = "templates",
    params(("id" = String, Path, description = "Template id")),
    request_body = TemplateInput,
    responses((status = 200, description = "Template updated", body = MessageTemplate))
)]
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<TemplateInput>,
) -> Response {
    match state.templates.update(&id, input) {
        Ok(template) => Json(template).into_response(),
        Err(err) => error_response(err),
    }
}

/// Names of campaigns and sequences that still point at a template.
fn template_users(state: &AppState, id: &str) -> Vec<String> {
    let campaigns = state
        .campaigns
        .all()
        .into_iter()
        .filter(|c| c.template_id.as_deref() == Some(id))
        .map(|c| format!("campaign {}", c.id));
    let sequences = state
        .followups
        .list_sequences(None)
        .into_iter()
        .filter(|s| s.steps.iter().any(|step| step.template_id.as_deref() == Some(id)))
        .map(|s| format!("follow-up sequence {}", s.id));
    campaigns.chain(sequences).collect()
}

#[utoipa::path(
    delete,
    path = "/1/templates/{id}",
    tag = "templates",
    params(("id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Deleted template", body = MessageTemplate),
        (status = 409, description = "Template is still referenced")
    )
)]
pub async fn delete_template(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let users = template_users(&state, &id);
    if !users.is_empty() {
        return error_response(LeadflowError::InvalidStatus(format!(
            "template {id} is used by {}",
            users.join(", ")
        )));
    }
    match state.templates.delete(&id) {
        Ok(template) => Json(template).into_response(),
        Err(err) => error_response(err),
    }
}

#[utoipa::path(
    post,
    path = "/1/templates/{id}/duplicate",
    tag = "templates",
    params(("id" = String, Path, description = "Template id")),
    responses((status = 201, description = "Template copy", body = MessageTemplate))
)]
pub async fn duplicate_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.templates.duplicate(&id) {
        Ok(copy) => created(copy),
        Err(err) => error_response(err),
    }
}

fn render_preview(state: &AppState, id: &str, req: RenderRequest) -> leadflow::Result<RenderResponse> {
    let template = state.templates.get(id)?;
    let mut vars = match req.contact_id.as_deref() {
        Some(contact_id) => contact_variables(&state.contacts.get(contact_id)?),
        None => HashMap::new(),
    };
    vars.extend(req.variables);
    Ok(RenderResponse {
        body: template.render(&vars)?,
        variables: template.variables(),
        template_id: template.id,
    })
}

#[utoipa::path(
    post,
    path = "/1/templates/{id}/render",
    tag = "templates",
    params(("id" = String, Path, description = "Template id")),
    request_body = RenderRequest,
    responses(
        (status = 200, description = "Rendered body", body = RenderResponse),
        (status = 400, description = "A placeholder has no value")
    )
)]
pub async fn render_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RenderRequest>,
) -> Response {
    match render_preview(&state, &id, req) {
        Ok(rendered) => Json(rendered).into_response(),
        Err(err) => error_response(err),
    }
}
