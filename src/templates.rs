//! Message templates with `{{variable}}` placeholders.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::contacts::Contact;
use crate::error::{LeadflowError, Result};
use crate::storage::{JsonStore, Record};
use crate::types::{new_id, now_ms, require_non_empty, Channel};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    pub id: String,
    pub name: String,
    pub channel: Channel,
    #[serde(default)]
    pub category: Option<String>,
    pub body: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MessageTemplate {
    /// Distinct placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        placeholders(&self.body)
    }

    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        render_body(&self.body, vars)
    }
}

impl Record for MessageTemplate {
    const KIND: &'static str = "template";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        require_non_empty("body", &self.body)
    }
}

pub fn placeholders(body: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(body) {
        let name = caps[1].to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Substitutes every placeholder. Fails with `MissingField` naming the first
/// placeholder that has no value.
pub fn render_body(body: &str, vars: &HashMap<String, String>) -> Result<String> {
    if let Some(missing) = placeholders(body)
        .into_iter()
        .find(|name| !vars.contains_key(name))
    {
        return Err(LeadflowError::MissingField(missing));
    }
    let rendered = PLACEHOLDER_RE.replace_all(body, |caps: &Captures| {
        vars.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

/// The variables a contact contributes to a template. Absent optional fields
/// are left out so rendering reports them as missing.
pub fn contact_variables(contact: &Contact) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("name".to_string(), contact.name.clone());
    vars.insert("first_name".to_string(), contact.first_name().to_string());
    vars.insert("channel".to_string(), contact.channel.to_string());
    if let Some(ref email) = contact.email {
        vars.insert("email".to_string(), email.clone());
    }
    if let Some(ref phone) = contact.phone {
        vars.insert("phone".to_string(), phone.clone());
    }
    if let Some(ref handle) = contact.handle {
        vars.insert("handle".to_string(), format!("@{handle}"));
    }
    vars
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TemplateInput {
    #[serde(default)]
    pub name: String,
    pub channel: Option<Channel>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub body: String,
}

impl TemplateInput {
    fn apply_to(self, template: &mut MessageTemplate) -> Result<()> {
        template.channel = self
            .channel
            .ok_or_else(|| LeadflowError::MissingField("channel".to_string()))?;
        template.name = self.name.trim().to_string();
        template.category = self
            .category
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty());
        template.body = self.body;
        template.updated_at = now_ms();
        Record::validate(template)
    }
}

pub struct TemplateStore {
    inner: JsonStore<MessageTemplate>,
}

impl TemplateStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            inner: JsonStore::open(data_dir, "templates")?,
        })
    }

    pub fn create(&self, input: TemplateInput) -> Result<MessageTemplate> {
        let now = now_ms();
        let mut template = MessageTemplate {
            id: new_id(),
            name: String::new(),
            channel: Channel::Instagram,
            category: None,
            body: String::new(),
            created_at: now,
            updated_at: now,
        };
        input.apply_to(&mut template)?;
        let template = self.inner.insert(template)?;
        tracing::info!(template_id = %template.id, "template created");
        Ok(template)
    }

    pub fn get(&self, id: &str) -> Result<MessageTemplate> {
        self.inner.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    pub fn update(&self, id: &str, input: TemplateInput) -> Result<MessageTemplate> {
        self.inner.update(id, |template| input.apply_to(template))
    }

    pub fn delete(&self, id: &str) -> Result<MessageTemplate> {
        self.inner.remove(id)
    }

    pub fn duplicate(&self, id: &str) -> Result<MessageTemplate> {
        let source = self.inner.get(id)?;
        let now = now_ms();
        self.inner.insert(MessageTemplate {
            id: new_id(),
            name: format!("{} (copy)", source.name),
            created_at: now,
            updated_at: now,
            ..source
        })
    }

    pub fn list(&self, channel: Option<Channel>, category: Option<&str>) -> Vec<MessageTemplate> {
        let category = category.map(|c| c.trim().to_lowercase());
        self.inner.filter(|t| {
            channel.map_or(true, |c| c == t.channel)
                && category
                    .as_deref()
                    .map_or(true, |c| t.category.as_deref() == Some(c))
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::ContactInput;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn input(body: &str) -> TemplateInput {
        TemplateInput {
            name: "Welcome".to_string(),
            channel: Some(Channel::Instagram),
            category: Some(" Onboarding ".to_string()),
            body: body.to_string(),
        }
    }

    #[test]
    fn placeholders_are_distinct_and_ordered() {
        let names = placeholders("Hi {{first_name}}! {{ offer }} ends soon, {{first_name}}.");
        assert_eq!(names, vec!["first_name", "offer"]);
    }

    #[test]
    fn placeholders_ignore_malformed() {
        assert!(placeholders("{{}} {single} {{ 9lives }}").is_empty());
    }

    #[test]
    fn render_substitutes_all() {
        let out = render_body(
            "Hi {{first_name}}, use code {{ code }}",
            &vars(&[("first_name", "Maya"), ("code", "SPRING20")]),
        )
        .unwrap();
        assert_eq!(out, "Hi Maya, use code SPRING20");
    }

    #[test]
    fn render_reports_first_missing_variable() {
        let err = render_body("{{a}} {{b}} {{c}}", &vars(&[("b", "x")])).unwrap_err();
        assert_eq!(err, LeadflowError::MissingField("a".to_string()));
    }

    #[test]
    fn render_without_placeholders_is_identity() {
        assert_eq!(render_body("plain text", &HashMap::new()).unwrap(), "plain text");
    }

    #[test]
    fn contact_variables_cover_identity() {
        let contact = ContactInput {
            name: "Maya Lopez".into(),
            handle: Some("mayal".into()),
            channel: Some(Channel::Instagram),
            ..Default::default()
        }
        .into_contact()
        .unwrap();
        let v = contact_variables(&contact);
        assert_eq!(v["first_name"], "Maya");
        assert_eq!(v["handle"], "@mayal");
        assert_eq!(v["channel"], "instagram");
        assert!(!v.contains_key("email"));
    }

    #[test]
    fn store_crud_and_duplicate() {
        let tmp = TempDir::new().unwrap();
        let store = TemplateStore::new(tmp.path()).unwrap();
        let t = store.create(input("Hey {{name}}")).unwrap();
        assert_eq!(t.category.as_deref(), Some("onboarding"));
        assert_eq!(t.variables(), vec!["name"]);

        let updated = store.update(&t.id, input("Hello {{name}}")).unwrap();
        assert_eq!(updated.body, "Hello {{name}}");

        let copy = store.duplicate(&t.id).unwrap();
        assert_eq!(copy.name, "Welcome (copy)");
        assert_eq!(copy.body, "Hello {{name}}");

        assert_eq!(store.list(Some(Channel::Instagram), Some("ONBOARDING")).len(), 2);
        assert!(store.list(Some(Channel::Email), None).is_empty());

        store.delete(&t.id).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_rejects_empty_body() {
        let tmp = TempDir::new().unwrap();
        let store = TemplateStore::new(tmp.path()).unwrap();
        assert_eq!(
            store.create(input("   ")).unwrap_err(),
            LeadflowError::MissingField("body".to_string())
        );
    }
}
