use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-assigned identity. Only a successful create produces one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ContactId(pub u64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted contact as returned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A contact that has not been persisted yet. It has no id by construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContactDraft {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl ContactDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        check_name(Some(&self.name), &mut errors);
        check_email(Some(&self.email), &mut errors);
        errors.into_result()
    }

    /// Trimmed copy with blank optional fields dropped.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: non_blank(self.phone.as_deref()),
            address: non_blank(self.address.as_deref()),
            company: non_blank(self.company.as_deref()),
        }
    }
}

/// Partial update. Absent fields are left untouched by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContactPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl ContactPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.company.is_none()
    }

    pub fn set(&mut self, field: ContactField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            ContactField::Name => self.name = value,
            ContactField::Email => self.email = value,
            ContactField::Phone => self.phone = value,
            ContactField::Address => self.address = value,
            ContactField::Company => self.company = value,
        }
    }

    /// Blank optional fields count as absent, so a patch of only blanks is empty.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        if self.normalized().is_empty() {
            return Err(ValidationErrors::form_level("No fields to update"));
        }
        let mut errors = ValidationErrors::default();
        if self.name.is_some() {
            check_name(self.name.as_deref(), &mut errors);
        }
        if self.email.is_some() {
            check_email(self.email.as_deref(), &mut errors);
        }
        errors.into_result()
    }

    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.as_deref().map(|name| name.trim().to_string()),
            email: self.email.as_deref().map(|email| email.trim().to_string()),
            phone: non_blank(self.phone.as_deref()),
            address: non_blank(self.address.as_deref()),
            company: non_blank(self.company.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContactField {
    Name,
    Email,
    Phone,
    Address,
    Company,
}

impl ContactField {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "address" => Some(Self::Address),
            "company" => Some(Self::Company),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Company => "company",
        }
    }
}

/// Client-side, per-field validation failures. Submission is blocked while non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("{}", self.render())]
pub struct ValidationErrors {
    fields: BTreeMap<ContactField, &'static str>,
    form: Option<&'static str>,
}

impl ValidationErrors {
    fn form_level(message: &'static str) -> Self {
        Self {
            fields: BTreeMap::new(),
            form: Some(message),
        }
    }

    fn insert(&mut self, field: ContactField, message: &'static str) {
        self.fields.entry(field).or_insert(message);
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    #[must_use]
    pub fn get(&self, field: ContactField) -> Option<&'static str> {
        self.fields.get(&field).copied()
    }

    /// Message not tied to a single field.
    #[must_use]
    pub fn form(&self) -> Option<&'static str> {
        self.form
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.form.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContactField, &'static str)> + '_ {
        self.fields.iter().map(|(field, message)| (*field, *message))
    }

    fn render(&self) -> String {
        self.form
            .map(str::to_string)
            .into_iter()
            .chain(
                self.iter()
                    .map(|(field, message)| format!("{}: {message}", field.label())),
            )
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn check_name(name: Option<&str>, errors: &mut ValidationErrors) {
    if name.map_or(true, |name| name.trim().is_empty()) {
        errors.insert(ContactField::Name, "Name is required");
    }
}

fn check_email(email: Option<&str>, errors: &mut ValidationErrors) {
    let email = email.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        errors.insert(ContactField::Email, "Email is required");
    } else if !is_plausible_email(email) {
        errors.insert(ContactField::Email, "Email is invalid");
    }
}

/// `user@domain.tld` shape check; the engine owns real validation.
#[must_use]
pub fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
