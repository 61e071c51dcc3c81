//! Staff directory: profile model, record reconciliation and the store that
//! talks to the directory backend.
//!
//! ## Backend seam
//!
//! The store never speaks a wire protocol itself. It opens a
//! [`DirectorySession`] from an injected [`DirectoryBackend`], binds, and then
//! issues `search` / `add` / `modify` / `delete` calls on that session. A
//! session is bound to one identity at a time, so user binds (authentication)
//! always use their own session and never downgrade a privileged one.
//!
//! ## Reconciliation
//!
//! Every write goes through [`reconcile`], which compares the desired profile
//! with the stored [`DirectoryEntry`] and returns a [`ReconcilePlan`]: either an
//! insert carrying the full record, or an update carrying only the fields that
//! changed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use utoipa::ToSchema;

pub mod differ;
pub mod ldap;
pub mod memory;
mod store;

pub use differ::{reconcile, reconcile_profile, Change, ReconcilePlan};
pub use store::{DirectoryConfig, DirectoryStore, DEFAULT_PAGE_SIZE};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Gender {
    /// Single-letter form kept in the directory; `None` for [`Gender::Unknown`].
    #[must_use]
    pub fn code(self) -> Option<&'static str> {
        match self {
            Self::Unknown => None,
            Self::Male => Some("m"),
            Self::Female => Some("f"),
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Self::Male,
            "f" | "female" => Self::Female,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// Profile attributes tracked in a directory record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Uid,
    Surname,
    GivenName,
    CommonName,
    Nickname,
    Email,
    Mobile,
    Gender,
    Birthday,
    Description,
    AvatarPath,
    EmployeeNumber,
    EmployeeType,
}

impl Field {
    pub const ALL: [Self; 13] = [
        Self::Uid,
        Self::Surname,
        Self::GivenName,
        Self::CommonName,
        Self::Nickname,
        Self::Email,
        Self::Mobile,
        Self::Gender,
        Self::Birthday,
        Self::Description,
        Self::AvatarPath,
        Self::EmployeeNumber,
        Self::EmployeeType,
    ];
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct StaffProfile {
    pub uid: String,
    pub surname: String,
    pub given_name: String,
    pub common_name: String,
    pub nickname: String,
    pub email: String,
    pub mobile: String,
    pub gender: Gender,
    pub birthday: String,
    pub description: String,
    pub avatar_path: String,
    pub employee_number: String,
    pub employee_type: String,
}

impl StaffProfile {
    /// The stored common name, or `"{given} {surname}"` when blank.
    #[must_use]
    pub fn common_name(&self) -> String {
        let explicit = self.common_name.trim();
        if !explicit.is_empty() {
            return explicit.to_string();
        }
        [self.given_name.trim(), self.surname.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Value of `field` as it would be written to the directory.
    #[must_use]
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Uid => self.uid.clone(),
            Field::Surname => self.surname.clone(),
            Field::GivenName => self.given_name.clone(),
            Field::CommonName => self.common_name(),
            Field::Nickname => self.nickname.clone(),
            Field::Email => self.email.clone(),
            Field::Mobile => self.mobile.clone(),
            Field::Gender => self.gender.code().unwrap_or_default().to_string(),
            Field::Birthday => self.birthday.clone(),
            Field::Description => self.description.clone(),
            Field::AvatarPath => self.avatar_path.clone(),
            Field::EmployeeNumber => self.employee_number.clone(),
            Field::EmployeeType => self.employee_type.clone(),
        }
    }

    #[must_use]
    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        Self {
            uid: entry.get(Field::Uid).to_string(),
            surname: entry.get(Field::Surname).to_string(),
            given_name: entry.get(Field::GivenName).to_string(),
            common_name: entry.get(Field::CommonName).to_string(),
            nickname: entry.get(Field::Nickname).to_string(),
            email: entry.get(Field::Email).to_string(),
            mobile: entry.get(Field::Mobile).to_string(),
            gender: Gender::from_code(entry.get(Field::Gender)),
            birthday: entry.get(Field::Birthday).to_string(),
            description: entry.get(Field::Description).to_string(),
            avatar_path: entry.get(Field::AvatarPath).to_string(),
            employee_number: entry.get(Field::EmployeeNumber).to_string(),
            employee_type: entry.get(Field::EmployeeType).to_string(),
        }
    }
}

/// Read-only snapshot of a stored record, used as the diff baseline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    dn: String,
    values: BTreeMap<Field, String>,
}

impl DirectoryEntry {
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.values.insert(field, value.into());
        self
    }

    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// First stored value of `field`, or `""` when the attribute is absent.
    #[must_use]
    pub fn get(&self, field: Field) -> &str {
        self.values.get(&field).map_or("", String::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("no such entry")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unavailable(String),
}

/// An entry as returned by the backend: distinguished name plus raw
/// multi-valued attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

/// `(attribute, values)` pairs. On modify, an empty value list removes the
/// attribute.
pub type Attributes = Vec<(String, Vec<String>)>;

#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, BackendError>;
}

#[async_trait]
pub trait DirectorySession: Send {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), BackendError>;

    /// Base-scope read of `base`; [`BackendError::NotFound`] when absent.
    async fn search(&mut self, base: &str, filter: &str) -> Result<Entry, BackendError>;

    async fn add(&mut self, dn: &str, attributes: Attributes) -> Result<(), BackendError>;

    /// Replace each listed attribute with the given values.
    async fn modify(&mut self, dn: &str, replacements: Attributes) -> Result<(), BackendError>;

    async fn delete(&mut self, dn: &str) -> Result<(), BackendError>;

    async fn modify_password(
        &mut self,
        dn: &str,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), BackendError>;

    /// Subtree search under `base`, fetched `page_size` entries at a time until
    /// the backend reports exhaustion.
    async fn list_paged(
        &mut self,
        base: &str,
        filter: &str,
        page_size: i32,
    ) -> Result<Vec<Entry>, BackendError>;

    async fn close(&mut self) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_name_derived_from_given_and_surname() {
        let profile = StaffProfile {
            surname: "Lee".to_string(),
            given_name: "Alice".to_string(),
            ..StaffProfile::default()
        };
        assert_eq!(profile.common_name(), "Alice Lee");

        let only_surname = StaffProfile {
            surname: "Lee".to_string(),
            ..StaffProfile::default()
        };
        assert_eq!(only_surname.common_name(), "Lee");

        let explicit = StaffProfile {
            common_name: "Ali".to_string(),
            ..profile
        };
        assert_eq!(explicit.common_name(), "Ali");
    }

    #[test]
    fn gender_codes() {
        assert_eq!(Gender::Male.code(), Some("m"));
        assert_eq!(Gender::Female.code(), Some("f"));
        assert_eq!(Gender::Unknown.code(), None);
        assert_eq!(Gender::from_code("F"), Gender::Female);
        assert_eq!(Gender::from_code(""), Gender::Unknown);
    }

    #[test]
    fn profile_from_entry_reads_missing_as_empty() {
        let entry = DirectoryEntry::new("uid=bob,ou=people,dc=example,dc=org")
            .with(Field::Uid, "bob")
            .with(Field::Gender, "m")
            .with(Field::Mobile, "555");
        let profile = StaffProfile::from_entry(&entry);
        assert_eq!(profile.uid, "bob");
        assert_eq!(profile.gender, Gender::Male);
        assert_eq!(profile.mobile, "555");
        assert_eq!(profile.email, "");
    }
}
