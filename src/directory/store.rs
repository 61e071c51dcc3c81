use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, instrument, warn};

use super::{
    reconcile, reconcile_profile, Attributes, BackendError, DirectoryBackend, DirectoryEntry,
    DirectorySession, Entry, Field, ReconcilePlan, StaffProfile,
};
use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: i32 = 20;

const OBJECT_CLASS_PEOPLE: [&str; 4] = ["top", "staffioPerson", "uidObject", "inetOrgPerson"];
const PEOPLE_FILTER: &str = "(objectClass=inetOrgPerson)";

/// Where people live in the directory and how to bind for writes.
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    base: String,
    people_ou: String,
    bind_dn: String,
    bind_password: SecretString,
    page_size: i32,
}

impl DirectoryConfig {
    #[must_use]
    pub fn new(base: String, bind_dn: String, bind_password: SecretString) -> Self {
        Self {
            base,
            people_ou: "ou=people".to_string(),
            bind_dn,
            bind_password,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_people_ou(mut self, people_ou: String) -> Self {
        self.people_ou = people_ou;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn people_base(&self) -> String {
        format!("{},{}", self.people_ou, self.base)
    }

    #[must_use]
    pub fn page_size(&self) -> i32 {
        self.page_size
    }
}

/// Reads and writes staff records through an injected directory backend.
pub struct DirectoryStore {
    backend: Arc<dyn DirectoryBackend>,
    config: DirectoryConfig,
}

impl DirectoryStore {
    pub fn new(backend: Arc<dyn DirectoryBackend>, config: DirectoryConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Distinguished name of a person entry.
    pub fn user_dn(&self, uid: &str) -> Result<String> {
        if !valid_uid(uid) {
            return Err(Error::ValidationFailed(format!("invalid uid: {uid:?}")));
        }
        Ok(format!("uid={uid},{}", self.config.people_base()))
    }

    /// Check a user's password by binding as them.
    ///
    /// Every failure collapses to [`Error::InvalidCredentials`]; the actual cause
    /// is only logged.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, uid: &str, password: &str) -> Result<()> {
        match self.bind_as_user(uid, password).await {
            Ok(mut session) => {
                close(session.as_mut()).await;
                Ok(())
            }
            Err(err) => {
                warn!("authentication failed for {uid}: {err}");
                Err(Error::InvalidCredentials)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, uid: &str) -> Result<StaffProfile> {
        let dn = self.user_dn(uid)?;
        let mut session = self.privileged().await?;
        let result = session.search(&dn, PEOPLE_FILTER).await;
        close(session.as_mut()).await;
        let entry = result.map_err(|err| log_backend("get", uid, err))?;
        Ok(StaffProfile::from_entry(&to_directory_entry(&entry)))
    }

    /// Insert or update a profile with exactly one directory write.
    ///
    /// Returns `true` when the record was created.
    #[instrument(skip(self, profile), fields(uid = %profile.uid))]
    pub async fn store_or_update(&self, profile: &StaffProfile) -> Result<bool> {
        let dn = self.user_dn(&profile.uid)?;
        let mut session = self.privileged().await?;
        let result = write_reconciled(session.as_mut(), &dn, profile).await;
        close(session.as_mut()).await;
        result
    }

    /// Self-service profile edit: the write runs bound as the user.
    #[instrument(skip(self, password, profile))]
    pub async fn modify_profile(
        &self,
        uid: &str,
        password: &str,
        profile: &StaffProfile,
    ) -> Result<()> {
        if uid != profile.uid {
            return Err(Error::ValidationFailed(format!(
                "mismatch uid {uid} and {}",
                profile.uid
            )));
        }
        let dn = self.user_dn(uid)?;
        let mut session = self.bind_as_user(uid, password).await.map_err(|err| {
            warn!("profile edit bind failed for {uid}: {err}");
            Error::InvalidCredentials
        })?;
        let existing = session.search(&dn, PEOPLE_FILTER).await;
        let result = match existing {
            Ok(entry) => {
                let plan = reconcile_profile(&to_directory_entry(&entry), profile);
                session
                    .modify(&dn, update_attributes(&plan))
                    .await
                    .map_err(|err| log_backend("modify", uid, err))
            }
            Err(err) => Err(log_backend("lookup", uid, err)),
        };
        close(session.as_mut()).await;
        result
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, uid: &str) -> Result<()> {
        let dn = self.user_dn(uid)?;
        let mut session = self.privileged().await?;
        let result = session.delete(&dn).await;
        close(session.as_mut()).await;
        result.map_err(|err| log_backend("delete", uid, err))
    }

    /// Change a password after proving the old one.
    ///
    /// [`Error::InvalidCredentials`] means the old password was rejected; any
    /// other error is a backend failure.
    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        uid: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let dn = self.user_dn(uid)?;
        let mut session = self
            .bind_as_user(uid, old_password)
            .await
            .map_err(|err| match err {
                Error::BackendUnavailable(_) | Error::Internal(_) => err,
                _ => Error::InvalidCredentials,
            })?;
        let result = session
            .modify_password(&dn, Some(old_password), new_password)
            .await;
        close(session.as_mut()).await;
        result.map_err(|err| log_backend("password change", uid, err))
    }

    /// Set a password without the old one, using the service account.
    #[instrument(skip(self, new_password))]
    pub async fn reset_password(&self, uid: &str, new_password: &str) -> Result<()> {
        let dn = self.user_dn(uid)?;
        let mut session = self.privileged().await?;
        let result = session.modify_password(&dn, None, new_password).await;
        close(session.as_mut()).await;
        result.map_err(|err| log_backend("password reset", uid, err))
    }

    /// All people, fetched page by page.
    #[instrument(skip(self))]
    pub async fn list_page(&self) -> Result<Vec<StaffProfile>> {
        let mut session = self.privileged().await?;
        let result = session
            .list_paged(
                &self.config.people_base(),
                PEOPLE_FILTER,
                self.config.page_size(),
            )
            .await;
        close(session.as_mut()).await;
        let entries = result.map_err(|err| log_backend("list", "*", err))?;
        debug!("listed {} entries", entries.len());
        Ok(entries
            .iter()
            .map(|entry| StaffProfile::from_entry(&to_directory_entry(entry)))
            .collect())
    }

    async fn privileged(&self) -> Result<Box<dyn DirectorySession>> {
        let mut session = self.backend.connect().await.map_err(|err| {
            error!("directory connect failed: {err}");
            Error::BackendUnavailable(err.to_string())
        })?;
        if let Err(err) = session
            .bind(&self.config.bind_dn, self.config.bind_password.expose_secret())
            .await
        {
            close(session.as_mut()).await;
            error!("privileged bind as {} failed: {err}", self.config.bind_dn);
            // A rejected service account is an operator problem, not a user one.
            return Err(Error::BackendUnavailable(err.to_string()));
        }
        Ok(session)
    }

    async fn bind_as_user(&self, uid: &str, password: &str) -> Result<Box<dyn DirectorySession>> {
        if password.is_empty() {
            // An empty password would be an anonymous bind.
            return Err(Error::InvalidCredentials);
        }
        let dn = self.user_dn(uid)?;
        let mut session = self.backend.connect().await.map_err(Error::from)?;
        if let Err(err) = session.bind(&dn, password).await {
            close(session.as_mut()).await;
            return Err(err.into());
        }
        Ok(session)
    }
}

async fn write_reconciled(
    session: &mut dyn DirectorySession,
    dn: &str,
    profile: &StaffProfile,
) -> Result<bool> {
    let existing = match session.search(dn, PEOPLE_FILTER).await {
        Ok(entry) => Some(to_directory_entry(&entry)),
        Err(BackendError::NotFound) => None,
        Err(err) => return Err(log_backend("lookup", &profile.uid, err)),
    };

    let plan = reconcile(existing.as_ref(), profile);
    match &plan {
        ReconcilePlan::Insert { .. } => {
            session
                .add(dn, insert_attributes(&plan))
                .await
                .map_err(|err| log_backend("add", &profile.uid, err))?;
            Ok(true)
        }
        ReconcilePlan::Update { changes } => {
            debug!("updating {dn} with {} changed attributes", changes.len());
            session
                .modify(dn, update_attributes(&plan))
                .await
                .map_err(|err| log_backend("modify", &profile.uid, err))?;
            Ok(false)
        }
    }
}

fn insert_attributes(plan: &ReconcilePlan) -> Attributes {
    let mut attributes = vec![object_class()];
    attributes.extend(
        plan.changes()
            .iter()
            .map(|change| (attribute_name(change.field).to_string(), vec![change.value.clone()])),
    );
    attributes
}

fn update_attributes(plan: &ReconcilePlan) -> Attributes {
    // objectClass is always rewritten so older entries pick up the schema.
    let mut attributes = vec![object_class()];
    attributes.extend(plan.changes().iter().map(|change| {
        let values = if change.value.is_empty() {
            Vec::new()
        } else {
            vec![change.value.clone()]
        };
        (attribute_name(change.field).to_string(), values)
    }));
    attributes
}

fn object_class() -> (String, Vec<String>) {
    (
        "objectClass".to_string(),
        OBJECT_CLASS_PEOPLE.iter().map(ToString::to_string).collect(),
    )
}

/// Directory attribute holding a profile field.
#[must_use]
pub(crate) fn attribute_name(field: Field) -> &'static str {
    match field {
        Field::Uid => "uid",
        Field::Surname => "sn",
        Field::GivenName => "givenName",
        Field::CommonName => "cn",
        Field::Nickname => "displayName",
        Field::Email => "mail",
        Field::Mobile => "mobile",
        Field::Gender => "gender",
        Field::Birthday => "dateOfBirth",
        Field::Description => "description",
        Field::AvatarPath => "avatarPath",
        Field::EmployeeNumber => "employeeNumber",
        Field::EmployeeType => "employeeType",
    }
}

fn to_directory_entry(entry: &Entry) -> DirectoryEntry {
    Field::ALL
        .iter()
        .fold(DirectoryEntry::new(entry.dn.clone()), |snapshot, &field| {
            let name = attribute_name(field);
            let value = entry
                .attributes
                .iter()
                .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
                .and_then(|(_, values)| values.first());
            match value {
                Some(value) => snapshot.with(field, value.clone()),
                None => snapshot,
            }
        })
}

static UID_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn valid_uid(uid: &str) -> bool {
    UID_PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(uid))
}

fn log_backend(operation: &str, uid: &str, err: BackendError) -> Error {
    match &err {
        BackendError::Unavailable(message) => {
            error!("directory {operation} for {uid} failed: {message}");
        }
        _ => debug!("directory {operation} for {uid}: {err}"),
    }
    err.into()
}

async fn close(session: &mut dyn DirectorySession) {
    if let Err(err) = session.close().await {
        debug!("directory unbind failed: {err}");
    }
}
