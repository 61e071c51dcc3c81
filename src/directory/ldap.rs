//! LDAP backend built on `ldap3`.
//!
//! Every [`DirectoryBackend::connect`] opens its own connection, so a user
//! bind for authentication never shares a session with the service account.

use async_trait::async_trait;
use ldap3::{
    adapters::{Adapter, EntriesOnly, PagedResults},
    exop::PasswordModify,
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry,
};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Attributes, BackendError, DirectoryBackend, DirectorySession, Entry};

const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;

#[derive(Clone, Debug)]
pub struct LdapDirectory {
    url: String,
    timeout: Duration,
}

impl LdapDirectory {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DirectoryBackend for LdapDirectory {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, BackendError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.url)
            .await
            .map_err(map_error)?;
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!("ldap connection closed with error: {err}");
            }
        });
        Ok(Box::new(LdapSession { ldap }))
    }
}

struct LdapSession {
    ldap: Ldap,
}

fn map_error(err: LdapError) -> BackendError {
    match err {
        LdapError::LdapResult { result } if result.rc == RC_NO_SUCH_OBJECT => {
            BackendError::NotFound
        }
        LdapError::LdapResult { result } if result.rc == RC_INVALID_CREDENTIALS => {
            BackendError::InvalidCredentials
        }
        other => BackendError::Unavailable(other.to_string()),
    }
}

fn to_entry(entry: SearchEntry) -> Entry {
    Entry {
        dn: entry.dn,
        attributes: entry.attrs.into_iter().collect(),
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), BackendError> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_error)?;
        Ok(())
    }

    async fn search(&mut self, base: &str, filter: &str) -> Result<Entry, BackendError> {
        let (entries, _result) = self
            .ldap
            .search(base, Scope::Base, filter, vec!["*"])
            .await
            .and_then(ldap3::SearchResult::success)
            .map_err(map_error)?;
        entries
            .into_iter()
            .next()
            .map(|entry| to_entry(SearchEntry::construct(entry)))
            .ok_or(BackendError::NotFound)
    }

    async fn add(&mut self, dn: &str, attributes: Attributes) -> Result<(), BackendError> {
        let attributes: Vec<(String, HashSet<String>)> = attributes
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name, values.into_iter().collect()))
            .collect();
        self.ldap
            .add(dn, attributes)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_error)?;
        Ok(())
    }

    async fn modify(&mut self, dn: &str, replacements: Attributes) -> Result<(), BackendError> {
        let mods: Vec<Mod<String>> = replacements
            .into_iter()
            .map(|(name, values)| Mod::Replace(name, values.into_iter().collect()))
            .collect();
        self.ldap
            .modify(dn, mods)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<(), BackendError> {
        self.ldap
            .delete(dn)
            .await
            .and_then(ldap3::LdapResult::success)
            .map_err(map_error)?;
        Ok(())
    }

    async fn modify_password(
        &mut self,
        dn: &str,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), BackendError> {
        let exop = PasswordModify {
            user_id: Some(dn),
            old_pass: old_password,
            new_pass: Some(new_password),
        };
        self.ldap
            .extended(exop)
            .await
            .and_then(ldap3::result::ExopResult::success)
            .map_err(map_error)?;
        Ok(())
    }

    async fn list_paged(
        &mut self,
        base: &str,
        filter: &str,
        page_size: i32,
    ) -> Result<Vec<Entry>, BackendError> {
        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(page_size)),
        ];
        let mut search = self
            .ldap
            .streaming_search_with(adapters, base, Scope::Subtree, filter, vec!["*"])
            .await
            .map_err(map_error)?;

        let mut entries = Vec::new();
        while let Some(entry) = search.next().await.map_err(map_error)? {
            entries.push(to_entry(SearchEntry::construct(entry)));
        }
        search.finish().await.success().map_err(map_error)?;
        debug!("paged search under {base} returned {} entries", entries.len());
        Ok(entries)
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.ldap.unbind().await.map_err(map_error)
    }
}
