#![allow(dead_code)]

use secrecy::SecretString;
use staffio::directory::{memory::MemoryDirectory, DirectoryConfig, DirectoryStore, Entry};
use std::collections::HashMap;
use std::sync::Arc;

pub const BASE: &str = "dc=example,dc=org";
pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=org";
pub const ADMIN_PASSWORD: &str = "admin-secret";

pub fn user_dn(uid: &str) -> String {
    format!("uid={uid},ou=people,{BASE}")
}

pub fn entry(dn: &str, attributes: &[(&str, &str)]) -> Entry {
    let mut values: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in attributes {
        values
            .entry((*name).to_string())
            .or_default()
            .push((*value).to_string());
    }
    Entry {
        dn: dn.to_string(),
        attributes: values,
    }
}

/// A person with the usual attributes and a password.
pub async fn seed_user(directory: &MemoryDirectory, uid: &str, password: &str) {
    let email = format!("{uid}@example.org");
    directory
        .seed(
            entry(
                &user_dn(uid),
                &[
                    ("objectClass", "inetOrgPerson"),
                    ("uid", uid),
                    ("sn", "Doe"),
                    ("givenName", "Jane"),
                    ("cn", "Jane Doe"),
                    ("mail", &email),
                    ("mobile", "13800000000"),
                ],
            ),
            Some(password),
        )
        .await;
}

pub async fn directory_with_page_size(page_size: i32) -> (MemoryDirectory, Arc<DirectoryStore>) {
    let backend = MemoryDirectory::new();
    backend.add_admin(ADMIN_DN, ADMIN_PASSWORD).await;
    let config = DirectoryConfig::new(
        BASE.to_string(),
        ADMIN_DN.to_string(),
        SecretString::from(ADMIN_PASSWORD.to_string()),
    )
    .with_page_size(page_size);
    let store = Arc::new(DirectoryStore::new(Arc::new(backend.clone()), config));
    (backend, store)
}

pub async fn directory() -> (MemoryDirectory, Arc<DirectoryStore>) {
    directory_with_page_size(staffio::directory::DEFAULT_PAGE_SIZE).await
}
