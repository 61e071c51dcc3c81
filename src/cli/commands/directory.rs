use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_LDAP_URL: &str = "ldap-url";
pub const ARG_LDAP_BASE: &str = "ldap-base";
pub const ARG_LDAP_BIND_DN: &str = "ldap-bind-dn";
pub const ARG_LDAP_BIND_PASSWORD: &str = "ldap-bind-password";
pub const ARG_LDAP_PEOPLE_OU: &str = "ldap-people-ou";
pub const ARG_LDAP_PAGE_SIZE: &str = "ldap-page-size";
pub const ARG_LDAP_TIMEOUT: &str = "ldap-timeout";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LDAP_URL)
                .long(ARG_LDAP_URL)
                .help("Directory server URL, ldap:// or ldaps://")
                .env("STAFFIO_LDAP_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_LDAP_BASE)
                .long(ARG_LDAP_BASE)
                .help("Directory base DN, e.g. dc=example,dc=org")
                .env("STAFFIO_LDAP_BASE")
                .required(true),
        )
        .arg(
            Arg::new(ARG_LDAP_BIND_DN)
                .long(ARG_LDAP_BIND_DN)
                .help("Service account DN used for directory writes")
                .env("STAFFIO_LDAP_BIND_DN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_LDAP_BIND_PASSWORD)
                .long(ARG_LDAP_BIND_PASSWORD)
                .help("Service account password")
                .env("STAFFIO_LDAP_BIND_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_LDAP_PEOPLE_OU)
                .long(ARG_LDAP_PEOPLE_OU)
                .help("RDN of the people container under the base DN")
                .env("STAFFIO_LDAP_PEOPLE_OU")
                .default_value("ou=people"),
        )
        .arg(
            Arg::new(ARG_LDAP_PAGE_SIZE)
                .long(ARG_LDAP_PAGE_SIZE)
                .help("Page size for directory listings")
                .env("STAFFIO_LDAP_PAGE_SIZE")
                .default_value("20")
                .value_parser(clap::value_parser!(i32).range(1..=1000)),
        )
        .arg(
            Arg::new(ARG_LDAP_TIMEOUT)
                .long(ARG_LDAP_TIMEOUT)
                .help("Directory connect timeout in seconds")
                .env("STAFFIO_LDAP_TIMEOUT")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub base: String,
    pub bind_dn: String,
    pub bind_password: SecretString,
    pub people_ou: String,
    pub page_size: i32,
    pub timeout_seconds: u64,
}

impl Options {
    /// Read the directory arguments.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            matches
                .get_one::<String>(name)
                .cloned()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            url: required(ARG_LDAP_URL)?,
            base: required(ARG_LDAP_BASE)?,
            bind_dn: required(ARG_LDAP_BIND_DN)?,
            bind_password: SecretString::from(required(ARG_LDAP_BIND_PASSWORD)?),
            people_ou: required(ARG_LDAP_PEOPLE_OU)?,
            page_size: matches
                .get_one::<i32>(ARG_LDAP_PAGE_SIZE)
                .copied()
                .unwrap_or(crate::directory::DEFAULT_PAGE_SIZE),
            timeout_seconds: matches
                .get_one::<u64>(ARG_LDAP_TIMEOUT)
                .copied()
                .unwrap_or(5),
        })
    }
}
