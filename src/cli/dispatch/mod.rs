//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{directory, tickets, ARG_ADMINS, ARG_BASE_URL, ARG_DSN, ARG_PORT};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .filter(|dsn| !dsn.is_empty())
        .cloned();
    let base_url = matches
        .get_one::<String>(ARG_BASE_URL)
        .cloned()
        .unwrap_or_else(|| format!("http://localhost:{port}"));
    let admins = matches
        .get_many::<String>(ARG_ADMINS)
        .map(|values| {
            values
                .map(|uid| uid.trim().to_string())
                .filter(|uid| !uid.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let directory = directory::Options::parse(matches)?;
    let tickets = tickets::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        base_url,
        admins,
        directory,
        tickets,
    }))
}
