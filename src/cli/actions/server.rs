use crate::{
    cas::{postgres::PgTicketStore, MemoryTicketStore, TicketAuthority, TicketConfig, TicketStore},
    cli::{
        commands::{directory, tickets},
        telemetry,
    },
    directory::{ldap::LdapDirectory, DirectoryConfig, DirectoryStore},
    notify::LogNotifier,
    recovery::{postgres::PgResetTokenStore, MemoryResetTokenStore, PasswordRecovery, ResetTokenStore},
    staffio::{self, AppState, WebConfig},
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

const SCHEMA: &str = include_str!("../../../sql/schema.sql");

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub base_url: String,
    pub admins: Vec<String>,
    pub directory: directory::Options,
    pub tickets: tickets::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let backend = LdapDirectory::new(args.directory.url.clone())
        .with_timeout(Duration::from_secs(args.directory.timeout_seconds));
    let config = DirectoryConfig::new(
        args.directory.base.clone(),
        args.directory.bind_dn.clone(),
        args.directory.bind_password.clone(),
    )
    .with_people_ou(args.directory.people_ou.clone())
    .with_page_size(args.directory.page_size);
    let directory = Arc::new(DirectoryStore::new(Arc::new(backend), config));

    let (ticket_store, reset_store) = stores(args.dsn.as_deref()).await?;

    let tickets = Arc::new(TicketAuthority::new(
        ticket_store,
        TicketConfig::new()
            .with_tgt_ttl_seconds(args.tickets.tgt_ttl_seconds)
            .with_st_ttl_seconds(args.tickets.st_ttl_seconds),
    ));
    let recovery = Arc::new(
        PasswordRecovery::new(reset_store, directory.clone())
            .with_ttl_seconds(args.tickets.reset_ttl_seconds),
    );

    if args.admins.is_empty() {
        warn!("no --admins configured, staff administration is disabled");
    }

    let state = Arc::new(AppState {
        directory,
        tickets,
        recovery,
        notifier: Arc::new(LogNotifier),
        config: WebConfig::new(args.base_url).with_admins(args.admins),
    });

    let result = staffio::new(
        args.port,
        state,
        Duration::from_secs(args.tickets.sweep_interval_seconds),
    )
    .await;

    telemetry::shutdown_tracer();

    result
}

async fn stores(
    dsn: Option<&str>,
) -> Result<(Arc<dyn TicketStore>, Arc<dyn ResetTokenStore>)> {
    let Some(dsn) = dsn else {
        info!("no --dsn given, keeping tickets and reset tokens in memory");
        return Ok((
            Arc::new(MemoryTicketStore::new()),
            Arc::new(MemoryResetTokenStore::new()),
        ));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .context("Failed to apply database schema")?;

    Ok((
        Arc::new(PgTicketStore::new(pool.clone())),
        Arc::new(PgResetTokenStore::new(pool)),
    ))
}
