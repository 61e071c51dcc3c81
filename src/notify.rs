use anyhow::Result;
use tracing::{debug, info};

/// A password reset link to deliver out of band.
#[derive(Clone, Debug)]
pub struct ResetNotice {
    pub uid: String,
    pub to_email: String,
    pub reset_url: String,
}

pub trait Notifier: Send + Sync {
    fn send(&self, notice: &ResetNotice) -> Result<()>;
}

/// Writes notices to the log instead of delivering them.
#[derive(Clone, Debug)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notice: &ResetNotice) -> Result<()> {
        info!(
            uid = %notice.uid,
            to_email = %notice.to_email,
            "password reset notice send stub"
        );
        debug!(reset_url = %notice.reset_url, "password reset link");
        Ok(())
    }
}

/// Link included in the reset notice.
#[must_use]
pub fn build_reset_url(base_url: &str, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/password/reset?rt={token}")
}
