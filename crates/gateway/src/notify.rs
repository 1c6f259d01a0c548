//! Start/stop notification emails via SMTP.
//!
//! Configuration comes from environment variables; if `SMTP_HOST` is
//! not set, [`EmailConfig::from_env`] returns `None` and the gateway
//! runs without a mailer. Delivery is always fire-and-forget from the
//! handlers' point of view.

use chrono::Local;
use chrono::Timelike;

use crawjud_core::text::saudacao;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

const DEFAULT_SMTP_PORT: u16 = 587;

const DEFAULT_FROM_ADDRESS: &str = "noreply@crawjud.local";

/// SMTP configuration for the notifier.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, signalling that email
    /// delivery is not configured and should be skipped.
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Sends launch/stop notification emails.
pub struct Notifier {
    config: EmailConfig,
}

impl Notifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Notify `to_email` that `bot_name` was launched.
    pub async fn job_started(&self, to_email: &str, bot_name: &str) -> Result<(), EmailError> {
        let subject = format!("[CrawJUD] Robô {bot_name} iniciado");
        let body = greeting_body(&format!(
            "O robô {bot_name} foi iniciado e está em execução."
        ));
        self.deliver(to_email, subject, body).await
    }

    /// Notify `to_email` that a stop was requested for `pid`.
    pub async fn job_stopped(&self, to_email: &str, pid: &str) -> Result<(), EmailError> {
        let subject = format!("[CrawJUD] Execução {pid} interrompida");
        let body = greeting_body(&format!(
            "A interrupção da execução {pid} foi solicitada. Os resultados parciais serão disponibilizados em instantes."
        ));
        self.deliver(to_email, subject, body).await
    }

    async fn deliver(
        &self,
        to_email: &str,
        subject: String,
        body: String,
    ) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        transport_builder.build().send(email).await?;

        tracing::info!(to = to_email, "notification email sent");
        Ok(())
    }
}

fn greeting_body(message: &str) -> String {
    format!("{}!\n\n{}\n", saudacao(Local::now().hour()), message)
}
