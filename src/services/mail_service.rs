use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;
use crate::utils::AppError;

/// SMTP sender for account mail. Without SMTP settings, messages are logged instead.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Mailbox>,
}

impl Mailer {
    pub fn new(config: Option<&SmtpConfig>) -> Result<Self, AppError> {
        let Some(cfg) = config else {
            log::warn!("📭 SMTP not configured: password reset links will only be logged");
            return Ok(Self::disabled());
        };

        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid SMTP_FROM '{}': {}", cfg.from, e)))?;

        // 465 is implicit TLS; anything else upgrades with STARTTLS
        let builder = if cfg.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
        }
        .map_err(|e| AppError::Internal(format!("Invalid SMTP host '{}': {}", cfg.host, e)))?;

        let transport = builder
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();

        log::info!("📬 SMTP mailer ready ({}:{})", cfg.host, cfg.port);

        Ok(Self {
            transport: Some(transport),
            from: Some(from),
        })
    }

    pub fn disabled() -> Self {
        Self { transport: None, from: None }
    }

    pub async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<(), AppError> {
        let (Some(transport), Some(from)) = (&self.transport, &self.from) else {
            log::warn!("📭 Password reset for {} (mail disabled): {}", to, reset_link);
            return Ok(());
        };

        let recipient: Mailbox = to
            .parse()
            .map_err(|e| AppError::BadRequest(format!("Invalid email address: {}", e)))?;

        let message = Message::builder()
            .from(from.clone())
            .to(recipient)
            .subject("Constitutional Archive password reset")
            .header(ContentType::TEXT_PLAIN)
            .body(reset_email_body(reset_link))
            .map_err(|e| AppError::Internal(format!("Failed to build reset email: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP delivery failed: {}", e)))?;

        log::info!("📧 Password reset email sent to {}", to);
        Ok(())
    }
}

pub fn reset_email_body(reset_link: &str) -> String {
    format!(
        "You requested a password reset for your Constitutional Archive account.\n\n\
         Open the link below to choose a new password. It expires in one hour.\n\n\
         {}\n\n\
         If you did not request this, you can ignore this email.\n",
        reset_link
    )
}
