use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{GatewayError, Result};
use crate::SmtpConfig;

/// SMTP sender for email-type campaigns.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| GatewayError::SmtpError(e.to_string()))?
            .port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| GatewayError::ConfigError(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| GatewayError::SmtpError(format!("invalid recipient '{to}': {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| GatewayError::SmtpError(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| GatewayError::SmtpError(e.to_string()))?;
        Ok(())
    }
}
