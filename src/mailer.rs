/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Duration;

use serde::Deserialize;
use smtp_proto::EXT_START_TLS;
use tokio::net::TcpStream;

use crate::{
    message::{writer::MessageWriter, Message, MessageSource},
    smtp::{
        auth::{Credentials, Mechanism},
        session::{deliver, Envelope},
        tls::build_tls_connector,
        with_timeout,
    },
    Error, SmtpClient,
};

/// Port used when [`MailerOptions::port`] is not set.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Construction options for a [`Mailer`].
///
/// `user`, `password` and `host` are required. Can be deserialized from any
/// serde format, absent fields take their default value.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailerOptions {
    pub user: String,
    pub password: String,
    pub host: String,
    /// Zero means [`DEFAULT_SMTP_PORT`].
    pub port: u16,
    /// Require STARTTLS before authenticating.
    pub tls: bool,
    /// Deadline in seconds for each network step.
    pub timeout: Option<u64>,
    /// Name sent with EHLO, the local hostname by default.
    pub helo_host: Option<String>,
    /// Accept any server certificate (testing only).
    pub allow_invalid_certs: bool,
}

/// Validated, immutable mailer configuration.
#[derive(Clone)]
pub struct MailerConfig {
    user: String,
    password: String,
    host: String,
    port: u16,
    tls: bool,
    timeout: Option<Duration>,
    helo_host: String,
    allow_invalid_certs: bool,
}

/// Sends one [`MessageSource`] through an SMTP submission server.
pub struct Mailer<'x, M: MessageSource + ?Sized = Message> {
    config: MailerConfig,
    message: Option<&'x M>,
    boundary: String,
}

impl MailerConfig {
    pub fn from_options(opts: MailerOptions) -> crate::Result<Self> {
        if opts.user.is_empty() {
            return Err(Error::MissingField("user"));
        }
        if opts.password.is_empty() {
            return Err(Error::MissingField("password"));
        }
        if opts.host.is_empty() {
            return Err(Error::MissingField("host"));
        }

        Ok(MailerConfig {
            user: opts.user,
            password: opts.password,
            host: opts.host,
            port: if opts.port != 0 {
                opts.port
            } else {
                DEFAULT_SMTP_PORT
            },
            tls: opts.tls,
            timeout: opts.timeout.map(Duration::from_secs),
            helo_host: opts
                .helo_host
                .filter(|host| !host.is_empty())
                .unwrap_or_else(|| {
                    gethostname::gethostname()
                        .to_str()
                        .unwrap_or("[127.0.0.1]")
                        .to_string()
                }),
            allow_invalid_certs: opts.allow_invalid_certs,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` as dialed.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn use_tls(&self) -> bool {
        self.tls
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn helo_host(&self) -> &str {
        &self.helo_host
    }

    pub fn allow_invalid_certs(&self) -> bool {
        self.allow_invalid_certs
    }
}

impl std::fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .field("helo_host", &self.helo_host)
            .field("allow_invalid_certs", &self.allow_invalid_certs)
            .finish()
    }
}

impl std::fmt::Debug for MailerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailerOptions")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .field("helo_host", &self.helo_host)
            .field("allow_invalid_certs", &self.allow_invalid_certs)
            .finish()
    }
}

impl<'x, M: MessageSource + ?Sized> Mailer<'x, M> {
    /// Validates the options. Fails with [`Error::MissingField`] naming the
    /// first empty required option.
    pub fn new(opts: MailerOptions) -> crate::Result<Self> {
        Ok(Mailer {
            config: MailerConfig::from_options(opts)?,
            message: None,
            boundary: String::new(),
        })
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Sets the message to be sent.
    pub fn set_message(&mut self, message: &'x M) -> &mut Self {
        self.message = Some(message);
        self
    }

    pub fn message(&self) -> Option<&'x M> {
        self.message
    }

    /// Sets the multipart boundary. An empty boundary means a random one is
    /// generated for every serialization.
    pub fn set_boundary(&mut self, boundary: impl Into<String>) -> &mut Self {
        self.boundary = boundary.into();
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Serializes the current message.
    pub fn write_message(&self) -> crate::Result<Vec<u8>> {
        let message = self.message.ok_or(Error::MissingMessage)?;
        Ok(MessageWriter::new(message)
            .boundary(&self.boundary)
            .write_to_vec())
    }

    /// Delivers the current message. The connection does not outlive this
    /// call, whether it succeeds or fails.
    pub async fn send(&self) -> crate::Result<()> {
        let message = self.message.ok_or(Error::MissingMessage)?;
        let contents = self.write_message()?;
        let config = &self.config;
        let credentials = Credentials::new(config.user(), config.password());
        let envelope = Envelope {
            mail_from: config.user(),
            rcpt_to: message.to(),
        };

        let address = config.address();
        let stream = with_timeout(config.timeout(), async {
            TcpStream::connect(&address)
                .await
                .map_err(Error::Connection)
        })
        .await?;
        log::debug!("Connected to {address}");

        let mut client = SmtpClient::new(stream, config.timeout());
        client.read_greeting().await?;
        let capabilities = client.ehlo(config.helo_host()).await?;

        if config.use_tls() || capabilities.has_capability(EXT_START_TLS) {
            let tls_connector = build_tls_connector(config.allow_invalid_certs());
            let mut client = client.start_tls(&tls_connector, config.host()).await?;
            let capabilities = client.ehlo(config.helo_host()).await?;
            let mechanism = if config.use_tls() {
                Mechanism::select(&capabilities)?
            } else {
                // Opportunistic STARTTLS keeps PLAIN
                Mechanism::select(&capabilities).map(|_| Mechanism::Plain)?
            };
            log::debug!("Authenticating with {mechanism}");
            deliver(&mut client, &credentials, mechanism, envelope, &contents).await
        } else {
            Mechanism::select(&capabilities)?;
            if !is_local_host(config.host()) {
                return Err(Error::InsecureAuth);
            }
            log::debug!("Authenticating with {} over cleartext", Mechanism::Plain);
            deliver(
                &mut client,
                &credentials,
                Mechanism::Plain,
                envelope,
                &contents,
            )
            .await
        }
    }
}

/// PLAIN credentials may only travel in cleartext to these hosts.
fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}
