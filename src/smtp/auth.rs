/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{borrow::Cow, fmt::Display};

use base64::{engine::general_purpose::STANDARD, Engine};
use smtp_proto::{EhloResponse, AUTH_LOGIN, AUTH_PLAIN, EXT_AUTH};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials<'x> {
    username: Cow<'x, str>,
    secret: Cow<'x, str>,
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    /// Plain
    Plain,

    /// Login
    Login,
}

impl<'x> Credentials<'x> {
    /// Creates a new `Credentials` instance.
    pub fn new(
        username: impl Into<Cow<'x, str>>,
        secret: impl Into<Cow<'x, str>>,
    ) -> Credentials<'x> {
        Credentials {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Initial response sent along with `AUTH PLAIN`.
    pub(crate) fn encode_plain(&self) -> String {
        STANDARD.encode(format!("\u{0}{}\u{0}{}", self.username, self.secret))
    }

    /// Answers a base64 encoded LOGIN prompt.
    pub(crate) fn encode_login(&self, challenge: &str) -> crate::Result<String> {
        let challenge = STANDARD
            .decode(challenge.trim())
            .map_err(|_| crate::Error::UnexpectedChallenge(challenge.to_string()))?;

        match challenge.as_slice() {
            b"Username:" => Ok(STANDARD.encode(self.username.as_bytes())),
            b"Password:" => Ok(STANDARD.encode(self.secret.as_bytes())),
            _ => Err(crate::Error::UnexpectedChallenge(
                String::from_utf8_lossy(&challenge).into_owned(),
            )),
        }
    }
}

impl<'x> From<(&'x str, &'x str)> for Credentials<'x> {
    fn from(credentials: (&'x str, &'x str)) -> Self {
        Credentials::new(credentials.0, credentials.1)
    }
}

impl<'x> From<(String, String)> for Credentials<'x> {
    fn from(credentials: (String, String)) -> Self {
        Credentials::new(credentials.0, credentials.1)
    }
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Mechanism {
    /// Picks the mechanism for a server's EHLO response: PLAIN, unless the
    /// server offers LOGIN without PLAIN.
    pub fn select(capabilities: &EhloResponse<String>) -> crate::Result<Mechanism> {
        let mechanisms = capabilities.auth_mechanisms;
        if !capabilities.has_capability(EXT_AUTH) && mechanisms == 0 {
            Err(crate::Error::NoAuthMethod)
        } else if mechanisms & AUTH_LOGIN != 0 && mechanisms & AUTH_PLAIN == 0 {
            Ok(Mechanism::Login)
        } else {
            Ok(Mechanism::Plain)
        }
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mechanism::Plain => write!(f, "PLAIN"),
            Mechanism::Login => write!(f, "LOGIN"),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Authenticates with the given mechanism.
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
        mechanism: Mechanism,
    ) -> crate::Result<&mut Self> {
        let mut reply = match mechanism {
            Mechanism::Plain => {
                self.cmd_secret(format!("AUTH PLAIN {}\r\n", credentials.encode_plain()))
                    .await?
            }
            Mechanism::Login => self.cmd(b"AUTH LOGIN\r\n").await?,
        };

        // LOGIN asks for the user name and then the password
        for _ in 0..3 {
            match reply.code() {
                334 if mechanism == Mechanism::Login => {
                    let response = match credentials.encode_login(reply.message()) {
                        Ok(response) => response,
                        Err(err) => {
                            // Cancel the exchange, the challenge error is what matters
                            let _ = self.cmd(b"*\r\n").await;
                            return Err(err);
                        }
                    };
                    reply = self.cmd_secret(format!("{response}\r\n")).await?;
                }
                235 => {
                    log::debug!("Authenticated as {} using {}", credentials.username(), mechanism);
                    return Ok(self);
                }
                _ => {
                    return Err(crate::Error::AuthenticationFailed(reply));
                }
            }
        }

        Err(crate::Error::AuthenticationFailed(reply))
    }
}
