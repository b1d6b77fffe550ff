/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use tokio::io::{AsyncRead, AsyncWrite};

use crate::SmtpClient;

use super::auth::{Credentials, Mechanism};

/// The steps of an SMTP submission after the connection is established.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
        mechanism: Mechanism,
    ) -> crate::Result<()>;
    async fn mail_from(&mut self, addr: &str) -> crate::Result<()>;
    async fn rcpt_to(&mut self, addr: &str) -> crate::Result<()>;
    async fn data(&mut self, message: &[u8]) -> crate::Result<()>;
    async fn quit(&mut self) -> crate::Result<()>;
}

/// SMTP envelope: the reverse path and the forward paths.
#[derive(Debug, Clone, Copy)]
pub struct Envelope<'x> {
    pub mail_from: &'x str,
    pub rcpt_to: &'x [String],
}

impl<T: AsyncRead + AsyncWrite + Unpin> Transport for SmtpClient<T> {
    async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
        mechanism: Mechanism,
    ) -> crate::Result<()> {
        SmtpClient::authenticate(self, credentials, mechanism)
            .await
            .map(|_| ())
    }

    async fn mail_from(&mut self, addr: &str) -> crate::Result<()> {
        SmtpClient::mail_from(self, addr).await
    }

    async fn rcpt_to(&mut self, addr: &str) -> crate::Result<()> {
        SmtpClient::rcpt_to(self, addr).await
    }

    async fn data(&mut self, message: &[u8]) -> crate::Result<()> {
        SmtpClient::data(self, message).await
    }

    async fn quit(&mut self) -> crate::Result<()> {
        SmtpClient::quit(self).await
    }
}

/// Authenticates, sends the envelope and the message, then quits.
/// The first failing step ends the session.
pub async fn deliver(
    transport: &mut impl Transport,
    credentials: &Credentials<'_>,
    mechanism: Mechanism,
    envelope: Envelope<'_>,
    message: &[u8],
) -> crate::Result<()> {
    transport.authenticate(credentials, mechanism).await?;
    transport.mail_from(envelope.mail_from).await?;
    for rcpt in envelope.rcpt_to {
        transport.rcpt_to(rcpt).await?;
    }
    transport.data(message).await?;
    transport.quit().await
}
