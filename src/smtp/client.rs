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

use std::time::Duration;

use smtp_proto::{response::parser::ResponseReceiver, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

use super::with_timeout;

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Wraps an established stream. No bytes are exchanged.
    pub fn new(stream: T, timeout: Option<Duration>) -> Self {
        SmtpClient { stream, timeout }
    }

    pub(crate) async fn read(&mut self) -> crate::Result<Response<String>> {
        let mut buf = vec![0u8; 1024];
        let mut parser = ResponseReceiver::default();

        loop {
            let br = self
                .stream
                .read(&mut buf)
                .await
                .map_err(crate::Error::Connection)?;

            if br == 0 {
                return Err(crate::Error::UnparseableReply);
            }

            match parser.parse(&mut buf[..br].iter()) {
                Ok(reply) => {
                    log::trace!("< {} {}", reply.code(), reply.message());
                    return Ok(reply);
                }
                Err(err) => match err {
                    smtp_proto::Error::NeedsMoreData { .. } => (),
                    _ => {
                        return Err(crate::Error::UnparseableReply);
                    }
                },
            }
        }
    }

    /// Reads the server greeting, which must be a positive completion.
    pub async fn read_greeting(&mut self) -> crate::Result<Response<String>> {
        let timeout = self.timeout;
        let reply = with_timeout(timeout, self.read()).await?;
        if (200..=299).contains(&reply.code()) {
            Ok(reply)
        } else {
            Err(crate::Error::UnexpectedReply(reply))
        }
    }

    /// Sends a command to the SMTP server and waits for a reply.
    pub async fn cmd(&mut self, cmd: impl AsRef<[u8]>) -> crate::Result<Response<String>> {
        let cmd = cmd.as_ref();
        log::trace!("> {}", String::from_utf8_lossy(cmd).trim_end());
        self.exchange(cmd).await
    }

    /// Same as [`SmtpClient::cmd`] but keeps the command out of the logs.
    pub(crate) async fn cmd_secret(&mut self, cmd: impl AsRef<[u8]>) -> crate::Result<Response<String>> {
        log::trace!("> <redacted>");
        self.exchange(cmd.as_ref()).await
    }

    async fn exchange(&mut self, cmd: &[u8]) -> crate::Result<Response<String>> {
        let timeout = self.timeout;
        with_timeout(timeout, async {
            self.stream
                .write_all(cmd)
                .await
                .map_err(crate::Error::Connection)?;
            self.stream.flush().await.map_err(crate::Error::Connection)?;
            self.read().await
        })
        .await
    }
}
