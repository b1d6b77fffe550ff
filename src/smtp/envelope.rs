/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::SmtpClient;

use super::{with_timeout, AssertReply};

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Sends a MAIL FROM command to the server.
    pub async fn mail_from(&mut self, addr: &str) -> crate::Result<()> {
        validate_line(addr)?;
        self.cmd(format!("MAIL FROM:<{addr}>\r\n").as_bytes())
            .await?
            .assert_positive_completion()
    }

    /// Sends a RCPT TO command to the server.
    pub async fn rcpt_to(&mut self, addr: &str) -> crate::Result<()> {
        validate_line(addr)?;
        self.cmd(format!("RCPT TO:<{addr}>\r\n").as_bytes())
            .await?
            .assert_positive_completion()
    }

    /// Sends a DATA command to the server, followed by the message.
    pub async fn data(&mut self, message: impl AsRef<[u8]>) -> crate::Result<()> {
        self.cmd(b"DATA\r\n").await?.assert_code(354)?;
        let timeout = self.timeout;
        with_timeout(timeout, async {
            // Write message
            self.write_message(message.as_ref()).await?;
            self.read().await
        })
        .await?
        .assert_positive_completion()?;
        log::debug!("Message accepted ({} bytes)", message.as_ref().len());
        Ok(())
    }

    /// Sends a QUIT command to the server.
    pub async fn quit(&mut self) -> crate::Result<()> {
        self.cmd(b"QUIT\r\n").await?.assert_positive_completion()
    }

    /// Writes the message with line endings normalized to CRLF, lines
    /// starting with a dot escaped, and the final `.` terminator.
    pub(crate) async fn write_message(&mut self, message: &[u8]) -> crate::Result<()> {
        self.stream
            .write_all(&dot_stuff(message))
            .await
            .map_err(crate::Error::Connection)?;
        self.stream.flush().await.map_err(crate::Error::Connection)
    }
}

pub(crate) fn dot_stuff(message: &[u8]) -> Vec<u8> {
    // Transparency procedure
    #[derive(Debug)]
    enum State {
        Cr,
        LineStart,
        Init,
    }

    let mut output = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let mut state = State::LineStart;

    for byte in message {
        match byte {
            b'.' if matches!(state, State::LineStart) => {
                output.extend_from_slice(b"..");
                state = State::Init;
            }
            b'\r' => {
                if matches!(state, State::Cr) {
                    output.extend_from_slice(b"\r\n");
                }
                state = State::Cr;
            }
            b'\n' => {
                output.extend_from_slice(b"\r\n");
                state = State::LineStart;
            }
            _ => {
                // A lone CR ends the line, a dot opening the next one is escaped
                if matches!(state, State::Cr) {
                    output.extend_from_slice(b"\r\n");
                    if *byte == b'.' {
                        output.push(b'.');
                    }
                }
                output.push(*byte);
                state = State::Init;
            }
        }
    }

    if !matches!(state, State::LineStart) {
        output.extend_from_slice(b"\r\n");
    }
    output.extend_from_slice(b".\r\n");
    output
}

fn validate_line(addr: &str) -> crate::Result<()> {
    if addr.contains(['\r', '\n']) {
        Err(crate::Error::InvalidAddress(addr.to_string()))
    } else {
        Ok(())
    }
}
