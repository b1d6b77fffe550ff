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

//! # tinymail
//!
//! _tinymail_ is a small Rust library to compose and send e-mail messages via SMTP. It includes the following features:
//!
//! - Generates **e-mail** messages conforming to the Internet Message Format standard (_RFC 5322_), folding
//!   long lines at the 998 character limit.
//! - **MIME** multipart/mixed messages (_RFC 2046_) with base64 encoded attachments and sniffed content types.
//! - Message bodies from plain text or rendered **templates** (optional `templates` feature, enabled by default).
//! - Simple Mail Transfer Protocol (**SMTP**; _RFC 5321_) delivery.
//! - SMTP Service Extension for Secure SMTP over **TLS** (_RFC 3207_).
//! - SMTP Service Extension for Authentication (_RFC 4954_) using PLAIN, or LOGIN when the server
//!   does not offer PLAIN.
//! - Full async (requires Tokio).
//!
//! ## Usage Example
//!
//! Send a message with an attachment through a submission server that requires STARTTLS:
//!
//! ```rust
//!     let mut message = Message::from_text("These pretzels are making me thirsty.");
//!     message
//!         .set_from("john@example.com")
//!         .set_to(["jane@example.com", "james@test.com"])
//!         .set_subject("Howdy!")
//!         .set_urgent_priority()
//!         .attach(["./pretzels.png"])?;
//!
//!     let mut mailer = Mailer::new(MailerOptions {
//!         user: "john@example.com".into(),
//!         password: "p4ssw0rd".into(),
//!         host: "smtp.example.com".into(),
//!         tls: true,
//!         ..Default::default()
//!     })?;
//!
//!     mailer.set_message(&message).send().await?;
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!

pub mod mailer;
pub mod message;
pub mod smtp;

use std::{fmt::Display, time::Duration};

use smtp_proto::Response;
use tokio::io::{AsyncRead, AsyncWrite};

pub use mailer::{Mailer, MailerConfig, MailerOptions, DEFAULT_SMTP_PORT};
pub use message::{writer::MessageWriter, Attachment, Message, MessageSource, Priority};
pub use smtp::{auth::Credentials, auth::Mechanism, session::Transport};

#[derive(Debug)]
pub enum Error {
    /// Required mailer option is empty.
    MissingField(&'static str),

    /// Envelope address contains a line break.
    InvalidAddress(String),

    /// No message was set on the mailer.
    MissingMessage,

    /// I/O error reading an attachment.
    Io(std::io::Error),

    /// Template parse or render error.
    #[cfg(feature = "templates")]
    Template(tera::Error),

    /// Network error while talking to the SMTP server.
    Connection(std::io::Error),

    /// TLS handshake error.
    Tls(rustls::Error),

    /// The server refused the STARTTLS command.
    StartTlsRejected(Response<String>),

    /// Invalid TLS name provided.
    InvalidTLSName,

    /// The server does not advertise the AUTH extension.
    NoAuthMethod,

    /// Unrecognized prompt received during LOGIN authentication.
    UnexpectedChallenge(String),

    /// PLAIN credentials would be sent over an unencrypted connection.
    InsecureAuth,

    /// Failure parsing SMTP reply.
    UnparseableReply,

    /// Unexpected SMTP reply.
    UnexpectedReply(Response<String>),

    /// SMTP authentication failure.
    AuthenticationFailed(Response<String>),

    /// Connection timeout.
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;

/// SMTP client over an arbitrary byte stream.
pub struct SmtpClient<T: AsyncRead + AsyncWrite> {
    pub stream: T,
    pub timeout: Option<Duration>,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) | Error::Connection(err) => Some(err),
            #[cfg(feature = "templates")]
            Error::Template(err) => Some(err),
            Error::Tls(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MissingField(field) => write!(f, "MailerOptions.{field} is empty"),
            Error::InvalidAddress(addr) => {
                write!(f, "Address must not contain CR or LF: {addr:?}")
            }
            Error::MissingMessage => write!(f, "No message set"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "templates")]
            Error::Template(e) => write!(f, "Template error: {e}"),
            Error::Connection(e) => write!(f, "Connection error: {e}"),
            Error::Tls(e) => write!(f, "TLS error: {e}"),
            Error::StartTlsRejected(e) => write!(
                f,
                "STARTTLS rejected: {} {}",
                e.code(),
                e.message()
            ),
            Error::InvalidTLSName => write!(f, "Invalid TLS name provided"),
            Error::NoAuthMethod => write!(f, "No authentication method found"),
            Error::UnexpectedChallenge(e) => write!(f, "Unexpected LOGIN challenge: {e:?}"),
            Error::InsecureAuth => write!(f, "Refusing to authenticate over an unencrypted connection"),
            Error::UnparseableReply => write!(f, "Unparseable SMTP reply"),
            Error::UnexpectedReply(e) => {
                write!(f, "Unexpected reply: {} {}", e.code(), e.message())
            }
            Error::AuthenticationFailed(e) => {
                write!(f, "Authentication failed: {} {}", e.code(), e.message())
            }
            Error::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(feature = "templates")]
impl From<tera::Error> for Error {
    fn from(err: tera::Error) -> Self {
        Error::Template(err)
    }
}
