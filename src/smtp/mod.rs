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

use std::{future::Future, time::Duration};

use smtp_proto::Response;

pub mod auth;
pub mod client;
pub mod ehlo;
pub mod envelope;
pub mod session;
pub mod tls;

pub trait AssertReply: Sized {
    fn assert_positive_completion(self) -> crate::Result<()>;
    fn assert_code(self, code: u16) -> crate::Result<()>;
}

impl AssertReply for Response<String> {
    /// Returns an error if the reply is not a positive completion.
    #[inline(always)]
    fn assert_positive_completion(self) -> crate::Result<()> {
        if self.is_positive_completion() {
            Ok(())
        } else {
            Err(crate::Error::UnexpectedReply(self))
        }
    }

    /// Returns an error if the reply does not match the expected code.
    #[inline(always)]
    fn assert_code(self, code: u16) -> crate::Result<()> {
        if self.code() == code {
            Ok(())
        } else {
            Err(crate::Error::UnexpectedReply(self))
        }
    }
}

/// Runs `future` under `timeout` when one is configured.
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl Future<Output = crate::Result<T>>,
) -> crate::Result<T> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| crate::Error::Timeout)?,
        None => future.await,
    }
}
