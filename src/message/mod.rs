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

use std::{fmt::Display, path::Path};

pub mod sniff;
#[cfg(feature = "templates")]
pub mod template;
pub mod writer;

/// Read access to everything the serializer needs from a message.
pub trait MessageSource {
    fn from(&self) -> &str;
    fn to(&self) -> &[String];
    fn cc(&self) -> &[String];
    fn bcc(&self) -> &[String];
    fn subject(&self) -> &str;
    fn body(&self) -> &str;
    fn priority(&self) -> Option<Priority>;
    fn attachments(&self) -> &[Attachment];
}

/// Value of the `Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Normal,
    Urgent,
    NonUrgent,
}

/// A named file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    name: String,
    contents: Vec<u8>,
}

/// An outbound e-mail message.
///
/// The body is fixed when the message is created, either from text or from a
/// rendered template. Envelope fields are replaced wholesale by the setters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: String,
    body: String,
    priority: Option<Priority>,
    attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a message whose body is `text`, verbatim.
    pub fn from_text(text: impl Into<String>) -> Self {
        Message {
            body: text.into(),
            ..Default::default()
        }
    }

    /// Sets the sender shown in the `From` header.
    pub fn set_from(&mut self, from: impl Into<String>) -> &mut Self {
        self.from = from.into();
        self
    }

    /// Replaces the list of primary recipients.
    pub fn set_to<T, U>(&mut self, to: T) -> &mut Self
    where
        T: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.to = to.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the list of carbon copy recipients.
    pub fn set_cc<T, U>(&mut self, cc: T) -> &mut Self
    where
        T: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.cc = cc.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the list of blind carbon copy recipients.
    pub fn set_bcc<T, U>(&mut self, bcc: T) -> &mut Self
    where
        T: IntoIterator<Item = U>,
        U: Into<String>,
    {
        self.bcc = bcc.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = subject.into();
        self
    }

    pub fn set_urgent_priority(&mut self) -> &mut Self {
        self.priority = Some(Priority::Urgent);
        self
    }

    pub fn set_normal_priority(&mut self) -> &mut Self {
        self.priority = Some(Priority::Normal);
        self
    }

    pub fn set_non_urgent_priority(&mut self) -> &mut Self {
        self.priority = Some(Priority::NonUrgent);
        self
    }

    /// Reads each file and attaches it under its file name.
    ///
    /// Stops at the first file that cannot be read. Files read before the
    /// failure stay attached.
    pub fn attach<T, U>(&mut self, paths: T) -> crate::Result<&mut Self>
    where
        T: IntoIterator<Item = U>,
        U: AsRef<Path>,
    {
        for path in paths {
            let path = path.as_ref();
            let contents = std::fs::read(path)?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.attach_bytes(name, contents);
        }
        Ok(self)
    }

    /// Attaches in-memory contents under `name`, replacing any attachment
    /// with the same name in place.
    pub fn attach_bytes(&mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> &mut Self {
        let attachment = Attachment {
            name: name.into(),
            contents: contents.into(),
        };
        if let Some(existing) = self
            .attachments
            .iter_mut()
            .find(|existing| existing.name == attachment.name)
        {
            *existing = attachment;
        } else {
            self.attachments.push(attachment);
        }
        self
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &[String] {
        &self.to
    }

    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    pub fn bcc(&self) -> &[String] {
        &self.bcc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Attachments in the order they were first added.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

impl MessageSource for Message {
    fn from(&self) -> &str {
        Message::from(self)
    }

    fn to(&self) -> &[String] {
        Message::to(self)
    }

    fn cc(&self) -> &[String] {
        Message::cc(self)
    }

    fn bcc(&self) -> &[String] {
        Message::bcc(self)
    }

    fn subject(&self) -> &str {
        Message::subject(self)
    }

    fn body(&self) -> &str {
        Message::body(self)
    }

    fn priority(&self) -> Option<Priority> {
        Message::priority(self)
    }

    fn attachments(&self) -> &[Attachment] {
        Message::attachments(self)
    }
}

impl Attachment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Urgent => "urgent",
            Priority::NonUrgent => "non-urgent",
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
