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

use std::io::{self, Write};

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

use super::{sniff::detect_content_type, MessageSource};

/// RFC 5322 section 2.1.1 line length limit, excluding the line break.
pub const MAX_LINE_LENGTH: usize = 998;

const BOUNDARY_RANDOM_BYTES: usize = 30;

/// Serializes a [`MessageSource`] into RFC 5322 / MIME bytes.
///
/// Lines are separated by a bare `\n`; the SMTP data writer takes care of
/// converting them to CRLF on the wire.
pub struct MessageWriter<'x, M: MessageSource + ?Sized> {
    message: &'x M,
    boundary: Option<&'x str>,
}

impl<'x, M: MessageSource + ?Sized> MessageWriter<'x, M> {
    pub fn new(message: &'x M) -> Self {
        MessageWriter {
            message,
            boundary: None,
        }
    }

    /// Uses `boundary` as the multipart delimiter instead of a random one.
    /// An empty string means "generate one".
    pub fn boundary(mut self, boundary: &'x str) -> Self {
        self.boundary = if !boundary.is_empty() {
            Some(boundary)
        } else {
            None
        };
        self
    }

    pub fn write_to_vec(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.message.body().len() + 512);
        // Writing to a Vec does not fail
        let _ = self.write_to(&mut output);
        output
    }

    pub fn write_to(&self, mut output: impl Write) -> io::Result<()> {
        let message = self.message;

        output.write_all(b"MIME-Version: 1.0\n")?;
        writeln!(output, "From: {}", message.from())?;
        writeln!(output, "To: {}", message.to().join(","))?;
        writeln!(output, "Subject: {}", message.subject())?;
        if !message.cc().is_empty() {
            writeln!(output, "Cc: {}", message.cc().join(","))?;
        }
        if !message.bcc().is_empty() {
            writeln!(output, "Bcc: {}", message.bcc().join(","))?;
        }
        if let Some(priority) = message.priority() {
            writeln!(output, "Priority: {}", priority)?;
        }

        let body = chunk_lines(message.body());
        let attachments = message
            .attachments()
            .iter()
            .map(|attachment| {
                (
                    attachment,
                    chunk_string(&STANDARD.encode(attachment.contents())),
                )
            })
            .collect::<Vec<_>>();

        if attachments.is_empty() {
            write!(
                output,
                "Content-Type: {}\n\n",
                detect_content_type(message.body().as_bytes())
            )?;
            return output.write_all(body.as_bytes());
        }

        let boundary = match self.boundary {
            Some(boundary) => boundary.to_string(),
            None => loop {
                let boundary = random_boundary();
                if !body.contains(&boundary)
                    && !attachments
                        .iter()
                        .any(|(_, encoded)| encoded.contains(&boundary))
                {
                    break boundary;
                }
            },
        };

        write!(
            output,
            "Content-Type: multipart/mixed;\n boundary={boundary}\n\n--{boundary}\n"
        )?;
        write!(
            output,
            "Content-Type: {}\n\n",
            detect_content_type(message.body().as_bytes())
        )?;
        output.write_all(body.as_bytes())?;

        for (attachment, encoded) in &attachments {
            write!(output, "\n--{boundary}\n")?;
            writeln!(
                output,
                "Content-Type: {}",
                detect_content_type(attachment.contents())
            )?;
            output.write_all(b"Content-Transfer-Encoding: base64\n")?;
            write!(
                output,
                "Content-Disposition: attachment; filename={}\n\n",
                attachment.name()
            )?;
            output.write_all(encoded.as_bytes())?;
            write!(output, "\n--{boundary}")?;
        }

        output.write_all(b"--")
    }
}

/// Folds every line of `text` at [`MAX_LINE_LENGTH`] and joins the result
/// with `\n`. A trailing `\r` is removed from each line and a final line
/// break does not produce an empty line.
pub fn chunk_lines(text: &str) -> String {
    let text = text.strip_suffix('\n').unwrap_or(text);
    if text.is_empty() {
        return String::new();
    }

    let mut output = String::with_capacity(text.len() + text.len() / MAX_LINE_LENGTH);
    for (pos, line) in text.split('\n').enumerate() {
        if pos > 0 {
            output.push('\n');
        }
        push_chunks(&mut output, line.strip_suffix('\r').unwrap_or(line));
    }
    output
}

/// Splits `text` into [`MAX_LINE_LENGTH`] byte chunks joined by `\n`.
/// A chunk never ends in the middle of a UTF-8 sequence.
pub fn chunk_string(text: &str) -> String {
    let mut output = String::with_capacity(text.len() + text.len() / MAX_LINE_LENGTH);
    push_chunks(&mut output, text);
    output
}

fn push_chunks(output: &mut String, mut text: &str) {
    while text.len() > MAX_LINE_LENGTH {
        let mut end = MAX_LINE_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let (chunk, rest) = text.split_at(end);
        output.push_str(chunk);
        output.push('\n');
        text = rest;
    }
    output.push_str(text);
}

/// Returns 60 random lowercase hex characters.
pub fn random_boundary() -> String {
    let mut buf = [0u8; BOUNDARY_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod test {
    use base64::{engine::general_purpose::STANDARD, Engine};

    use crate::message::Message;

    use super::{chunk_lines, chunk_string, random_boundary, MessageWriter, MAX_LINE_LENGTH};

    fn test_message(subject: &str) -> Message {
        let mut message = Message::from_text("this is a test");
        message
            .set_from("test@tinymail.test")
            .set_to(["test.to@tinymail.test"])
            .set_subject(subject)
            .set_cc(["test.cc@tinymail.test"])
            .set_bcc(["test.bcc@tinymail.test"]);
        message
    }

    #[test]
    fn write_message() {
        let message = test_message("TestWriteMessage");
        assert_eq!(
            String::from_utf8(MessageWriter::new(&message).write_to_vec()).unwrap(),
            concat!(
                "MIME-Version: 1.0\n",
                "From: test@tinymail.test\n",
                "To: test.to@tinymail.test\n",
                "Subject: TestWriteMessage\n",
                "Cc: test.cc@tinymail.test\n",
                "Bcc: test.bcc@tinymail.test\n",
                "Content-Type: text/plain; charset=utf-8\n",
                "\n",
                "this is a test"
            )
        );
    }

    #[test]
    fn write_message_urgent() {
        let mut message = test_message("TestWriteMessageUrgent");
        message.set_urgent_priority();
        assert_eq!(
            String::from_utf8(MessageWriter::new(&message).write_to_vec()).unwrap(),
            concat!(
                "MIME-Version: 1.0\n",
                "From: test@tinymail.test\n",
                "To: test.to@tinymail.test\n",
                "Subject: TestWriteMessageUrgent\n",
                "Cc: test.cc@tinymail.test\n",
                "Bcc: test.bcc@tinymail.test\n",
                "Priority: urgent\n",
                "Content-Type: text/plain; charset=utf-8\n",
                "\n",
                "this is a test"
            )
        );
    }

    #[test]
    fn write_message_minimal() {
        let mut message = Message::from_text("hello");
        message
            .set_from("a@x.com")
            .set_to(["b@x.com", "c@x.com"])
            .set_subject("Hi");
        let output = String::from_utf8(MessageWriter::new(&message).write_to_vec()).unwrap();
        assert_eq!(
            output,
            concat!(
                "MIME-Version: 1.0\n",
                "From: a@x.com\n",
                "To: b@x.com,c@x.com\n",
                "Subject: Hi\n",
                "Content-Type: text/plain; charset=utf-8\n",
                "\n",
                "hello"
            )
        );
        assert!(!output.contains("--"));
        assert!(!output.contains("Cc:"));
        assert!(!output.contains("Bcc:"));
        assert!(!output.contains("Priority:"));
        assert_eq!(output.matches("Content-Type:").count(), 1);
    }

    #[test]
    fn write_message_empty_body() {
        let message = Message::from_text("");
        assert_eq!(
            String::from_utf8(MessageWriter::new(&message).write_to_vec()).unwrap(),
            concat!(
                "MIME-Version: 1.0\n",
                "From: \n",
                "To: \n",
                "Subject: \n",
                "Content-Type: text/plain; charset=utf-8\n",
                "\n",
            )
        );
    }

    #[test]
    fn write_message_attachment() {
        let boundary = "7b7f6c9583aae2870247062aac5ca1bc1610b22b627ae2c5366bb1394ed0";
        let mut message = test_message("TestWriteMessageAttach");
        message.attach_bytes("TestWriteMessageAttach", vec![0u8; 512]);

        let expected = format!(
            concat!(
                "MIME-Version: 1.0\n",
                "From: test@tinymail.test\n",
                "To: test.to@tinymail.test\n",
                "Subject: TestWriteMessageAttach\n",
                "Cc: test.cc@tinymail.test\n",
                "Bcc: test.bcc@tinymail.test\n",
                "Content-Type: multipart/mixed;\n",
                " boundary={b}\n",
                "\n",
                "--{b}\n",
                "Content-Type: text/plain; charset=utf-8\n",
                "\n",
                "this is a test\n",
                "--{b}\n",
                "Content-Type: application/octet-stream\n",
                "Content-Transfer-Encoding: base64\n",
                "Content-Disposition: attachment; filename=TestWriteMessageAttach\n",
                "\n",
                "{data}\n",
                "--{b}--"
            ),
            b = boundary,
            data = format!("{}=", "A".repeat(683)),
        );

        assert_eq!(
            String::from_utf8(
                MessageWriter::new(&message)
                    .boundary(boundary)
                    .write_to_vec()
            )
            .unwrap(),
            expected
        );
    }

    #[test]
    fn write_message_attachments_round_trip() {
        let mut message = Message::from_text("body");
        message
            .set_from("a@x.com")
            .set_to(["b@x.com"])
            .set_subject("Hi")
            .attach_bytes("report.bin", vec![0u8; 512])
            .attach_bytes(
                "large.bin",
                (0..4096u32).map(|n| (n % 251) as u8).collect::<Vec<_>>(),
            );

        let output = String::from_utf8(
            MessageWriter::new(&message)
                .boundary("BOUND1")
                .write_to_vec(),
        )
        .unwrap();

        assert!(output.ends_with("--BOUND1--"));
        assert_eq!(output.matches("\n--BOUND1\n").count(), 3);
        assert!(output.contains("Content-Disposition: attachment; filename=report.bin\n"));
        assert!(output.lines().all(|line| line.len() <= MAX_LINE_LENGTH));

        // Every attachment part decodes back to the original bytes, in order
        let parts = output
            .trim_end_matches("--")
            .split("\n--BOUND1")
            .filter(|part| part.contains("Content-Transfer-Encoding: base64"))
            .map(|part| {
                let (_, encoded) = part.split_once("\n\n").unwrap();
                STANDARD.decode(encoded.replace('\n', "")).unwrap()
            })
            .collect::<Vec<_>>();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], message.attachments()[0].contents());
        assert_eq!(parts[1], message.attachments()[1].contents());
    }

    #[test]
    fn generated_boundary() {
        let mut message = Message::from_text("body");
        message.attach_bytes("a.txt", b"attachment".to_vec());

        let output = String::from_utf8(MessageWriter::new(&message).write_to_vec()).unwrap();
        let boundary = output
            .lines()
            .find_map(|line| line.strip_prefix(" boundary="))
            .unwrap();
        assert_eq!(boundary.len(), 60);
        assert!(boundary
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch)));
        assert!(output.contains(&format!("\n\n--{boundary}\n")));
        assert!(output.ends_with(&format!("\n--{boundary}--")));

        // An empty override still generates a boundary
        let output = String::from_utf8(MessageWriter::new(&message).boundary("").write_to_vec())
            .unwrap();
        assert!(output.contains(" boundary="));
        assert_ne!(random_boundary(), random_boundary());
    }

    #[test]
    fn line_folding() {
        let long = "x".repeat(MAX_LINE_LENGTH * 2 + 10);
        let folded = chunk_string(&long);
        assert_eq!(
            folded.split('\n').map(str::len).collect::<Vec<_>>(),
            [MAX_LINE_LENGTH, MAX_LINE_LENGTH, 10]
        );
        assert_eq!(folded.replace('\n', ""), long);

        assert_eq!(chunk_string(""), "");
        assert_eq!(chunk_string(&"y".repeat(MAX_LINE_LENGTH)), "y".repeat(MAX_LINE_LENGTH));

        let text = format!("short\r\n{long}\nend\n");
        let folded = chunk_lines(&text);
        assert!(folded.split('\n').all(|line| line.len() <= MAX_LINE_LENGTH));
        assert!(folded.starts_with("short\nxxx"));
        assert!(folded.ends_with("\nend"));
        assert_eq!(folded.replace('\n', ""), text.replace(['\r', '\n'], ""));

        assert_eq!(chunk_lines(""), "");
        assert_eq!(chunk_lines("\n"), "");
        assert_eq!(chunk_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn line_folding_keeps_characters_whole() {
        // 997 ASCII bytes followed by a two byte character
        let text = format!("{}ü{}", "a".repeat(MAX_LINE_LENGTH - 1), "b".repeat(5));
        let folded = chunk_string(&text);
        let lines = folded.split('\n').collect::<Vec<_>>();
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH - 1);
        assert_eq!(lines[1], "übbbbb");
    }

    #[test]
    fn long_body_is_folded_in_output() {
        let body = "z".repeat(2500);
        let message = Message::from_text(body.clone());
        let output = String::from_utf8(MessageWriter::new(&message).write_to_vec()).unwrap();
        let (_, written_body) = output.split_once("\n\n").unwrap();
        assert!(written_body.split('\n').all(|line| line.len() <= MAX_LINE_LENGTH));
        assert_eq!(written_body.replace('\n', ""), body);
    }
}
