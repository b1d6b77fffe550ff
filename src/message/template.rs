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

use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};

use super::Message;

impl Message {
    /// Creates a message whose body is `template` rendered with `data`.
    ///
    /// Output is HTML auto-escaped. `data` must serialize to a map, or to
    /// `null` for a template without variables.
    pub fn from_template_str(data: &impl Serialize, template: &str) -> crate::Result<Self> {
        Ok(Message::from_text(Tera::one_off(
            template,
            &build_context(data)?,
            true,
        )?))
    }

    /// Creates a message whose body is the first template file rendered with
    /// `data`. The remaining files are loaded alongside it so they can be
    /// included or extended by name (the file name without directories).
    pub fn from_template_files<T, U>(data: &impl Serialize, paths: T) -> crate::Result<Self>
    where
        T: IntoIterator<Item = U>,
        U: AsRef<Path>,
    {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref().to_path_buf();
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    tera::Error::msg(format!("Invalid template path {}", path.display()))
                })?;
            files.push((path, Some(name)));
        }

        let name = files
            .first()
            .and_then(|(_, name)| name.clone())
            .ok_or_else(|| tera::Error::msg("No template files provided"))?;

        let mut tera = Tera::default();
        tera.add_template_files(files)?;
        Ok(Message::from_text(tera.render(&name, &build_context(data)?)?))
    }
}

fn build_context(data: &impl Serialize) -> crate::Result<Context> {
    match serde_json::to_value(data).map_err(|err| tera::Error::msg(err.to_string()))? {
        serde_json::Value::Null => Ok(Context::new()),
        value => Ok(Context::from_value(value)?),
    }
}
