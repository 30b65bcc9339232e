use std::fmt::{self, Display, Formatter};

use crate::{ProtocolError, Result};

const MIN_FIELDS: usize = 4;

/// A parsed `*IDN?` response of the form `vendor,model,serial,firmware`.
///
/// Construction validates the field count, so accessors never fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    raw: String,
    fields: Vec<String>,
}

impl Identity {
    pub fn parse<T: Into<String>>(raw: T) -> Result<Self> {
        let raw = raw.into();
        let fields: Vec<String> = raw.split(',').map(|x| x.to_string()).collect();
        if fields.len() < MIN_FIELDS {
            return Err(ProtocolError::MalformedIdentity(raw).into());
        }
        Ok(Self { raw, fields })
    }

    /// The response exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn vendor(&self) -> &str {
        &self.fields[0]
    }

    pub fn model(&self) -> &str {
        &self.fields[1]
    }

    /// Offline instruments report their hostname in the serial number field.
    pub fn hostname(&self) -> &str {
        &self.fields[2]
    }

    pub fn serial_number(&self) -> &str {
        &self.fields[2]
    }

    pub fn firmware(&self) -> &str {
        self.fields[3].trim_end_matches('\n')
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw.trim_end_matches('\n'))
    }
}
