use super::{DssatError, DssatResult};
use encoding_rs::{Encoding, GBK, UTF_8};
use serde::{Deserialize, Serialize};

/// Character encoding of a text file owned by the DSSAT installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[serde(alias = "utf-8")]
    Utf8,
    Gbk,
}

impl TextEncoding {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Gbk => "gbk",
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::Gbk => GBK,
        }
    }

    /// Decodes `bytes`, refusing malformed input instead of substituting
    /// replacement characters that would later be written back.
    pub fn decode(self, bytes: &[u8]) -> DssatResult<String> {
        let (text, _, had_errors) = self.encoding().decode(bytes);
        if had_errors {
            return Err(DssatError::io_system(
                "IO.TEXT_DECODE",
                format!("content is not valid {}", self.as_str()),
            ));
        }
        Ok(text.into_owned())
    }

    pub fn encode(self, text: &str) -> DssatResult<Vec<u8>> {
        let (bytes, _, unmappable) = self.encoding().encode(text);
        if unmappable {
            return Err(DssatError::io_system(
                "IO.TEXT_ENCODE",
                format!("content cannot be represented as {}", self.as_str()),
            ));
        }
        Ok(bytes.into_owned())
    }
}
