//! OMEX manifest
//!
//! The `manifest.xml` at the root of a COMBINE archive lists every entry together with
//! its format URI and an optional `master` flag. The structure is small and regular, so
//! it is deserialized directly with `quick-xml`'s serde support.

use serde::{Deserialize, Serialize};

use super::error::ArchiveError;

/// Format URI prefix shared by all SED-ML versions
const SEDML_FORMAT: &str = "sed-ml";

/// Root element of `manifest.xml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "omexManifest")]
pub struct Manifest {
    #[serde(rename = "content", default)]
    pub contents: Vec<Content>,
}

/// A single `<content>` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "@location")]
    pub location: String,

    #[serde(rename = "@format", default)]
    pub format: String,

    #[serde(rename = "@master", default)]
    pub master: bool,
}

impl Manifest {
    /// Deserializes a manifest from its XML text
    pub fn from_xml(xml: &str) -> Result<Self, ArchiveError> {
        Ok(quick_xml::de::from_str(xml)?)
    }
}

impl Content {
    /// Whether this entry is a SED-ML simulation experiment
    pub fn is_sedml(&self) -> bool {
        self.format.to_ascii_lowercase().contains(SEDML_FORMAT)
    }
}
