//! COMBINE/OMEX archive access
//!
//! An OMEX archive is a zip container holding a `manifest.xml`, one or more SED-ML
//! simulation experiments and the models they reference. Archives are small, so all
//! entries are read into memory when the archive is opened; afterwards the archive is
//! immutable and entries can be looked up by their location.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, warn};
use zip::ZipArchive;

use super::error::ArchiveError;
use super::manifest::{Content, Manifest};

/// Location of the manifest inside the archive
const MANIFEST_LOCATION: &str = "manifest.xml";

/// An opened COMBINE archive
#[derive(Debug, Clone)]
pub struct CombineArchive {
    manifest: Option<Manifest>,
    entries: BTreeMap<String, Vec<u8>>,
}

impl CombineArchive {
    /// Opens the archive at `path` and reads all of its entries
    ///
    /// # Errors
    ///
    /// * [`ArchiveError::NotFound`] if `path` does not exist or is not a file
    /// * [`ArchiveError::Unreadable`] if the file cannot be read
    /// * [`ArchiveError::Zip`] if the file is not a zip container
    /// * [`ArchiveError::Manifest`] if `manifest.xml` is present but malformed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(ArchiveError::NotFound(path));
        }

        let unreadable = |source| ArchiveError::Unreadable {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(unreadable)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        let mut entries = BTreeMap::new();

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            if entry.is_dir() {
                continue;
            }

            let location = normalize_location(entry.name());
            // Declared entry sizes are not trusted for preallocation
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(unreadable)?;
            entries.insert(location, content);
        }

        debug!("Read {} entries from {}", entries.len(), path.display());

        let manifest = match entries.get(MANIFEST_LOCATION) {
            Some(bytes) => {
                let xml = to_text(MANIFEST_LOCATION, bytes.clone())?;
                Some(Manifest::from_xml(&xml)?)
            }
            None => {
                warn!(
                    "{} has no manifest.xml; falling back to file extensions",
                    path.display()
                );
                None
            }
        };

        Ok(Self { manifest, entries })
    }

    /// The parsed manifest, if the archive has one
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Locations of the SED-ML documents to execute, in manifest order
    ///
    /// When at least one SED-ML entry is flagged as `master`, only master entries are
    /// returned. Without a manifest, every `.sedml` entry is returned in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NoSimulationExperiment`] if there is nothing to execute.
    pub fn sedml_locations(&self) -> Result<Vec<String>, ArchiveError> {
        let locations: Vec<String> = match &self.manifest {
            Some(manifest) => {
                let sedml: Vec<&Content> = manifest
                    .contents
                    .iter()
                    .filter(|content| content.is_sedml())
                    .collect();
                let has_master = sedml.iter().any(|content| content.master);

                sedml
                    .into_iter()
                    .filter(|content| !has_master || content.master)
                    .map(|content| normalize_location(&content.location))
                    .collect()
            }
            None => self
                .entries
                .keys()
                .filter(|location| location.to_ascii_lowercase().ends_with(".sedml"))
                .cloned()
                .collect(),
        };

        if locations.is_empty() {
            return Err(ArchiveError::NoSimulationExperiment);
        }

        Ok(locations)
    }

    /// Raw bytes of the entry at `location`
    pub fn entry(&self, location: &str) -> Result<&[u8], ArchiveError> {
        let location = normalize_location(location);
        self.entries
            .get(&location)
            .map(Vec::as_slice)
            .ok_or(ArchiveError::MissingEntry(location))
    }

    /// Entry at `location` decoded as UTF-8 text
    pub fn entry_as_string(&self, location: &str) -> Result<String, ArchiveError> {
        let bytes = self.entry(location)?.to_vec();
        to_text(location, bytes)
    }
}

/// Normalizes an archive location: strips leading `./` and `/`, resolves `.` and `..`
/// segments and uses forward slashes.
pub fn normalize_location(location: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in location.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Resolves `reference` relative to the directory of the entry at `base`
pub fn resolve_relative(base: &str, reference: &str) -> String {
    let base = normalize_location(base);
    match base.rsplit_once('/') {
        Some((directory, _)) if !reference.starts_with('/') => {
            normalize_location(&format!("{}/{}", directory, reference))
        }
        _ => normalize_location(reference),
    }
}

fn to_text(location: &str, bytes: Vec<u8>) -> Result<String, ArchiveError> {
    String::from_utf8(bytes).map_err(|source| ArchiveError::NotText {
        location: location.to_string(),
        source,
    })
}
