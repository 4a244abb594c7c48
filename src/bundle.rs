use crate::Error;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";

/// An already-materialized firmware package: named partitions mapped to
/// their raw payloads. Read-only for the duration of a flash call.
#[derive(Debug, Default)]
pub struct FirmwareBundle {
    pub name: String,
    pub version: Option<String>,
    pub platform: Option<String>,
    parts: HashMap<String, FirmwarePart>,
}

#[derive(Debug, Clone)]
pub struct FirmwarePart {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Deserialize)]
struct Manifest {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    parts: HashMap<String, ManifestPart>,
}

#[derive(Deserialize)]
struct ManifestPart {
    src: String,
}

impl FirmwareBundle {
    pub fn new(name: impl Into<String>) -> Self {
        FirmwareBundle {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Read a bundle directory: `manifest.json` plus one payload file
    /// per declared partition, resolved relative to the directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let manifest = fs::read(dir.join(MANIFEST_FILE))?;
        let manifest: Manifest = serde_json::from_slice(&manifest)?;

        let mut bundle = FirmwareBundle::new(manifest.name);
        bundle.version = manifest.version;
        bundle.platform = manifest.platform;
        for (name, part) in manifest.parts {
            let data = fs::read(dir.join(&part.src))?;
            log::debug!("Loaded partition {:?} from {:?} ({} bytes)", name, part.src, data.len());
            bundle.insert_part(name, data);
        }

        Ok(bundle)
    }

    pub fn insert_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        self.parts.insert(name.clone(), FirmwarePart { name, data });
    }

    /// Resolve a named partition to its exact stored bytes. Absence of
    /// the partition is the only failure mode.
    pub fn get_part_data(&self, name: &str) -> Result<&[u8], Error> {
        self.parts
            .get(name)
            .map(|part| part.data.as_slice())
            .ok_or_else(|| Error::PartitionNotFound(name.to_string()))
    }

    pub fn parts(&self) -> impl Iterator<Item = &FirmwarePart> {
        self.parts.values()
    }
}
