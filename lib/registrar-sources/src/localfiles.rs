//! Local backend-file snapshot source
//!
//! Walks a configured directory tree of JSON backend definitions. Each file
//! describes one backend and the routing names it serves; a backend that
//! belongs to several namespaces fans out per namespace.

use crate::poller::SnapshotSource;
use async_trait::async_trait;
use registrar_core::{BackendAddress, CoreError, Registration, Result, Snapshot};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One locally configured backend, as stored on disk.
#[derive(Debug, Deserialize)]
pub struct BackendFile {
    pub service: String,
    pub instance: String,
    pub host: String,
    #[serde(default)]
    pub node: Option<String>,
    pub ip: String,
    pub port: u16,
    pub registrations: Vec<String>,
    #[serde(default)]
    pub namespaces: Option<Vec<String>>,
}

pub struct LocalFileSource {
    dir: PathBuf,
}

impl LocalFileSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl SnapshotSource for LocalFileSource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self) -> Result<Snapshot> {
        let mut files = Vec::new();
        collect_files(&self.dir, &mut files)?;
        files.sort();

        let mut snapshot = Snapshot::new();
        for path in &files {
            // Unreadable files and broken symlinks are skipped silently;
            // a file that reads but does not parse aborts the whole cycle.
            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("Skipping unreadable backend file {}: {}", path.display(), e);
                    continue;
                }
            };
            let backend: BackendFile = serde_json::from_str(&raw)
                .map_err(|e| CoreError::MalformedBackendFile(path.display().to_string(), e))?;
            snapshot.extend(expand_backend(&backend));
        }

        debug!(
            "Read {} backend files into {} registrations",
            files.len(),
            snapshot.len()
        );
        Ok(snapshot)
    }
}

/// Recursively gather regular files under `dir`. The configured root must
/// be listable; entries below it that cannot be inspected are skipped.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => {
                if let Err(e) = collect_files(&path, out) {
                    debug!("Skipping unreadable directory {}: {}", path.display(), e);
                }
            }
            Ok(t) if t.is_file() => out.push(path),
            // Symlinks are resolved through metadata; a broken one lands
            // here and is dropped.
            Ok(_) | Err(_) => match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => out.push(path),
                _ => debug!("Skipping {}", path.display()),
            },
        }
    }
    Ok(())
}

/// One registration per namespace × routing name.
fn expand_backend(backend: &BackendFile) -> Vec<Registration> {
    let namespaces = backend
        .namespaces
        .clone()
        .unwrap_or_else(|| vec!["default".to_string()]);

    let mut regs = Vec::with_capacity(namespaces.len() * backend.registrations.len());
    for namespace in &namespaces {
        for registration_name in &backend.registrations {
            regs.push(Registration {
                service: backend.service.clone(),
                instance: backend.instance.clone(),
                address: BackendAddress {
                    host: backend.host.clone(),
                    namespace: namespace.clone(),
                    node: backend.node.clone().unwrap_or_default(),
                    ip: backend.ip.clone(),
                    port: backend.port,
                },
                registration_name: registration_name.clone(),
            });
        }
    }
    regs
}
