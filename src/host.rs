//! The seam between the nodes and the graph host.
//!
//! The nodes never look at host internals. Everything they need is one of
//! these operations:
//!
//! | Need | [`Host`] method |
//! |---|---|
//! | Resolve an image reference to a file | [`resolve_input`](Host::resolve_input) |
//! | Offer selectable inputs in the UI | [`list_inputs`](Host::list_inputs) |
//! | Know where saved images go | [`output_dir`](Host::output_dir) |
//! | Show a saved image as a preview | [`register_output`](Host::register_output) |
//!
//! [`DirectoryHost`] is the filesystem implementation used by the CLI.

use crate::config::PathsConfig;
use crate::imaging::is_readable_image;
use crate::naming::{Annotation, parse_annotation};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Operations the nodes need from their host.
pub trait Host {
    /// Resolve an image reference to a path, `None` when it cannot be resolved.
    ///
    /// Does not check existence; see [`input_exists`](Host::input_exists).
    fn resolve_input(&self, reference: &str) -> Option<PathBuf>;

    /// Whether `reference` resolves to an existing file.
    fn input_exists(&self, reference: &str) -> bool {
        self.resolve_input(reference).is_some_and(|p| p.is_file())
    }

    /// Names of the files a user may pick as loader input, sorted.
    fn list_inputs(&self) -> io::Result<Vec<String>>;

    /// Directory saved images are written to.
    fn output_dir(&self) -> &Path;

    /// Record a written file so the host can display it.
    fn register_output(&self, path: &Path);
}

/// Host backed by plain input/output/temp directories.
#[derive(Debug)]
pub struct DirectoryHost {
    input_dir: PathBuf,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    registered: Mutex<Vec<PathBuf>>,
}

impl DirectoryHost {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let temp_dir = output_dir.join("temp");
        Self {
            input_dir: input_dir.into(),
            output_dir,
            temp_dir,
            registered: Mutex::new(Vec::new()),
        }
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.input_dir, &paths.output_dir).with_temp_dir(&paths.temp_dir)
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Paths passed to [`Host::register_output`] so far, in order.
    pub fn registered_outputs(&self) -> Vec<PathBuf> {
        self.registered
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn dir_for(&self, annotation: Option<Annotation>) -> &Path {
        match annotation {
            None | Some(Annotation::Input) => &self.input_dir,
            Some(Annotation::Output) => &self.output_dir,
            Some(Annotation::Temp) => &self.temp_dir,
        }
    }
}

impl Host for DirectoryHost {
    fn resolve_input(&self, reference: &str) -> Option<PathBuf> {
        let (name, annotation) = parse_annotation(reference);
        if name.is_empty() {
            return None;
        }
        Some(self.dir_for(annotation).join(name))
    }

    fn list_inputs(&self) -> io::Result<Vec<String>> {
        if !self.input_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.input_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            if entry.file_type().is_file() && is_readable_image(entry.path()) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn register_output(&self, path: &Path) {
        if let Ok(mut registered) = self.registered.lock() {
            registered.push(path.to_path_buf());
        }
    }
}
