//! # Widget Packaging
//!
//! Collects project sources honouring `.gitignore`, writes them to a zip
//! archive (optionally AES-256 encrypted) and fingerprints the result.

use crate::config::IGNORE_FILE;
use crate::display::readable_file_size;
use anyhow::{Context, Result};
use colored::Colorize;
use ignore::WalkBuilder;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Directories never packed regardless of ignore rules
const ALWAYS_SKIPPED: [&str; 4] = ["node_modules", ".git", ".hg", ".svn"];

/// Extensions treated as image assets
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// A file selected for packing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFile {
    /// Path relative to the project root, `/`-separated
    pub relative: String,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl ProjectFile {
    pub fn is_image(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// Archive encryption, chosen explicitly by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encryption {
    None,
    /// WinZip AES-256, readable only with the secret
    Aes256(String),
}

impl Encryption {
    pub fn secret(&self) -> Option<&str> {
        match self {
            Encryption::None => None,
            Encryption::Aes256(secret) => Some(secret),
        }
    }
}

/// Enumerate project files, sorted by relative path.
///
/// Fails when the project has no `.gitignore`.
pub fn project_files(root: &Path) -> Result<Vec<ProjectFile>> {
    let ignore_path = root.join(IGNORE_FILE);
    if !ignore_path.is_file() {
        anyhow::bail!("Failed to read ignore file {}", ignore_path.display());
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .parents(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE)
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !ALWAYS_SKIPPED.contains(&name))
                .unwrap_or(true)
        });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry.context("Failed to walk project files")?;

        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = relative_name(root, &path)?;
        let size = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        files.push(ProjectFile { relative, path, size });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    Ok(files)
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Write `files` into a deflated zip at `output`
pub fn pack(files: &[ProjectFile], output: &Path, encryption: &Encryption) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let mut zip = ZipWriter::new(file);

    let base = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(8));

    for project_file in files {
        let options = match encryption {
            Encryption::None => base,
            Encryption::Aes256(secret) => base.with_aes_encryption(AesMode::Aes256, secret),
        };

        zip.start_file(project_file.relative.as_str(), options)
            .with_context(|| format!("Failed to add {} to archive", project_file.relative))?;

        let mut source = File::open(&project_file.path)
            .with_context(|| format!("Failed to open {}", project_file.path.display()))?;
        std::io::copy(&mut source, &mut zip)
            .with_context(|| format!("Failed to compress {}", project_file.relative))?;
    }

    zip.finish().context("Failed to finalize archive")?;

    Ok(())
}

/// Hex SHA-1 of a file, hashed in fixed-size chunks
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Outcome of packing project sources
#[derive(Debug, Clone)]
pub struct PackReport {
    /// `{packageId}@{version}`
    pub name: String,
    pub version: String,
    pub output: PathBuf,
    pub files: Vec<ProjectFile>,
    pub package_size: u64,
    pub unpacked_size: u64,
    pub shasum: String,
    pub encryption: Encryption,
}

impl PackReport {
    pub fn filename(&self) -> String {
        self.output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Print contents and details, npm-pack style
    pub fn print(&self) {
        println!();
        println!("{}", "=== Package Contents ===".bright_yellow());
        for file in &self.files {
            println!("{:<8} {}", readable_file_size(file.size), file.relative);
        }
        println!();
        println!("{}", "=== Package Details ===".bright_yellow());
        println!("name:          {}", self.name);
        println!("version:       {}", self.version);
        println!("filename:      {}", self.filename());
        println!("package size:  {}", readable_file_size(self.package_size));
        println!("unpacked size: {}", readable_file_size(self.unpacked_size));
        println!("shasum:        {}", self.shasum);
        println!("total files:   {}", self.files.len());
        if let Some(secret) = self.encryption.secret() {
            println!("secretKey:     {}", secret);
        }
    }
}

/// Pack the project at `root` into `{root}/{name}.zip`
pub fn pack_source(
    root: &Path,
    name: &str,
    version: &str,
    encryption: Encryption,
) -> Result<PackReport> {
    let output = root.join(format!("{}.zip", name));

    let files: Vec<ProjectFile> = project_files(root)?
        .into_iter()
        .filter(|file| file.path != output)
        .collect();

    tracing::info!(files = files.len(), output = %output.display(), "packing source code");
    pack(&files, &output, &encryption)?;

    let package_size = std::fs::metadata(&output)
        .with_context(|| format!("Failed to stat {}", output.display()))?
        .len();
    let unpacked_size = files.iter().map(|file| file.size).sum();
    let shasum = sha1_file(&output)?;

    Ok(PackReport {
        name: name.to_string(),
        version: version.to_string(),
        output,
        files,
        package_size,
        unpacked_size,
        shasum,
        encryption,
    })
}
