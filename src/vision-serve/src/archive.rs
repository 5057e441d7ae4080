//! Model archive extraction.
//!
//! An archive is a tar file, optionally gzip-compressed, holding exactly one
//! serialized model and exactly one newline-delimited class list.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info};

use crate::error::InitError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const LABELS_SUFFIX: &str = ".txt";
const ARCHIVE_FILE: &str = "model.tar.gz";

/// How the archive members are materialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractStrategy {
    /// Stream the archive from memory, keeping members in memory
    InMemory,
    /// Unpack the archive into the given directory first
    Disk(PathBuf),
}

/// The two logical members of a model archive
#[derive(Debug)]
pub struct ArchiveMembers {
    pub model_name: String,
    pub model: Vec<u8>,
    pub labels_name: String,
    pub labels: Vec<u8>,
}

pub fn extract(
    data: &[u8],
    strategy: &ExtractStrategy,
    model_suffix: &str,
) -> Result<ArchiveMembers, InitError> {
    match strategy {
        ExtractStrategy::InMemory => extract_in_memory(data, model_suffix),
        ExtractStrategy::Disk(dir) => extract_to_disk(data, dir, model_suffix),
    }
}

/// Split a class list into its ordered labels, one per line
pub fn parse_labels(raw: &[u8]) -> Result<Vec<String>, InitError> {
    let text = std::str::from_utf8(raw)?;
    let labels: Vec<String> = text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::to_owned)
        .collect();

    if labels.is_empty() {
        return Err(InitError::EmptyLabels);
    }

    Ok(labels)
}

fn open<'a, R: Read + 'a>(reader: R, gzipped: bool) -> tar::Archive<Box<dyn Read + 'a>> {
    let reader: Box<dyn Read + 'a> = if gzipped {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    tar::Archive::new(reader)
}

fn extract_in_memory(data: &[u8], model_suffix: &str) -> Result<ArchiveMembers, InitError> {
    let mut names = Vec::new();
    let mut contents = Vec::new();

    let mut archive = open(data, data.starts_with(&GZIP_MAGIC));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry.path()?.to_string_lossy().into_owned();
        if !is_candidate(&name, model_suffix) {
            debug!("Skipping archive member {}", name);
            continue;
        }

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        names.push(name);
        contents.push(buf);
    }

    let model = select_unique(&names, model_suffix, "model")?;
    let labels = select_unique(&names, LABELS_SUFFIX, "class list")?;

    Ok(ArchiveMembers {
        model_name: names[model].clone(),
        model: std::mem::take(&mut contents[model]),
        labels_name: names[labels].clone(),
        labels: std::mem::take(&mut contents[labels]),
    })
}

fn extract_to_disk(data: &[u8], dir: &Path, model_suffix: &str) -> Result<ArchiveMembers, InitError> {
    fs::create_dir_all(dir)?;

    let local = dir.join(ARCHIVE_FILE);
    info!("Writing model archive to {}", local.display());
    fs::write(&local, data)?;

    // Only entries of this archive count; the directory may hold earlier unpacks.
    let mut names = Vec::new();
    let file = BufReader::new(File::open(&local)?);
    let mut archive = open(file, data.starts_with(&GZIP_MAGIC));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_file = entry.header().entry_type().is_file();
        let name = entry.path()?.to_string_lossy().into_owned();

        if !entry.unpack_in(dir)? {
            debug!("Skipping archive member {} outside {}", name, dir.display());
            continue;
        }
        if is_file && is_candidate(&name, model_suffix) {
            names.push(name);
        }
    }
    drop(archive);
    fs::remove_file(&local)?;

    let model = &names[select_unique(&names, model_suffix, "model")?];
    let labels = &names[select_unique(&names, LABELS_SUFFIX, "class list")?];

    Ok(ArchiveMembers {
        model: fs::read(dir.join(model))?,
        model_name: model.clone(),
        labels: fs::read(dir.join(labels))?,
        labels_name: labels.clone(),
    })
}

fn file_name(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

fn is_candidate(member: &str, model_suffix: &str) -> bool {
    let name = file_name(member);

    // AppleDouble metadata written by macOS tar
    if name.starts_with("._") {
        return false;
    }

    name.ends_with(model_suffix) || name.ends_with(LABELS_SUFFIX)
}

fn select_unique(names: &[String], suffix: &str, role: &'static str) -> Result<usize, InitError> {
    let hits: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| file_name(name).ends_with(suffix))
        .map(|(i, _)| i)
        .collect();

    match hits.as_slice() {
        [] => Err(InitError::MissingMember {
            role,
            suffix: suffix.to_owned(),
        }),
        [one] => Ok(*one),
        _ => Err(InitError::AmbiguousMember {
            role,
            candidates: hits.iter().map(|&i| names[i].clone()).collect(),
        }),
    }
}
