use std::path::PathBuf;

use crate::bencoding::Value;
use crate::crypto::Md5;
use crate::torrent::MetainfoError;
use crate::torrent::error::{optional, positive, required};

#[derive(Debug, PartialEq, Clone)]
pub enum DownloadType {
    SingleFile {
        size: usize,
        md5sum: Option<Md5>,
    },
    MultiFile {
        files: Vec<File>,
    },
}

impl DownloadType {
    pub fn total_size(&self) -> usize {
        match self {
            Self::SingleFile { size, .. } => *size,
            Self::MultiFile { files } => files.iter().map(|file| file.size).sum(),
        }
    }
}

/// Consumes the remaining `length`/`files` entries of an info dictionary.
impl TryFrom<&mut Value> for DownloadType {
    type Error = MetainfoError;

    fn try_from(value: &mut Value) -> Result<Self, Self::Error> {
        if let Some(length) = optional::<i64>(value, "length")? {
            let size = positive("length", length)?;
            let md5sum = parse_md5sum(value)?;
            return Ok(DownloadType::SingleFile { size, md5sum });
        }

        if let Some(files) = optional::<Vec<Value>>(value, "files")? {
            let mut result = Vec::with_capacity(files.len());
            for file in files {
                result.push(File::try_from(file)?);
            }
            let total = result
                .iter()
                .try_fold(0usize, |total, file| total.checked_add(file.size))
                .ok_or(MetainfoError::TotalSizeOverflow)?;
            if total == 0 {
                return Err(MetainfoError::NonPositive {
                    key: "length",
                    value: 0,
                });
            }
            return Ok(DownloadType::MultiFile { files: result });
        }

        Err(MetainfoError::MissingLength)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct File {
    pub path: PathBuf,
    pub size: usize,
    pub md5sum: Option<Md5>,
}

impl TryFrom<Value> for File {
    type Error = MetainfoError;

    fn try_from(mut value: Value) -> Result<Self, Self::Error> {
        let size = required(&mut value, "length")?;
        let parts: Vec<Value> = required(&mut value, "path")?;
        let mut path = PathBuf::with_capacity(parts.len());
        for part in parts {
            let part: String = part
                .try_into()
                .map_err(|source| MetainfoError::InvalidKey { key: "path", source })?;
            // Each component names one level below the download directory.
            if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
                return Err(MetainfoError::InvalidPath(part));
            }
            path.push(part);
        }
        let md5sum = parse_md5sum(&mut value)?;
        Ok(File { path, size, md5sum })
    }
}

fn parse_md5sum(value: &mut Value) -> Result<Option<Md5>, MetainfoError> {
    match optional::<String>(value, "md5sum")? {
        Some(text) => Md5::from_hex(&text)
            .map(Some)
            .ok_or(MetainfoError::InvalidMd5(text)),
        None => Ok(None),
    }
}
