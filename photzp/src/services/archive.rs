//! Location of processed frames in the LCO archive layout.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0} does not follow the sssttttt-cccc-YYYYMMDD-… naming scheme")]
pub struct MalformedFileName(pub String);

/// `root/site/camera/date/processed/file_name` for a frame named
/// `sssttttt-cccc-YYYYMMDD-…`, where `sss` is the site and `cccc` the camera.
pub fn lco_archive_path(file_name: &str, root: impl AsRef<Path>) -> Result<PathBuf, MalformedFileName> {
    let malformed = || MalformedFileName(file_name.to_string());

    let mut parts = file_name.split('-');
    let (Some(site_telescope), Some(camera), Some(date)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    if site_telescope.len() != 8
        || !site_telescope.is_ascii()
        || camera.len() != 4
        || date.len() != 8
        || !date.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed());
    }

    let site = &site_telescope[..3];
    Ok(root
        .as_ref()
        .join(site)
        .join(camera)
        .join(date)
        .join("processed")
        .join(file_name))
}
