use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{Result, SkwError};

fn client(timeout: u64) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("skw/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(timeout))
        .timeout(Duration::from_secs(timeout))
        .build()
        .map_err(|e| SkwError::RepoUnreachable(format!("failed to create HTTP client: {}", e)))
}

/// Probe a remote file with an HTTP HEAD request.
///
/// Any failure (timeout, connection error, non-2xx status) is a cache miss,
/// never an error: the caller falls through to the next repo tier.
pub fn head_ok(url: &str, timeout: u64) -> bool {
    let client = match client(timeout) {
        Ok(c) => c,
        Err(_) => return false,
    };
    match client.head(url).send() {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!("HEAD {} failed: {}", url, e);
            false
        }
    }
}

/// Download a file from `url` to `dest` atomically.
///
/// The data is first written to a temporary file in the same directory as
/// `dest`, then renamed into place on success, so an interrupted transfer
/// never leaves a partial file behind.
pub fn download_file(url: &str, dest: &Path, timeout: u64) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let client = client(timeout)?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| SkwError::RepoUnreachable(format!("GET {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(SkwError::RepoUnreachable(format!(
            "GET {} returned status {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let dest_dir = dest.parent().unwrap_or(Path::new("."));
    let tmp_file = tempfile::NamedTempFile::new_in(dest_dir)?;
    let mut file = tmp_file.as_file().try_clone()?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0; 8192];

    loop {
        let n = response
            .read(&mut buffer)
            .map_err(|e| SkwError::RepoUnreachable(format!("GET {} interrupted: {}", url, e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        downloaded += n as u64;
        pb.set_position(downloaded);
    }

    pb.finish_and_clear();

    tmp_file.persist(dest).map_err(|e| SkwError::IoError(e.error))?;

    Ok(())
}
