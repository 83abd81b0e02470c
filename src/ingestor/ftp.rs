//! FTP transport for the file-based providers.
//!
//! Synchronous by design: the pipeline processes one provider and one file
//! at a time, so a blocking download sits on the same critical path as the
//! parse that follows it.

use std::fs;
use std::path::{Path, PathBuf};
use suppaftp::{FtpStream, Mode};
use tracing::{info, warn};

use crate::errors::SourceError;

pub struct FtpDownloader {
    server: String,
    username: String,
    password: String,
}

impl FtpDownloader {
    pub fn new(server: &str, username: &str, password: &str) -> Self {
        Self {
            server: server.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Download every file in the server's listing whose name ends with
    /// `extension`. Returns the local paths of the files that downloaded
    /// successfully.
    pub fn download_folder(
        &self,
        to_path: &Path,
        delete_source_files: bool,
        extension: &str,
    ) -> Result<Vec<PathBuf>, SourceError> {
        let mut ftp = self.connect()?;

        let listing = ftp
            .nlst(None)
            .map_err(|e| SourceError::ftp(&self.server, "listing", e.to_string()))?;

        let files: Vec<String> = listing
            .into_iter()
            .filter(|name| name.to_lowercase().ends_with(extension))
            .collect();

        let downloaded = self.fetch_all(&mut ftp, to_path, delete_source_files, &files);
        let _ = ftp.quit();

        Ok(downloaded.into_iter().map(|(_, path)| path).collect())
    }

    /// Download a known set of remote files, keeping the caller's key (for
    /// Eurosport this is the channel id the file belongs to).
    pub fn download_named(
        &self,
        to_path: &Path,
        delete_source_files: bool,
        files: &[(String, String)],
    ) -> Result<Vec<(String, PathBuf)>, SourceError> {
        let mut ftp = self.connect()?;
        let downloaded = self.fetch_all(&mut ftp, to_path, delete_source_files, files);
        let _ = ftp.quit();
        Ok(downloaded)
    }

    fn fetch_all<F: RemoteFile>(
        &self,
        ftp: &mut FtpStream,
        to_path: &Path,
        delete_source_files: bool,
        files: &[F],
    ) -> Vec<(String, PathBuf)> {
        let mut downloaded = Vec::with_capacity(files.len());

        for file in files {
            let remote = file.remote_name();
            info!("FTP: Downloading '{}'...", remote);

            let buffer = match ftp.retr_as_buffer(remote) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("FTP: Could not download file '{}': {}", remote, e);
                    continue;
                }
            };

            let target = to_path.join(remote.replace('/', "-"));
            if let Err(e) = fs::write(&target, buffer.into_inner()) {
                warn!("FTP: Could not write '{}': {}", target.display(), e);
                continue;
            }

            if delete_source_files {
                if let Err(e) = ftp.rm(remote) {
                    warn!("FTP: Could not delete file '{}': {}", remote, e);
                }
            }

            downloaded.push((file.key().to_string(), target));
        }

        downloaded
    }

    fn connect(&self) -> Result<FtpStream, SourceError> {
        let address = if self.server.contains(':') {
            self.server.clone()
        } else {
            format!("{}:21", self.server)
        };

        info!("FTP: Connecting to '{}'...", self.server);
        let mut ftp = FtpStream::connect(&address)
            .map_err(|e| SourceError::ftp(&self.server, "connection", e.to_string()))?;

        ftp.login(&self.username, &self.password)
            .map_err(|e| SourceError::ftp(&self.server, "login", e.to_string()))?;
        ftp.set_mode(Mode::Passive);

        Ok(ftp)
    }
}

/// A remote file reference; plain names key on themselves, pairs carry a
/// caller-side key through the download.
trait RemoteFile {
    fn key(&self) -> &str;
    fn remote_name(&self) -> &str;
}

impl RemoteFile for String {
    fn key(&self) -> &str {
        self
    }

    fn remote_name(&self) -> &str {
        self
    }
}

impl RemoteFile for (String, String) {
    fn key(&self) -> &str {
        &self.0
    }

    fn remote_name(&self) -> &str {
        &self.1
    }
}
