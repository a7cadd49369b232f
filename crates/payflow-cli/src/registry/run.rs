use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use payflow_core::{RedactedConnection, write_bytes_atomic};

use super::RegistryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Skipped,
    Failed,
}

/// Checksum of the partition a stage consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDigest {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// JSON record written for every stage invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub stage: String,
    pub process_date: NaiveDate,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_ms: Option<u64>,
    pub status: Option<RunStatus>,
    pub base_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<RedactedConnection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<InputDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunManifest {
    pub fn new(
        run_id: &str,
        stage: &str,
        process_date: NaiveDate,
        started_at: DateTime<Utc>,
        base_dir: &Path,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage: stage.to_string(),
            process_date,
            started_at: started_at.to_rfc3339(),
            finished_at: None,
            duration_ms: None,
            status: None,
            base_dir: base_dir.to_path_buf(),
            config_path: None,
            connection: None,
            input: None,
            report: None,
            error: None,
        }
    }

    /// `<runs_dir>/<stage>/<timestamp>__run_<id>.json`
    pub fn path_in(&self, runs_dir: &Path, started_at: DateTime<Utc>) -> PathBuf {
        let timestamp = started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
        runs_dir
            .join(&self.stage)
            .join(format!("{timestamp}__run_{}.json", self.run_id))
    }
}

pub fn write_manifest(path: &Path, manifest: &RunManifest) -> RegistryResult<()> {
    let data = serde_json::to_vec_pretty(manifest)?;
    write_bytes_atomic(path, &data)?;
    Ok(())
}

/// SHA-256 of the file at `path`, or `None` when it does not exist.
pub fn digest_file(path: &Path) -> io::Result<Option<InputDigest>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];
    let mut bytes = 0_u64;
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        bytes += read as u64;
    }
    Ok(Some(InputDigest {
        path: path.to_path_buf(),
        bytes,
        sha256: hex::encode(hasher.finalize()),
    }))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn digest_matches_known_sha256() {
        let mut path = std::env::temp_dir();
        path.push(format!("payflow_digest_{}.csv", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"abc").unwrap();

        let digest = digest_file(&path).unwrap().unwrap();
        assert_eq!(digest.bytes, 3);
        assert_eq!(
            digest.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let missing = path.with_extension("absent");
        assert!(digest_file(&missing).unwrap().is_none());
    }

    #[test]
    fn manifest_is_written_as_pretty_json() {
        let started_at = Utc.with_ymd_and_hms(2025, 3, 2, 6, 30, 0).unwrap();
        let mut manifest = RunManifest::new(
            "xyz",
            "transform",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            started_at,
            Path::new("data"),
        );
        manifest.status = Some(RunStatus::Skipped);

        let mut runs = std::env::temp_dir();
        runs.push(format!("payflow_runs_{}", uuid::Uuid::new_v4()));
        let path = manifest.path_in(&runs, started_at);
        write_manifest(&path, &manifest).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["run_id"], "xyz");
        assert_eq!(value["status"], "skipped");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn manifest_path_is_grouped_by_stage() {
        let started_at = Utc.with_ymd_and_hms(2025, 3, 2, 6, 30, 0).unwrap();
        let manifest = RunManifest::new(
            "abc",
            "load",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            started_at,
            Path::new("data"),
        );
        let path = manifest.path_in(Path::new("data/runs"), started_at);
        assert_eq!(
            path,
            PathBuf::from("data/runs/load/2025-03-02T06-30-00Z__run_abc.json")
        );
    }
}
