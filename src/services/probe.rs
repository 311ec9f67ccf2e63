//! Frame counting of exported fragments
//!
//! Invokes an external ffprobe-style tool and reads the frame count from its
//! JSON stdout. Only used to enrich the query report; probe failures are
//! recorded by the caller, never fatal.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{QueryError, QueryResult};

#[derive(Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    nb_read_frames: String,
}

pub struct FrameProbe {
    program: String,
}

impl FrameProbe {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Count the frames in one media file
    pub async fn count_frames(&self, path: &Path) -> QueryResult<u64> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_frames",
                "-show_entries",
                "stream=nb_read_frames",
                "-print_format",
                "json",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                QueryError::Probe(format!("cannot spawn {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(QueryError::Probe(format!(
                "probe of {} failed with {}",
                path.display(),
                output.status
            )));
        }

        parse_frame_count(&output.stdout)
            .map_err(|e| QueryError::Probe(format!("{}: {}", path.display(), e)))
    }
}

fn parse_frame_count(raw: &[u8]) -> Result<u64, String> {
    let parsed: ProbeOutput =
        serde_json::from_slice(raw).map_err(|e| format!("unparsable probe output: {}", e))?;

    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| "no video stream in probe output".to_string())?;

    stream
        .nb_read_frames
        .parse::<u64>()
        .map_err(|e| format!("bad frame count: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_frame_count_of_the_first_video_stream() {
        let raw = br#"{"streams": [{"nb_read_frames": "1524"}]}"#;
        assert_eq!(parse_frame_count(raw).unwrap(), 1524);
    }

    #[test]
    fn rejects_unparsable_output() {
        let err = parse_frame_count(b"not json").unwrap_err();
        assert!(err.contains("unparsable probe output"));
    }

    #[test]
    fn rejects_output_without_streams() {
        let err = parse_frame_count(br#"{"streams": []}"#).unwrap_err();
        assert!(err.contains("no video stream"));
    }

    #[test]
    fn rejects_non_numeric_frame_counts() {
        let err = parse_frame_count(br#"{"streams": [{"nb_read_frames": "N/A"}]}"#).unwrap_err();
        assert!(err.contains("bad frame count"));
    }

    #[cfg(unix)]
    mod process {
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        use super::super::*;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("probe.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn counts_frames_from_probe_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(
                dir.path(),
                r#"echo '{"streams": [{"nb_read_frames": "42"}]}'"#,
            );

            let probe = FrameProbe::new(&program.display().to_string());
            let count = probe.count_frames(Path::new("fragment.h264")).await.unwrap();
            assert_eq!(count, 42);
        }

        #[tokio::test]
        async fn non_zero_exit_is_a_probe_error() {
            let dir = tempfile::tempdir().unwrap();
            let program = script(dir.path(), "exit 1");

            let probe = FrameProbe::new(&program.display().to_string());
            let result = probe.count_frames(Path::new("fragment.h264")).await;
            assert!(matches!(result, Err(QueryError::Probe(_))));
        }

        #[tokio::test]
        async fn missing_probe_program_is_a_probe_error() {
            let probe = FrameProbe::new("/nonexistent/probe-tool");
            let result = probe.count_frames(Path::new("fragment.h264")).await;
            assert!(matches!(result, Err(QueryError::Probe(_))));
        }
    }
}
