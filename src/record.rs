//! Drive-session recorder.
//!
//! One session directory per process start, one JSONL row per recorded
//! step, with a periodic JPEG keyframe alongside. The on-disk layout is a
//! local convenience, not an interchange format.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::vision::Frame;
use crate::Decision;

/// Record a keyframe image every this many rows.
const KEYFRAME_INTERVAL: u64 = 30;

#[derive(Serialize)]
struct RecordRow {
    seq: u64,
    timestamp_s: f64,
    steering: f32,
    throttle: f32,
    keyframe: Option<String>,
}

/// Appends drive decisions (and periodic keyframes) to a session directory.
pub struct FileRecorder {
    session_dir: PathBuf,
    log: File,
    seq: u64,
}

impl FileRecorder {
    /// Create a fresh session directory under `root` and open its log.
    /// Construction failures abort composition: a vehicle that was asked to
    /// record but cannot is misconfigured.
    pub fn new(root: &Path) -> Result<Self> {
        let session = format!(
            "session-{}-{:04x}",
            crate::now_ts() as u64,
            rand::random::<u16>()
        );
        let session_dir = root.join(session);
        std::fs::create_dir_all(&session_dir)
            .with_context(|| format!("create session directory {}", session_dir.display()))?;
        let log = File::create(session_dir.join("drive.jsonl"))
            .with_context(|| format!("create drive log in {}", session_dir.display()))?;
        log::info!("recorder: session at {}", session_dir.display());
        Ok(Self {
            session_dir,
            log,
            seq: 0,
        })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Append one step. Placeholder frames (nothing captured yet) are
    /// skipped silently so warm-up does not pollute the session.
    pub fn record(&mut self, frame: &Frame, decision: &Decision) -> Result<()> {
        if frame.is_placeholder() {
            return Ok(());
        }

        let keyframe = if self.seq % KEYFRAME_INTERVAL == 0 {
            let name = format!("frame-{:08}.jpg", self.seq);
            std::fs::write(self.session_dir.join(&name), frame.encode_jpeg()?)
                .with_context(|| format!("write keyframe {name}"))?;
            Some(name)
        } else {
            None
        };

        let row = RecordRow {
            seq: self.seq,
            timestamp_s: frame.timestamp_s,
            steering: decision.steering,
            throttle: decision.throttle,
            keyframe,
        };
        serde_json::to_writer(&mut self.log, &row).context("serialize drive log row")?;
        self.log.write_all(b"\n").context("append drive log row")?;
        self.seq += 1;
        Ok(())
    }
}
