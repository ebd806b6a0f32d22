//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Serializes stub creation and launches. Writing an executable while another
/// thread forks can leave the file busy for `exec`.
static STUB_LOCK: Mutex<()> = Mutex::new(());

pub fn stub_lock() -> MutexGuard<'static, ()> {
    STUB_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fake helper executable living in its own temp directory.
///
/// Every launch appends its arguments to `calls.log`. A recording launch
/// writes a few bytes to `--out` (nothing when `empty` exists) and stays
/// alive until a `--globcmd=quit` launch drops the `quit` marker.
pub struct HelperStub {
    pub dir: tempfile::TempDir,
    pub path: PathBuf,
}

#[cfg(unix)]
impl HelperStub {
    pub fn new() -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fmedia");
        let script = format!(
            r#"#!/bin/sh
dir='{dir}'
echo "$*" >> "$dir/calls.log"
out=""
record=0
for arg in "$@"; do
  case "$arg" in
    --out=*) out="${{arg#--out=}}" ;;
    --record) record=1 ;;
    --globcmd=quit) touch "$dir/quit" ;;
  esac
done
if [ "$record" = 1 ]; then
  if [ -f "$dir/empty" ]; then
    : > "$out"
  else
    printf 'RIFF0000WAVE' > "$out"
  fi
  while [ ! -f "$dir/quit" ]; do sleep 0.05; done
  rm -f "$dir/quit"
fi
"#,
            dir = dir.path().display()
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    /// Make recording launches produce an empty file
    pub fn produce_empty_output(&self) {
        std::fs::write(self.dir.path().join("empty"), b"").unwrap();
    }

    /// Argument lines of every launch so far
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Wait until `count` launches have logged their arguments
    pub fn wait_for_calls(&self, count: usize) -> bool {
        wait_until(Duration::from_secs(5), || self.calls().len() >= count)
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn wait_until(timeout: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if ready() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    ready()
}

pub fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
