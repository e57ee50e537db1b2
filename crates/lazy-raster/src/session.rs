//! Scoped resource sessions over wrapper trees.

use crate::error::{RasterError, Result};
use crate::handle::merge_close;
use crate::lazy::OpenArray;
use crate::payload::Payload;
use crate::structural::{find_files, Structural};
use crate::types::OpenMode;

/// Run `op` on `value` with its file-backed leaf held open.
///
/// Searches `value` for file-backed leaves:
/// - none: `op` runs on `value` itself and nothing is opened, whatever `mode` is;
/// - one: the file is opened in `mode`, `op` runs on a copy of `value` whose
///   leaf is replaced by the open resource, and the resource is closed before
///   returning, whether `op` succeeded, failed or panicked;
/// - more than one: fails with `MultipleResources` without opening anything.
///
/// The open resource is only valid inside `op`. Clones of the reconstructed
/// value that escape it fail with `UseAfterClose`.
///
/// # Errors
/// Errors from opening the file and from `op` are returned unchanged. A close
/// failure is returned only when `op` succeeded.
pub fn with_open<T, R, F>(value: &T, mode: OpenMode, op: F) -> Result<R>
where
    T: Structural,
    F: FnOnce(&T) -> Result<R>,
{
    let files = find_files(value);
    let lazy = match files.as_slice() {
        [] => {
            tracing::debug!(mode = ?mode, "No file handle in value, running in memory");
            return op(value);
        }
        [lazy] => *lazy,
        _ => return Err(RasterError::MultipleResources { count: files.len() }),
    };

    let open = lazy.open_session(mode)?;
    let session = Session::new(open.clone());
    let reopened = value.replace_files(&mut |_| Payload::Open(open.clone()));

    tracing::debug!(
        path = %lazy.handle().path().display(),
        mode = ?mode,
        "Session opened"
    );

    let result = op(&reopened);
    session.finish(result)
}

/// Owns the close of one session's resource.
struct Session {
    open: OpenArray,
    finished: bool,
}

impl Session {
    fn new(open: OpenArray) -> Self {
        Self {
            open,
            finished: false,
        }
    }

    fn finish<R>(mut self, result: Result<R>) -> Result<R> {
        self.finished = true;
        let closed = self.open.close();
        tracing::debug!(path = %self.open.handle().path().display(), "Session closed");
        merge_close(self.open.handle().path(), result, closed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.open.close() {
            tracing::warn!(
                path = %self.open.handle().path().display(),
                error = %e,
                "Failed to close session resource during unwind"
            );
        }
    }
}
