use crate::context::Engine;
use crate::loop_error::LoopError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Default journal file name.
pub const JOURNAL_FILE: &str = "loopDriver.log";

/// Engine journal: records start and stop of a run in `loopDriver.log`.
#[derive(Clone, Debug)]
pub struct RunJournal {
    path: PathBuf,
}

impl RunJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(JOURNAL_FILE),
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl Engine for RunJournal {
    fn name(&self) -> &str {
        "journal"
    }

    fn start(&mut self) -> Result<(), LoopError> {
        self.append("journal on").map_err(|e| LoopError::EngineStart {
            name: "journal".into(),
            message: format!("{}: {e}", self.path.display()),
        })
    }

    fn stop(&mut self) {
        if let Err(e) = self.append("journal off") {
            log::warn!("could not close journal {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;

    #[test]
    fn journal_brackets_the_context() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut ctx = EngineContext::new();
            ctx.start(Box::new(RunJournal::new(dir.path()))).unwrap();
        }
        let text = std::fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();
        assert_eq!(text, "journal on\njournal off\n");
    }

    #[test]
    fn unwritable_directory_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = RunJournal::new(dir.path().join("missing"));
        assert!(matches!(journal.start(), Err(LoopError::EngineStart { .. })));
    }
}
