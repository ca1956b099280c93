//! Progress reporting for the index command

use codeweave_core::index::ProgressCallback;
use codeweave_core::IndexProgress;
use std::io::{self, Write};

/// Prints one status line per pipeline phase to stderr
pub struct ProgressReporter;

impl ProgressReporter {
    pub fn callback() -> ProgressCallback {
        Box::new(|event| Self::report(&event))
    }

    fn report(event: &IndexProgress) {
        eprint!("\r{:<60}", describe(event));
        if *event == IndexProgress::Persisted {
            eprintln!();
        }
        io::stderr().flush().ok();
    }
}

pub fn describe(event: &IndexProgress) -> String {
    match event {
        IndexProgress::Scanned { files, changed } => {
            format!("Scanned {} files, {} changed", files, changed)
        }
        IndexProgress::Parsed { files, failed } => {
            format!("Parsed {} files ({} failed)", files, failed)
        }
        IndexProgress::Resolved {
            snippets,
            relationships,
        } => format!("Resolved {} snippets, {} edges", snippets, relationships),
        IndexProgress::Summarized { summarized } => format!("Summarized {} snippets", summarized),
        IndexProgress::Persisted => "Saved".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&IndexProgress::Scanned { files: 3, changed: 1 }),
            "Scanned 3 files, 1 changed"
        );
        assert_eq!(describe(&IndexProgress::Persisted), "Saved");
    }
}
