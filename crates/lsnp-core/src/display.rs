use std::sync::Mutex;

/// Presentation sink: every user-facing line a protocol component wants to
/// show goes through here instead of a bare `println!`, so tests can assert
/// on "what would have been printed" and a future shell can route it
/// elsewhere.
pub trait Display: Send + Sync {
    fn line(&self, text: String);
}

/// Default sink used by the binary: writes straight to stdout.
#[derive(Debug, Default)]
pub struct StdoutDisplay;

impl Display for StdoutDisplay {
    fn line(&self, text: String) {
        println!("{text}");
    }
}

/// Test sink: records every line instead of printing it.
#[derive(Debug, Default)]
pub struct RecordingDisplay(Mutex<Vec<String>>);

impl RecordingDisplay {
    pub fn new() -> Self {
        RecordingDisplay::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Display for RecordingDisplay {
    fn line(&self, text: String) {
        self.0.lock().unwrap().push(text);
    }
}
