use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Indexing,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEntry {
    pub name: String,
    pub path: PathBuf,
}

impl ResultEntry {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: PathBuf::from(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub phase: SessionPhase,
    pub current_query: String,
    pub accepting_results: bool,
    pub result_count: usize,
    pub backend_failure: Option<String>,
    pub discarded_results: u64,
    pub protocol_violations: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            current_query: String::new(),
            accepting_results: false,
            result_count: 0,
            backend_failure: None,
            discarded_results: 0,
            protocol_violations: 0,
        }
    }
}

impl Session {
    pub fn indexed(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.backend_failure.is_some()
    }
}
