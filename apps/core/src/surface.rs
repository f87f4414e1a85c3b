use std::io::Write;
use std::path::Path;

use crate::launcher::{self, LaunchError};
use crate::model::ResultEntry;

pub trait Surface {
    fn notify(&mut self, message: &str);
    fn show_window(&mut self);
    fn focus_window(&mut self);
    fn hide_window(&mut self);
    fn set_query_text(&mut self, text: &str);
    fn clear_results(&mut self);
    fn append_result(&mut self, index: usize, entry: &ResultEntry);
    fn set_no_results(&mut self, visible: bool);
    fn open_path(&mut self, path: &Path) -> Result<(), LaunchError>;
}

pub struct ConsoleSurface<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<W: Write> Surface for ConsoleSurface<W> {
    fn notify(&mut self, message: &str) {
        self.line(&format!("[notice] {message}"));
    }

    fn show_window(&mut self) {
        self.line("[window] shown");
    }

    fn focus_window(&mut self) {
        self.line("[window] focused");
    }

    fn hide_window(&mut self) {
        self.line("[window] hidden");
    }

    fn set_query_text(&mut self, text: &str) {
        self.line(&format!("[query] {text}"));
    }

    fn clear_results(&mut self) {}

    fn append_result(&mut self, index: usize, entry: &ResultEntry) {
        self.line(&format!("  {index:>3}  {}  {}", entry.name, entry.path.display()));
    }

    fn set_no_results(&mut self, visible: bool) {
        if visible {
            self.line("  No results found.");
        }
    }

    fn open_path(&mut self, path: &Path) -> Result<(), LaunchError> {
        launcher::open_path(path)?;
        self.line(&format!("[open] {}", path.display()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Notify(String),
    Show,
    Focus,
    Hide,
    QueryText(String),
    Clear,
    Append(usize, ResultEntry),
    NoResults(bool),
    Open(String),
}

#[derive(Debug, Default)]
pub struct MockSurface {
    calls: Vec<SurfaceCall>,
    visible: bool,
    rows: Vec<ResultEntry>,
    no_results: bool,
    fail_opens: bool,
}

impl MockSurface {
    pub fn failing_opens() -> Self {
        Self {
            fail_opens: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn rows(&self) -> &[ResultEntry] {
        &self.rows
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn shows_no_results(&self) -> bool {
        self.no_results
    }

    pub fn notifications(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Notify(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for MockSurface {
    fn notify(&mut self, message: &str) {
        self.calls.push(SurfaceCall::Notify(message.to_string()));
    }

    fn show_window(&mut self) {
        self.visible = true;
        self.calls.push(SurfaceCall::Show);
    }

    fn focus_window(&mut self) {
        self.calls.push(SurfaceCall::Focus);
    }

    fn hide_window(&mut self) {
        self.visible = false;
        self.calls.push(SurfaceCall::Hide);
    }

    fn set_query_text(&mut self, text: &str) {
        self.calls.push(SurfaceCall::QueryText(text.to_string()));
    }

    fn clear_results(&mut self) {
        self.rows.clear();
        self.calls.push(SurfaceCall::Clear);
    }

    fn append_result(&mut self, index: usize, entry: &ResultEntry) {
        self.rows.push(entry.clone());
        self.calls.push(SurfaceCall::Append(index, entry.clone()));
    }

    fn set_no_results(&mut self, visible: bool) {
        self.no_results = visible;
        self.calls.push(SurfaceCall::NoResults(visible));
    }

    fn open_path(&mut self, path: &Path) -> Result<(), LaunchError> {
        self.calls
            .push(SurfaceCall::Open(path.to_string_lossy().into_owned()));
        if self.fail_opens {
            return Err(LaunchError::MissingPath(path.to_path_buf()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsoleSurface, Surface};
    use crate::model::ResultEntry;

    #[test]
    fn console_surface_renders_rows_and_placeholder() {
        let mut surface = ConsoleSurface::new(Vec::new());
        surface.set_query_text("alp");
        surface.set_no_results(true);
        surface.append_result(0, &ResultEntry::new("alpha.txt", "/docs/alpha.txt"));

        let text = String::from_utf8(surface.into_inner()).unwrap();
        assert!(text.contains("[query] alp"));
        assert!(text.contains("No results found."));
        assert!(text.contains("alpha.txt  /docs/alpha.txt"));
    }
}
