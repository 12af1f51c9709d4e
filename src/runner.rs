//! Depth-first test execution.
//!
//! A [`Runner`] walks a [`TestTree`] from a starting group, usually the
//! root. In every group it runs the setup fixture, then the group's own
//! tests in registration order, then the child groups in registration
//! order, then the teardown fixture. A group's fixtures bracket its own
//! tests and the full run of its subtree; they do not nest inside the
//! children's fixtures.
//!
//! Candidate paths are composed in a bounded buffer, slash-joined from the
//! group names plus the test name. Tests the filter rejects are counted and
//! skipped without running. Everything else prints one progress line
//! (`<padded path> => OK` or a failure block) to the runner's output sink;
//! writes to the sink are best effort and never fail a run.
//!
//! A panic inside a test body is caught at the test invocation boundary and
//! recorded as a failure; siblings, fixtures, and the summary proceed
//! normally. The process-wide panic hook still reports to stderr, so
//! embedders that want a quiet stream can install their own hook.

use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
};

use log::debug;

use crate::{
    alloc::AllocError,
    check::RunContext,
    filter::{FilterRule, FilterSet},
    report::RunSummary,
    test::{Aborted, TestResult},
    tree::{GroupId, TestTree},
};

/// Default capacity of the path buffer; longer paths truncate silently.
pub const DEFAULT_PATH_CAPACITY: usize = 256;

/// Default display width test paths are padded to in progress lines.
pub const DEFAULT_NAME_WIDTH: usize = 65;

/// Configures and executes one walk over a [`TestTree`].
pub struct Runner<W: io::Write> {
    out: W,
    filter: Option<FilterSet>,
    path_capacity: usize,
    name_width: usize,
}

impl Runner<io::Stdout> {
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            filter: None,
            path_capacity: DEFAULT_PATH_CAPACITY,
            name_width: DEFAULT_NAME_WIDTH,
        }
    }
}

impl Default for Runner<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: io::Write> Runner<W> {
    pub fn with_output<W2: io::Write>(self, out: W2) -> Runner<W2> {
        Runner {
            out,
            filter: self.filter,
            path_capacity: self.path_capacity,
            name_width: self.name_width,
        }
    }

    /// Install a filter expression (see [`FilterSet`]); without one every
    /// test runs.
    pub fn with_filter(self, expr: &str) -> Self {
        Self {
            filter: Some(FilterSet::parse(expr)),
            ..self
        }
    }

    /// Bound the path buffer. Paths beyond the capacity truncate silently,
    /// which can garble display and filter matching but never grows memory.
    pub fn with_path_capacity(self, capacity: usize) -> Self {
        Self {
            path_capacity: capacity,
            ..self
        }
    }

    pub fn with_name_width(self, width: usize) -> Self {
        Self {
            name_width: width,
            ..self
        }
    }

    /// Walk the whole tree from its root.
    pub fn run(self, tree: &TestTree) -> Result<RunSummary, AllocError> {
        let root = tree.root();
        self.run_from(tree, root)
    }

    /// Walk the subtree under `group`. Paths start at that group's own
    /// name; ancestors contribute no segments.
    pub fn run_from(mut self, tree: &TestTree, group: GroupId) -> Result<RunSummary, AllocError> {
        // The rule table for this run is charged against the tree's
        // allocator and credited back at the end of the same run.
        let filter_charge = self
            .filter
            .as_ref()
            .map(|filter| filter.len() * size_of::<FilterRule>());
        if let Some(charge) = filter_charge {
            tree.alloc().allocate(charge)?;
        }

        if let Some(filter) = &self.filter {
            let _ = writeln!(self.out, "Applying test filter: {}", filter.as_str());
        }

        let mut summary = RunSummary::default();
        let mut path = NamePath::new(self.path_capacity);
        self.walk(tree, group, &mut path, &mut summary);

        match summary.failed {
            0 => {
                let _ = writeln!(self.out, "All {} tests passed.", summary.run);
            }
            failed => {
                let _ = writeln!(self.out, "{} test(s) out of {} failed.", failed, summary.run);
            }
        }
        if summary.filtered > 0 {
            let _ = writeln!(self.out, "{} test(s) were filtered out.", summary.filtered);
        }

        if let Some(charge) = filter_charge {
            tree.alloc().deallocate(charge);
        }

        debug!(
            "run finished: {} run, {} failed, {} filtered",
            summary.run, summary.failed, summary.filtered
        );
        Ok(summary)
    }

    fn walk(
        &mut self,
        tree: &TestTree,
        group: GroupId,
        path: &mut NamePath,
        summary: &mut RunSummary,
    ) {
        let node = tree.node(group);
        let group_mark = path.push_segment(node.name.as_ref());

        if let Some(setup) = &node.setup {
            setup();
        }

        for test in &node.tests {
            let test_mark = path.push_segment(test.name());
            if self.excluded(path.as_str()) {
                summary.filtered += 1;
                path.truncate_to(test_mark);
                continue;
            }

            let _ = write!(
                self.out,
                "{:<width$} => ",
                path.as_str(),
                width = self.name_width
            );

            let mut cx = RunContext::new();
            let caught = panic::catch_unwind(AssertUnwindSafe(|| test.call(&mut cx)));
            summary.run += 1;

            let (aborted, panic_msg) = match caught {
                Ok(TestResult(Ok(()))) => (false, None),
                Ok(TestResult(Err(Aborted))) => (true, None),
                Err(payload) => (false, Some(payload_as_string(payload))),
            };
            let failed = cx.failed || aborted || panic_msg.is_some();
            if failed {
                summary.failed += 1;
                match cx.failed {
                    true => {
                        let _ = self.out.write_all(cx.diag.as_bytes());
                    }
                    false => {
                        let _ = writeln!(self.out, "FAILED");
                    }
                }
                if let Some(msg) = panic_msg {
                    let _ = writeln!(self.out, "  Test panicked: {msg}");
                }
            } else {
                let _ = writeln!(self.out, "OK");
            }

            path.truncate_to(test_mark);
        }

        for &child in &node.children {
            self.walk(tree, child, path, summary);
        }

        if let Some(teardown) = &node.teardown {
            teardown();
        }

        path.truncate_to(group_mark);
    }

    fn excluded(&self, path: &str) -> bool {
        match &self.filter {
            Some(filter) => !filter.is_match(path),
            None => false,
        }
    }
}

/// Convert a panic payload into a string, covering the payload types
/// `panic!` produces.
fn payload_as_string(err: Box<dyn Any + Send + 'static>) -> String {
    err.downcast::<&'static str>()
        .map(|s| s.to_string())
        .or_else(|err| err.downcast::<String>().map(|s| *s))
        .unwrap_or_else(|_| String::from("Box<dyn Any>"))
}

/// Bounded path buffer. Segments are slash-joined; appends past the
/// capacity are dropped, never written out of bounds.
struct NamePath {
    buf: String,
    capacity: usize,
}

impl NamePath {
    fn new(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a separator (skipped for the first segment) and `name`,
    /// returning a mark for [`truncate_to`](Self::truncate_to).
    fn push_segment(&mut self, name: &str) -> usize {
        let mark = self.buf.len();
        if !self.buf.is_empty() && self.buf.len() < self.capacity {
            self.buf.push('/');
        }
        for ch in name.chars() {
            if self.buf.len() + ch.len_utf8() > self.capacity {
                break;
            }
            self.buf.push(ch);
        }
        mark
    }

    fn truncate_to(&mut self, mark: usize) {
        self.buf.truncate(mark);
    }

    fn as_str(&self) -> &str {
        &self.buf
    }
}
