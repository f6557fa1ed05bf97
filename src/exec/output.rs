// src/exec/output.rs

//! Bounded capture of job output.
//!
//! Runaway jobs can emit gigabytes of text; we retain the head and tail of
//! the stream and elide the middle once a byte ceiling is exceeded. The
//! buffer is line-oriented so elision never splits a UTF-8 sequence.

use std::collections::VecDeque;

/// Default byte ceiling for captured output per job.
pub const DEFAULT_OUTPUT_LIMIT: usize = 100_000;

/// Line-oriented output buffer with head/tail retention.
///
/// The first `limit / 2` bytes of lines are kept verbatim; later lines are
/// kept in a rolling tail window of the same size. Anything pushed out of
/// the tail window is counted and reported in an elision banner on render.
#[derive(Debug)]
pub struct OutputBuffer {
    limit: usize,
    head: Vec<String>,
    head_bytes: usize,
    tail: VecDeque<String>,
    tail_bytes: usize,
    elided_bytes: usize,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(2),
            head: Vec::new(),
            head_bytes: 0,
            tail: VecDeque::new(),
            tail_bytes: 0,
            elided_bytes: 0,
        }
    }

    /// Append one line (without its trailing newline).
    pub fn push_line(&mut self, line: &str) {
        let cost = line.len() + 1;
        let half = self.limit / 2;

        if self.tail.is_empty() && self.head_bytes + cost <= half {
            self.head.push(line.to_string());
            self.head_bytes += cost;
            return;
        }

        self.tail.push_back(line.to_string());
        self.tail_bytes += cost;
        while self.tail_bytes > half && self.tail.len() > 1 {
            let dropped = self.tail.pop_front().expect("tail checked non-empty");
            let dropped_cost = dropped.len() + 1;
            self.tail_bytes -= dropped_cost;
            self.elided_bytes += dropped_cost;
        }
    }

    /// Append a multi-line chunk of text.
    pub fn push_text(&mut self, text: &str) {
        for line in text.lines() {
            self.push_line(line);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.tail.is_empty()
    }

    /// Render the captured output, inserting an elision banner if lines
    /// were dropped from the middle.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.head_bytes + self.tail_bytes + 80);
        for line in &self.head {
            out.push_str(line);
            out.push('\n');
        }
        if self.elided_bytes > 0 {
            out.push_str(&format!(
                "\n[ ... output trimmed: {} bytes elided ... ]\n\n",
                self.elided_bytes
            ));
        }
        for line in &self.tail {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// A banner line used to separate sections of job output.
pub fn header(message: &str) -> String {
    let rule = "#".repeat(80);
    format!("{rule}\n# {message}\n{rule}\n")
}

/// Banner appended to a job's output when it is killed for exceeding its
/// maximum run time.
pub fn timeout_banner(max_time: std::time::Duration) -> String {
    header(&format!(
        "Job exceeded maximum run time of {}s and was terminated",
        max_time.as_secs()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_output_passes_through_untrimmed() {
        let mut buf = OutputBuffer::new(1024);
        buf.push_text("one\ntwo\nthree");
        assert_eq!(buf.render(), "one\ntwo\nthree\n");
    }

    #[test]
    fn oversized_output_keeps_head_and_tail() {
        let mut buf = OutputBuffer::new(100);
        for i in 0..100 {
            buf.push_line(&format!("line number {i}"));
        }
        let rendered = buf.render();
        assert!(rendered.contains("line number 0"));
        assert!(rendered.contains("line number 99"));
        assert!(rendered.contains("output trimmed"));
        assert!(!rendered.contains("line number 50"));
    }

    #[test]
    fn timeout_banner_names_the_limit() {
        let banner = timeout_banner(std::time::Duration::from_secs(30));
        assert!(banner.contains("exceeded maximum run time of 30s"));
    }
}
