use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, trace};

use crate::error::{Error, Result};

/// Something that answers SMT-LIB2 scripts.
///
/// One call runs one complete script and returns everything the solver
/// printed; sessions never share solver state.
pub trait SmtSolver: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, script: &str) -> Result<String>;
}

/// Runs an SMT-LIB2 solver executable once per query, feeding the script
/// on stdin.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: String,
    args: Vec<String>,
}

impl Default for ProcessSolver {
    fn default() -> Self {
        Self::new("z3", ["-in", "-smt2"])
    }
}

impl ProcessSolver {
    pub fn new<S: Into<String>>(program: impl Into<String>, args: impl IntoIterator<Item = S>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the executable can be started and accepts an empty script.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl SmtSolver for ProcessSolver {
    fn name(&self) -> &str {
        &self.program
    }

    fn run(&self, script: &str) -> Result<String> {
        debug!("running {} on a {}-byte script", self.program, script.len());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Solver(format!("failed to capture {} stdin", self.program)))?;
        // Feed stdin from another thread so a chatty solver cannot fill the
        // stdout pipe while we are still writing.
        let script = script.to_owned();
        let writer = std::thread::spawn(move || stdin.write_all(script.as_bytes()));
        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(Error::Solver("stdin writer panicked".into())),
        }
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!("{} replied: {}", self.program, stdout.trim_end());
        if stdout.trim().is_empty() && !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Solver(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_missing_executable() {
        let solver = ProcessSolver::new("symlogic-no-such-solver", Vec::<String>::new());
        assert!(!solver.is_available());
        let err = solver.run("(check-sat)").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_z3_roundtrip() {
        let solver = ProcessSolver::default();
        if !solver.is_available() {
            log::warn!("z3 not found, skipping live solver test");
            return;
        }
        let reply = solver.run("(declare-const x Int)\n(assert (> x 1))\n(check-sat)\n").unwrap();
        assert_eq!(reply.trim(), "sat");
    }
}
