//! Composition and execution of external OS processes.
//!
//! A [`PipelineSpec`] is a tagged tree of commands: `Leaf` runs one process,
//! `Sequence` connects the boundary stdout of its left subtree to the
//! boundary stdin of its right subtree with an OS pipe, and `Parallel` runs
//! both subtrees concurrently with no data relationship. Execution launches
//! every leaf up front, supervises all of them with one waiter thread per
//! process, and force-kills the whole invocation as soon as any process
//! exits non-zero.

pub mod fifo;

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use getset::Getters;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::channel;
use std::thread::JoinHandle;
use tracing::{debug, trace};

/// What a process was doing, used to build the error when it fails.
#[derive(Clone, Debug)]
pub enum ErrorLabel {
    Connector { op: &'static str, target: String },
    Compression,
    Extraction,
    Cipher,
    Plumbing(String),
}

impl ErrorLabel {
    fn into_error(self, code: Option<i32>, diagnostic: String) -> Error {
        match self {
            ErrorLabel::Connector { op, target } => Error::Connector {
                op,
                target,
                code,
                diagnostic,
            },
            ErrorLabel::Compression => Error::Compression { diagnostic },
            ErrorLabel::Extraction => Error::Extraction { diagnostic },
            ErrorLabel::Cipher => Error::Cipher { diagnostic },
            ErrorLabel::Plumbing(what) => Error::Plumbing(what, diagnostic),
        }
    }
}

/// A single external command: argv, optional bytes written to its stdin
/// before closing it, and the label reported if it fails.
#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct Leaf {
    argv: Vec<OsString>,
    input: Option<Vec<u8>>,
    label: ErrorLabel,
}

#[derive(Clone, Debug)]
pub enum PipelineSpec {
    Leaf(Leaf),
    Sequence(Box<PipelineSpec>, Box<PipelineSpec>),
    Parallel(Box<PipelineSpec>, Box<PipelineSpec>),
}

impl PipelineSpec {
    pub fn command<I, S>(argv: I, label: ErrorLabel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        PipelineSpec::Leaf(Leaf {
            argv: argv.into_iter().map(Into::into).collect(),
            input: None,
            label,
        })
    }

    pub fn command_with_input<I, S>(argv: I, input: Vec<u8>, label: ErrorLabel) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        PipelineSpec::Leaf(Leaf {
            argv: argv.into_iter().map(Into::into).collect(),
            input: Some(input),
            label,
        })
    }

    /// In-memory bytes as the head of a pipe chain.
    pub fn byte_source(bytes: Vec<u8>) -> Self {
        Self::command_with_input(["cat"], bytes, ErrorLabel::Plumbing("byte source".to_string()))
    }

    /// File contents as the head of a pipe chain.
    pub fn file_source<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::command(
            [OsString::from("cat"), path.as_os_str().into()],
            ErrorLabel::Plumbing(format!("reading {}", path.display())),
        )
    }

    /// Pipe tail writing everything it receives to a file.
    pub fn file_sink<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Self::command(
            [
                OsString::from("sh"),
                "-c".into(),
                format!("exec cat > '{}'", path.display()).into(),
            ],
            ErrorLabel::Plumbing(format!("writing {}", path.display())),
        )
    }

    /// Feed this tree's boundary stdout into `next`'s boundary stdin.
    pub fn pipe(self, next: PipelineSpec) -> Self {
        PipelineSpec::Sequence(Box::new(self), Box::new(next))
    }

    /// Run this tree and `other` concurrently; both must succeed.
    pub fn par(self, other: PipelineSpec) -> Self {
        PipelineSpec::Parallel(Box::new(self), Box::new(other))
    }

    /// Leaves in launch order.
    pub fn leaves(&self) -> Vec<&Leaf> {
        match self {
            PipelineSpec::Leaf(leaf) => vec![leaf],
            PipelineSpec::Sequence(a, b) | PipelineSpec::Parallel(a, b) => {
                let mut leaves = a.leaves();
                leaves.extend(b.leaves());
                leaves
            }
        }
    }

    /// Execute the tree, blocking until every process has exited.
    ///
    /// With `verbose`, unwired process stdout is inherited instead of
    /// discarded.
    pub fn run(self, verbose: bool) -> Result<()> {
        execute(self, false, verbose).map(|_| ())
    }

    /// Execute the tree and return the bytes written to its boundary stdout.
    pub fn run_capture(self, verbose: bool) -> Result<Vec<u8>> {
        execute(self, true, verbose)
    }
}

struct Spawned {
    child: Child,
    label: ErrorLabel,
}

/// Spawns every leaf of `spec`, wiring `Sequence` boundaries with OS pipes.
///
/// For `Parallel(a, b)` the boundary stdin belongs to `a` and the boundary
/// stdout to `b`; the branches are otherwise independent.
fn spawn_tree(
    spec: PipelineSpec,
    stdin: Option<Stdio>,
    pipe_stdout: bool,
    verbose: bool,
    procs: &mut Vec<Spawned>,
    writers: &mut Vec<JoinHandle<()>>,
) -> Result<Option<ChildStdout>> {
    match spec {
        PipelineSpec::Leaf(leaf) => {
            spawn_leaf(leaf, stdin, pipe_stdout, verbose, procs, writers)
        }
        PipelineSpec::Sequence(a, b) => {
            let mid = spawn_tree(*a, stdin, true, verbose, procs, writers)?;
            spawn_tree(*b, mid.map(Stdio::from), pipe_stdout, verbose, procs, writers)
        }
        PipelineSpec::Parallel(a, b) => {
            spawn_tree(*a, stdin, false, verbose, procs, writers)?;
            spawn_tree(*b, None, pipe_stdout, verbose, procs, writers)
        }
    }
}

fn spawn_leaf(
    leaf: Leaf,
    stdin: Option<Stdio>,
    pipe_stdout: bool,
    verbose: bool,
    procs: &mut Vec<Spawned>,
    writers: &mut Vec<JoinHandle<()>>,
) -> Result<Option<ChildStdout>> {
    let Leaf { argv, input, label } = leaf;
    let Some(program) = argv.first() else {
        return Err(Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command",
        )));
    };

    let mut cmd = Command::new(program);
    cmd.args(&argv[1..]);
    let upstream = stdin.is_some();
    match (stdin, &input) {
        // an upstream pipe always wins over configured input bytes
        (Some(fd), _) => {
            cmd.stdin(fd);
        }
        (None, Some(_)) => {
            cmd.stdin(Stdio::piped());
        }
        (None, None) => {
            cmd.stdin(Stdio::null());
        }
    }
    cmd.stdout(if pipe_stdout {
        Stdio::piped()
    } else if verbose {
        Stdio::inherit()
    } else {
        Stdio::null()
    });
    cmd.stderr(Stdio::piped());

    trace!("launching {:?}", argv);
    let mut child = cmd
        .spawn()
        .map_err(Error::from)
        .with_msg(format!("failed to launch {:?}", program))?;

    if !upstream {
        if let (Some(bytes), Some(mut sink)) = (input, child.stdin.take()) {
            writers.push(std::thread::spawn(move || {
                // the consumer may exit before reading everything; a broken
                // pipe here is reported by the consumer's own exit status
                let _ = sink.write_all(&bytes);
            }));
        }
    }

    let out = if pipe_stdout { child.stdout.take() } else { None };
    procs.push(Spawned { child, label });
    Ok(out)
}

fn execute(spec: PipelineSpec, capture: bool, verbose: bool) -> Result<Vec<u8>> {
    let mut procs = Vec::new();
    let mut writers = Vec::new();
    let boundary = match spawn_tree(spec, None, capture, verbose, &mut procs, &mut writers) {
        Ok(boundary) => boundary,
        Err(e) => {
            for sp in &mut procs {
                let _ = sp.child.kill();
            }
            for sp in &mut procs {
                let _ = sp.child.wait();
            }
            for w in writers {
                let _ = w.join();
            }
            return Err(e);
        }
    };
    debug!("supervising {} process(es)", procs.len());

    let capture_handle = boundary.map(|mut out| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });

    let (tx, rx) = channel();
    let mut pids = Vec::new();
    let mut waiters = Vec::new();
    for (idx, spawned) in procs.into_iter().enumerate() {
        let Spawned { mut child, label } = spawned;
        pids.push(Pid::from_raw(child.id() as i32));
        let tx = tx.clone();
        waiters.push(std::thread::spawn(move || {
            let mut diagnostic = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut diagnostic);
            }
            let status = child.wait();
            let _ = tx.send((idx, label, status, diagnostic));
        }));
    }
    drop(tx);

    let total = pids.len();
    let mut reported = vec![false; total];
    let mut first_failure: Option<Error> = None;
    for _ in 0..total {
        let Ok((idx, label, status, diagnostic)) = rx.recv() else {
            first_failure.get_or_insert(Error::ChannelRecv);
            break;
        };
        reported[idx] = true;

        let failed = match &status {
            Ok(st) => !st.success(),
            Err(_) => true,
        };
        if !failed {
            continue;
        }
        if first_failure.is_none() {
            let code = status.as_ref().ok().and_then(|st| st.code());
            debug!("{:?} exited with {:?}, killing siblings", label, code);
            first_failure = Some(label.into_error(code, diagnostic));
            kill_unreported(&pids, &reported);
        } else {
            trace!("suppressing secondary failure of {:?}", label);
        }
    }
    if first_failure.is_some() {
        kill_unreported(&pids, &reported);
    }

    for w in waiters {
        let _ = w.join();
    }
    for w in writers {
        let _ = w.join();
    }
    let captured = capture_handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default();

    match first_failure {
        None => Ok(captured),
        Some(e) => Err(e),
    }
}

fn kill_unreported(pids: &[Pid], reported: &[bool]) {
    for (pid, done) in pids.iter().zip(reported) {
        if !done {
            let _ = kill(*pid, Signal::SIGKILL);
        }
    }
}
