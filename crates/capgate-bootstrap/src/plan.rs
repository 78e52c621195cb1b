//! Building the relaunch command line.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use crate::marker::{ProvisionMarker, MARKER_ENV};

/// Long form of the manifest flag removed from relaunched arguments.
pub const MANIFEST_FLAG_LONG: &str = "--deps";
/// Short form of the manifest flag removed from relaunched arguments.
pub const MANIFEST_FLAG_SHORT: &str = "-d";

/// How to run a command with extra packages available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioner {
    /// When false the bootstrap never relaunches.
    pub enabled: bool,
    /// Provisioning program, e.g. `uv`.
    pub program: String,
    /// Arguments placed before the package flags, e.g. `run`.
    pub args: Vec<String>,
    /// Flag repeated once per package, e.g. `--with`.
    pub with_flag: String,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "uv".into(),
            args: vec!["run".into()],
            with_flag: "--with".into(),
        }
    }
}

/// A fully resolved relaunch: program, arguments and marker environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaunchPlan {
    /// Program to start.
    pub program: String,
    /// Its arguments. Relaunched arguments are passed through byte for byte.
    pub args: Vec<OsString>,
    /// Environment additions for the relaunched process.
    pub env: Vec<(String, String)>,
}

impl RelaunchPlan {
    /// `program args... (with_flag pkg)... -- exe original_args`, with the
    /// manifest flag stripped from `original_args` and the marker set.
    pub fn new(
        provisioner: &Provisioner,
        marker: &ProvisionMarker,
        exe: &Path,
        original_args: &[OsString],
    ) -> Self {
        let mut args: Vec<OsString> = provisioner.args.iter().map(OsString::from).collect();
        for pkg in &marker.packages {
            args.push(provisioner.with_flag.as_str().into());
            args.push(pkg.as_str().into());
        }
        args.push("--".into());
        args.push(exe.as_os_str().to_owned());
        args.extend(strip_manifest_flag(original_args));

        Self {
            program: provisioner.program.clone(),
            args,
            env: vec![(MARKER_ENV.to_string(), marker.to_string())],
        }
    }

    /// Space-joined command line for diagnostics. Lossy for non-UTF-8 args.
    pub fn command_line(&self) -> String {
        std::iter::once(OsStr::new(&self.program))
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(OsStr::to_string_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Arguments the relaunched program receives, after `-- exe`.
    pub fn relaunched_args(&self) -> &[OsString] {
        let start = self
            .args
            .iter()
            .position(|arg| arg == "--")
            .map_or(self.args.len(), |sep| (sep + 2).min(self.args.len()));
        &self.args[start..]
    }
}

/// Remove the manifest flag and its value from command-line arguments.
///
/// Handles `-d v`, `--deps v`, `--deps=v` and `-dv`. Everything after a
/// bare `--` is kept verbatim.
pub fn strip_manifest_flag(args: &[OsString]) -> Vec<OsString> {
    let mut kept = Vec::with_capacity(args.len());
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            kept.push(arg.clone());
            kept.extend(iter.by_ref().cloned());
            break;
        }
        if arg == MANIFEST_FLAG_SHORT || arg == MANIFEST_FLAG_LONG {
            iter.next();
            continue;
        }
        let bytes = arg.as_encoded_bytes();
        let attached = bytes.starts_with(b"--deps=")
            || (bytes.starts_with(MANIFEST_FLAG_SHORT.as_bytes()) && !bytes.starts_with(b"--"));
        if attached {
            continue;
        }
        kept.push(arg.clone());
    }

    kept
}
