//! BUFR encoding through the ecCodes command-line tools.
//!
//! Each record is rendered into a `bufr_filter` rules file and applied to the
//! BUFR4 sample shipped with ecCodes:
//!
//! ```text
//! set inputDelayedDescriptorReplicationFactor = {2, 3};
//! set edition = 4;
//! set unexpandedDescriptors = {301150, 307096};
//! set #1#airTemperature = 293.15;
//! set pack = 1;
//! write;
//! ```
//!
//! Replication factors go first so the descriptor expansion sees them.
//! Missing elements are not set and keep their encoded missing value.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use super::{BufrEncoder, MessageIdentity, IDENTITY_KEYS};
use crate::config::EccodesSettings;
use crate::error::{EncodeError, EncodeResult};
use crate::models::{ElementValue, MappedRecord, Scalar};

/// Name of the BUFR edition 4 sample in the ecCodes samples directory.
pub const BUFR4_SAMPLE: &str = "BUFR4.tmpl";

/// Encoder driving `bufr_filter`.
#[derive(Debug, Clone)]
pub struct EccodesToolEncoder {
    bufr_filter: PathBuf,
    sample: PathBuf,
}

impl EccodesToolEncoder {
    pub fn new(bufr_filter: impl Into<PathBuf>, sample: impl Into<PathBuf>) -> Self {
        Self {
            bufr_filter: bufr_filter.into(),
            sample: sample.into(),
        }
    }

    /// Build from settings, locating the BUFR4 sample with `codes_info -s` when
    /// no explicit sample is configured.
    pub fn from_settings(settings: &EccodesSettings) -> EncodeResult<Self> {
        let sample = match &settings.sample {
            Some(path) => path.clone(),
            None => locate_sample(&settings.codes_info)?,
        };
        if !sample.is_file() {
            return Err(EncodeError::SampleNotFound(sample.display().to_string()));
        }
        debug!(sample = %sample.display(), "using BUFR4 sample");
        Ok(Self::new(&settings.bufr_filter, sample))
    }

    pub fn sample(&self) -> &Path {
        &self.sample
    }

    /// Run `bufr_filter` with the given rules on `input`. Returns stdout.
    fn run_filter(&self, rules: &str, input: &Path, output: Option<&Path>) -> EncodeResult<String> {
        let mut rules_file = NamedTempFile::new()?;
        rules_file.write_all(rules.as_bytes())?;
        rules_file.flush()?;

        let mut command = Command::new(&self.bufr_filter);
        if let Some(output) = output {
            command.arg("-o").arg(output);
        }
        command
            .arg(rules_file.path())
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        run(command, &self.bufr_filter)
    }
}

impl BufrEncoder for EccodesToolEncoder {
    fn encode(&self, record: &MappedRecord) -> EncodeResult<Vec<u8>> {
        let rules = render_rules(record);
        trace!(%rules, "bufr_filter rules");

        let output = NamedTempFile::new()?;
        self.run_filter(&rules, &self.sample, Some(output.path()))?;

        let message = std::fs::read(output.path())?;
        if message.is_empty() {
            return Err(EncodeError::EmptyMessage);
        }
        Ok(message)
    }

    fn identify(&self, message: &[u8]) -> EncodeResult<MessageIdentity> {
        let mut input = NamedTempFile::new()?;
        input.write_all(message)?;
        input.flush()?;

        let stdout = self.run_filter(&identity_rules(), input.path(), None)?;
        Ok(parse_identity(&stdout))
    }
}

fn run(mut command: Command, program: &Path) -> EncodeResult<String> {
    let program = program.display().to_string();
    let output = command.output().map_err(|source| EncodeError::Spawn {
        program: program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(EncodeError::Rejected {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Ask ecCodes where its samples live.
fn locate_sample(codes_info: &Path) -> EncodeResult<PathBuf> {
    let mut command = Command::new(codes_info);
    command.arg("-s").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    let stdout = run(command, codes_info)?;

    // may be a colon separated search path
    stdout
        .trim()
        .split(':')
        .map(|dir| Path::new(dir).join(BUFR4_SAMPLE))
        .find(|path| path.is_file())
        .ok_or_else(|| EncodeError::SampleNotFound(format!("{} not found in '{}'", BUFR4_SAMPLE, stdout.trim())))
}

// =============================================================================
// Rules rendering
// =============================================================================

/// Render the `bufr_filter` rules that encode one record.
pub fn render_rules(record: &MappedRecord) -> String {
    let mut rules = String::new();

    for (key, factors) in record.replication.keyed() {
        if !factors.is_empty() {
            let items: Vec<String> = factors.iter().map(|f| f.to_string()).collect();
            rules.push_str(&format!("set {} = {{{}}};\n", key, items.join(", ")));
        }
    }

    for element in record.elements() {
        if let ElementValue::Present(value) = &element.value {
            if let Some(rendered) = render_value(value) {
                rules.push_str(&format!("set {} = {};\n", element.key, rendered));
            }
        }
    }

    rules.push_str("set pack = 1;\nwrite;\n");
    rules
}

/// `None` for values that cannot be encoded (non-finite floats); they stay missing.
fn render_value(value: &Scalar) -> Option<String> {
    match value {
        Scalar::Integer(i) => Some(i.to_string()),
        Scalar::Float(f) if f.is_finite() => Some(f.to_string()),
        Scalar::Float(_) => None,
        Scalar::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Scalar::Text(s) => Some(quote(s)),
        Scalar::Array(items) => {
            let rendered: Option<Vec<String>> = items.iter().map(render_value).collect();
            rendered.map(|items| format!("{{{}}}", items.join(", ")))
        }
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

// =============================================================================
// Identity read-back
// =============================================================================

fn identity_rules() -> String {
    let mut rules = String::from("set unpack = 1;\n");
    for key in IDENTITY_KEYS {
        rules.push_str(&format!("print \"{key}=[{key}]\";\n", key = key));
    }
    rules
}

/// Parse the `key=value` lines printed by [`identity_rules`].
fn parse_identity(stdout: &str) -> MessageIdentity {
    MessageIdentity::from_pairs(stdout.lines().filter_map(|line| line.split_once('=')))
}
