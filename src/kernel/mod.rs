//! Kernel module - Kaggle kernels driven through the `kaggle` CLI.
//!
//! This module contains:
//! - Parsing of `kaggle kernels list` / `status` output
//! - KernelRunner, the subprocess wrapper
//! - kernel-metadata.json scaffolding for new kernel directories

pub mod runner;
pub mod scaffold;

pub use runner::KernelRunner;
pub use scaffold::{scaffold_kernel_dir, KernelMetadata};

use serde::Serialize;

/// One row of `kaggle kernels list --mine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelInfo {
    /// Kernel reference (`owner/slug`)
    pub name: String,
    pub title: String,
    pub language: String,
    #[serde(rename = "type")]
    pub kernel_type: String,
}

/// Parse the tabular output of `kaggle kernels list`.
///
/// The first line is the header. Rows with fewer than four whitespace
/// separated fields (blank lines, `----` rules, wrapped text) are skipped;
/// this tolerates table noise, it does not validate the rows that remain.
pub fn parse_kernel_list(output: &str) -> Vec<KernelInfo> {
    output
        .trim()
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            let n = parts.len();
            Some(KernelInfo {
                name: parts[0].to_string(),
                title: parts[1..n - 2].join(" "),
                language: parts[n - 2].to_string(),
                kernel_type: parts[n - 1].to_string(),
            })
        })
        .collect()
}

/// Execution state reported by `kaggle kernels status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelStatus {
    Queued,
    Running,
    Complete,
    Error,
    Cancelled,
    /// Anything we do not recognise, verbatim
    Unknown(String),
}

impl KernelStatus {
    /// Parse `kaggle kernels status` output, e.g.
    /// `alice/demo has status "complete"`.
    ///
    /// Only the quoted token after `has status` is matched, so the kernel
    /// name on the same line and any `Failure message:` lines that follow
    /// do not affect the result. Newer CLI versions print the enum name
    /// (`KernelWorkerStatus.ERROR`); the prefix is dropped.
    pub fn parse(output: &str) -> Self {
        const MARKER: &str = "has status \"";

        let token = output.lines().find_map(|line| {
            let rest = &line[line.find(MARKER)? + MARKER.len()..];
            rest.find('"').map(|end| &rest[..end])
        });
        let Some(token) = token else {
            let last = output
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("");
            return Self::Unknown(last.to_string());
        };

        let name = token.rsplit('.').next().unwrap_or(token);
        match name.to_lowercase().replace('_', "").as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "complete" => Self::Complete,
            "error" => Self::Error,
            "cancelrequested" | "cancelacknowledged" => Self::Cancelled,
            _ => Self::Unknown(token.to_string()),
        }
    }

    /// No further status change is expected.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Complete => f.write_str("complete"),
            Self::Error => f.write_str("error"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Unknown(text) => write!(f, "unknown ({})", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kernel_list_rows() {
        let output = "\
ref                 title                 language  kernelType
alice/titanic-eda   Titanic EDA notebook  python    notebook
alice/quick         Quick                 r         script
";
        let kernels = parse_kernel_list(output);
        assert_eq!(kernels.len(), 2);
        assert_eq!(kernels[0].name, "alice/titanic-eda");
        assert_eq!(kernels[0].title, "Titanic EDA notebook");
        assert_eq!(kernels[0].language, "python");
        assert_eq!(kernels[0].kernel_type, "notebook");
        assert_eq!(kernels[1].title, "Quick");
    }

    #[test]
    fn test_parse_kernel_list_header_and_short_line() {
        let output = "ref title language kernelType\nalice/broken python\n";
        assert!(parse_kernel_list(output).is_empty());
    }

    #[test]
    fn test_parse_kernel_list_skips_rules_and_blanks() {
        let output = "ref title language kernelType\n----  ----  ----\n\nalice/a  A  python  script\n";
        let kernels = parse_kernel_list(output);
        assert_eq!(kernels.len(), 1);
        assert_eq!(kernels[0].name, "alice/a");
    }

    #[test]
    fn test_parse_kernel_list_empty_output() {
        assert!(parse_kernel_list("").is_empty());
    }

    #[test]
    fn test_kernel_status_parse() {
        assert_eq!(
            KernelStatus::parse("alice/demo has status \"complete\"\n"),
            KernelStatus::Complete
        );
        assert_eq!(
            KernelStatus::parse("alice/demo has status \"running\""),
            KernelStatus::Running
        );
        assert_eq!(
            KernelStatus::parse("alice/demo has status \"error\""),
            KernelStatus::Error
        );
        assert_eq!(
            KernelStatus::parse("alice/demo has status \"cancelAcknowledged\""),
            KernelStatus::Cancelled
        );
        assert_eq!(
            KernelStatus::parse("noise\nalice/demo has status \"queued\"\n\n"),
            KernelStatus::Queued
        );
        assert_eq!(
            KernelStatus::parse("something new"),
            KernelStatus::Unknown("something new".to_string())
        );
    }

    #[test]
    fn test_kernel_name_does_not_leak_into_status() {
        assert_eq!(
            KernelStatus::parse("alice/auto-complete-model has status \"running\""),
            KernelStatus::Running
        );
        assert_eq!(
            KernelStatus::parse("alice/error-analysis has status \"queued\""),
            KernelStatus::Queued
        );
        assert_eq!(
            KernelStatus::parse("bob/cancel-culture has status \"complete\""),
            KernelStatus::Complete
        );
    }

    #[test]
    fn test_enum_style_status_with_failure_message() {
        let output = "alice/demo has status \"KernelWorkerStatus.ERROR\"\n\
                      Failure message: \"Notebook ran out of memory\"\n";
        let status = KernelStatus::parse(output);
        assert_eq!(status, KernelStatus::Error);
        assert!(status.is_finished());

        assert_eq!(
            KernelStatus::parse("alice/demo has status \"KernelWorkerStatus.CANCEL_ACKNOWLEDGED\""),
            KernelStatus::Cancelled
        );
        assert_eq!(
            KernelStatus::parse("alice/demo has status \"KernelWorkerStatus.COMPLETE\""),
            KernelStatus::Complete
        );
    }

    #[test]
    fn test_finished_states() {
        assert!(KernelStatus::Complete.is_finished());
        assert!(KernelStatus::Error.is_finished());
        assert!(!KernelStatus::Running.is_finished());
        assert!(!KernelStatus::Unknown("x".into()).is_finished());
    }
}
