//! Report formatting for the packaging binaries.
//!
//! Everything is written to stderr. Failures are always reported; `--quiet`
//! only suppresses per-identity success lines and the summary.

use crate::error::Result;
use crate::pipeline::{IdentityReport, RunReport, VariantOutcome};
use std::fmt::Display;
use std::io::Write;

/// Write one line, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort reporting; ignore write failures.
    }
}

/// Format the line reported for one identity.
///
/// # Example
///
/// ```
/// use crx_packager::component::{ComponentIdentity, ComponentType};
/// use crx_packager::component_id::ComponentId;
/// use crx_packager::output::outcome_line;
/// use crx_packager::pipeline::{IdentityReport, VariantOutcome};
///
/// let entry = IdentityReport {
///     identity: ComponentIdentity::new(ComponentType::SpeedreaderUpdater, None),
///     id: ComponentId::try_from("jicbkmdloagakknpihibphagfckhjdih")?,
///     outcome: VariantOutcome::Skipped,
/// };
/// assert_eq!(
///     outcome_line(&entry),
///     "skipped speedreader-updater (jicbkmdloagakknpihibphagfckhjdih)"
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[must_use]
pub fn outcome_line(entry: &IdentityReport) -> String {
    let IdentityReport {
        identity, id, outcome,
    } = entry;
    match outcome {
        VariantOutcome::Packaged { version, archive } => {
            format!("packaged {identity} ({id}) {version} -> {archive}")
        }
        VariantOutcome::Failed { error } => format!("failed {identity} ({id}): {error}"),
        VariantOutcome::Skipped => format!("skipped {identity} ({id})"),
    }
}

/// Summary line for a finished run.
#[must_use]
pub fn summary_line(report: &RunReport) -> String {
    let total = report.entries().len();
    let plural = if total == 1 { "identity" } else { "identities" };
    format!(
        "Packaged {} of {total} {plural}",
        report.packaged_count()
    )
}

/// Write the per-identity lines and the summary for a run.
pub fn write_report(report: &RunReport, quiet: bool, stderr: &mut dyn Write) {
    for entry in report.entries() {
        let is_failure = matches!(entry.outcome, VariantOutcome::Failed { .. });
        if is_failure || !quiet {
            write_stderr_line(stderr, outcome_line(entry));
        }
    }
    if !quiet {
        write_stderr_line(stderr, summary_line(report));
    }
}

/// Report a run and map it onto a process exit code.
///
/// Returns 0 only when the run completed and every identity was packaged or
/// skipped without failure.
pub fn exit_code_for_run(result: Result<RunReport>, quiet: bool, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(report) => {
            write_report(&report, quiet, stderr);
            i32::from(report.has_failures())
        }
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}
