//! The eight error kinds from the spec's error handling design, not eight
//! unrelated exception types — callers match on `kind()` to decide policy
//! (warn-and-continue, fail-fast, mark-failed-past-PNR, never-retry).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RsgoError {
  /// Bad ids, missing fields, unknown observer type. Reported synchronously,
  /// never retried.
  #[error("validation error: {0}")]
  Validation(String),

  /// Cooperative cancellation. Past PNR this still marks the deployment
  /// Failed; the variant exists so callers can tell it apart from a "real"
  /// failure.
  #[error("operation cancelled")]
  Cancelled,

  /// Pull failed but a local image exists; recorded as a warning by the
  /// caller, not fatal on its own.
  #[error(
    "image '{image}' could not be pulled - using existing local image. The deployed version may be outdated."
  )]
  PullFailedFallback { image: String },

  /// Pull failed and no local image exists to fall back to. Fatal.
  #[error("failed to pull image '{image}' for service '{service}': {reason}")]
  PullFailedTerminal {
    service: String,
    image: String,
    reason: String,
  },

  /// Init container exited non-zero, timed out, or disappeared mid-run.
  #[error(
    "init container '{service}' failed (exit code: {exit_code:?}): {reason}\n--- last {log_lines} log lines ---\n{logs}"
  )]
  InitContainerFailed {
    service: String,
    exit_code: Option<i64>,
    reason: String,
    log_lines: usize,
    logs: String,
  },

  #[error("failed to start service '{service}': {reason}")]
  ServiceStartFailed { service: String, reason: String },

  /// The container engine itself is unreachable.
  #[error("container engine unavailable: {0}")]
  EngineUnavailable(String),

  /// An observer check failed transiently; never changes operation mode.
  #[error("observer check failed: {0}")]
  ObserverTransient(String),
}

impl RsgoError {
  /// Whether this error must drive the owning deployment to `Failed`
  /// if it occurs past the Point of No Return (§4.6, §7 policy).
  pub fn is_fatal_past_pnr(&self) -> bool {
    !matches!(self, RsgoError::PullFailedFallback { .. })
  }
}

pub type RsgoResult<T> = Result<T, RsgoError>;
