//! Runtime configuration.
//!
//! Values come from CLI flags, falling back to environment variables
//! (see [`crate::cli::Cli`]), and are handed to the service as a
//! [`ServiceConfig`].

/// Environment variable holding the database path.
pub const DATABASE_ENV: &str = "DROPZONE_DB";

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV: &str = "DROPZONE_LOG";

/// Environment variable toggling tandem compensation reversal.
pub const REVERSE_TANDEM_ENV: &str = "DROPZONE_REVERSE_TANDEM_COMPENSATION";

/// Behaviour switches for [`crate::application::DropzoneService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// When a tandem is pulled off a load, also record negative entries that
    /// cancel the instructor's `tandem_jump` / media credits. Off by default:
    /// removal then only clears the manifest and the instructor assignment.
    pub reverse_tandem_compensation: bool,
}

impl ServiceConfig {
    pub fn with_tandem_reversal(mut self, enabled: bool) -> Self {
        self.reverse_tandem_compensation = enabled;
        self
    }
}
