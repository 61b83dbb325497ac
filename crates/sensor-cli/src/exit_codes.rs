//! Process exit codes of `sensorium` for failed runs. Success exits with 0.

use sensor_core::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Configuration could not be read or is invalid
    ConfigError = 10,
    /// Capture folder or sensor file unavailable
    SourceError = 11,
    /// Data could not be processed, including output serialization
    DataError = 12,
    /// Writing output failed
    IoError = 13,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for a failed run.
    pub fn for_error(error: &anyhow::Error) -> Self {
        if let Some(sensor_error) = error.chain().find_map(|e| e.downcast_ref::<SensorError>()) {
            return match sensor_error {
                SensorError::InvalidConfig(_) => ExitCode::ConfigError,
                SensorError::SourceUnavailable { .. } => ExitCode::SourceError,
                _ => ExitCode::DataError,
            };
        }
        if error.chain().any(|e| e.is::<std::io::Error>()) {
            return ExitCode::IoError;
        }
        ExitCode::DataError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_sensor_errors() {
        let err = anyhow::Error::new(SensorError::invalid_range(10.0, 5.0));
        assert_eq!(ExitCode::for_error(&err), ExitCode::DataError);

        let err = anyhow::Error::new(SensorError::source_unavailable("capture", "missing"))
            .context("loading capture");
        assert_eq!(ExitCode::for_error(&err), ExitCode::SourceError);
        assert_eq!(ExitCode::SourceError.as_i32(), 11);
    }

    #[test]
    fn io_and_unclassified_errors() {
        let err = anyhow::Error::new(std::io::Error::other("broken pipe")).context("writing export");
        assert_eq!(ExitCode::for_error(&err), ExitCode::IoError);

        let serialization = serde_json::from_str::<Vec<f64>>("[1,").unwrap_err();
        let err = anyhow::Error::new(serialization).context("printing report");
        assert_eq!(ExitCode::for_error(&err), ExitCode::DataError);

        let err = anyhow::Error::new(SensorError::invalid_config("threshold must be positive"));
        assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
    }
}
