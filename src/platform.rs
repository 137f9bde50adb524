use std::process;

use crate::error::ParseError;

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }

    /// Exit status for a failed parse.
    pub fn for_parse_error(error: &ParseError) -> Self {
        match error {
            ParseError::InvalidDirectory { .. } => ExitCode::InvalidUsage,
            _ => ExitCode::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidUsage as i32, 2);
    }

    #[test]
    fn test_invalid_directory_is_usage_error() {
        let err = ParseError::InvalidDirectory {
            path: PathBuf::from("/nope"),
        };
        assert_eq!(ExitCode::for_parse_error(&err), ExitCode::InvalidUsage);
    }
}
