use anyhow::Error;
use devgraph_api::DevicegraphError;

pub mod cli;
pub mod commands;
pub mod config;

pub const DEVGRAPH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process exit code for a failed command.
///
/// - 2: the request was invalid (unknown device, bad argument, unsupported
///   operation).
/// - 3: a devicegraph is corrupt.
/// - 1: anything else, e.g. I/O or parse errors.
pub fn exit_code(error: &Error) -> u8 {
    let devicegraph_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<DevicegraphError>());

    match devicegraph_error {
        Some(DevicegraphError::GraphIntegrity(_)) => 3,
        Some(_) => 2,
        None => 1,
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};
    use devgraph_api::{IntegrityError, Sid};

    use super::*;

    #[test]
    fn test_exit_code() {
        let not_found: Result<(), _> = Err(DevicegraphError::NotFound(Sid(7)));
        let err = not_found.context("Failed to remove").unwrap_err();
        assert_eq!(exit_code(&err), 2);

        let corrupt: Result<(), _> = Err(DevicegraphError::GraphIntegrity(
            IntegrityError::DuplicateSid(Sid(1)),
        ));
        let err = corrupt.context("Invalid devicegraph").unwrap_err();
        assert_eq!(exit_code(&err), 3);

        assert_eq!(exit_code(&anyhow!("disk on fire")), 1);
    }
}
