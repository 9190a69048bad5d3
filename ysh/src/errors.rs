use crate::shell::APP_NAME;
use tracing::debug;

/// Display an error in a user-friendly format without stack traces.
///
/// The whole context chain is printed on one line. When `log_normal` is true
/// the error is also recorded in the debug log.
pub fn display_user_error(err: &anyhow::Error, log_normal: bool) {
    if log_normal {
        debug!("USER_ERROR: {:?}", err);
    }
    eprintln!("{}: {:#}", APP_NAME, err);
}
