#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::Path;
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

/// Create a `docframe` command isolated from the user's configuration.
#[allow(dead_code)]
pub fn docframe_cmd(config_path: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("docframe"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("DOCFRAME_CONFIG", config_path);
    cmd.env_remove("DOCFRAME_ORIGIN");
    cmd.env("NO_COLOR", "1");
    cmd
}
