use std::path::Path;

use pgnode_node::{Row, Rows};
use tokio::process::Command;
use tracing::debug;

use crate::LISTEN_ADDRESS;
use crate::error::Error;

/// Column separator passed to `psql -F`.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Runs a single statement through `psql` and collects the result rows.
pub(crate) async fn execute(
    bin_dir: &Path,
    port: u16,
    username: &str,
    sql: &str,
) -> Result<Rows, Error> {
    debug!("executing: {}", sql);

    let output = Command::new(bin_dir.join("psql"))
        .arg("-X")
        .arg("-q")
        .arg("-A")
        .arg("-t")
        .arg("-F")
        .arg(FIELD_SEPARATOR.to_string())
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-h")
        .arg(LISTEN_ADDRESS)
        .arg("-p")
        .arg(port.to_string())
        .arg("-U")
        .arg(username)
        .arg("-d")
        .arg("postgres")
        .arg("-c")
        .arg(sql)
        .output()
        .await
        .map_err(|e| Error::Io("failed to run psql", e))?;

    if !output.status.success() {
        return Err(Error::Query {
            sql: sql.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(parse_rows(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses unaligned, tuples-only `psql` output.
pub(crate) fn parse_rows(output: &str) -> Rows {
    Rows::new(
        output
            .lines()
            .map(|line| line.split(FIELD_SEPARATOR).map(str::to_string).collect::<Row>())
            .collect(),
    )
}
