use std::fmt;
use std::path::PathBuf;

/// Connection details printed once a node is up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostics {
    /// Directory holding the server binaries.
    pub bin_dir: PathBuf,

    /// Server log file.
    pub log_path: PathBuf,

    /// Node name.
    pub name: String,

    /// Server process id.
    pub pid: u32,

    /// Listening port.
    pub port: u16,

    /// Result of `select version()`.
    pub version: String,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Node:\t{}", self.name)?;
        writeln!(f, "Info:\t{}", self.version)?;
        writeln!(f, "BIN:\t{}", self.bin_dir.display())?;
        writeln!(f, "Logs:\t{}", self.log_path.display())?;
        writeln!(f, "Pid:\t{}", self.pid)?;
        writeln!(f, "Port:\t{}", self.port)?;
        writeln!(f)?;
        writeln!(f, "Press ctrl+C to exit")
    }
}
