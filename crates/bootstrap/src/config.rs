/// What to configure on a freshly initialized node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Configuration file the preload line is appended to.
    pub conf_file: String,

    /// Extensions created once the server is up, in order.
    pub extensions: Vec<String>,

    /// Modules loaded into the server at startup.
    pub preload_libraries: Vec<String>,
}

impl BootstrapConfig {
    /// Renders the `shared_preload_libraries` setting.
    #[must_use]
    pub fn preload_libraries_line(&self) -> String {
        format!(
            "shared_preload_libraries = '{}'",
            self.preload_libraries.join(", ")
        )
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            conf_file: "postgresql.conf".to_string(),
            extensions: vec!["pg_stat_statements".to_string(), "sr_plan".to_string()],
            preload_libraries: vec!["pg_stat_statements".to_string(), "sr_plan".to_string()],
        }
    }
}
