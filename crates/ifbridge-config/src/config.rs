/// Controls configuration loading behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// When true, device and interface objects reject unknown properties.
    pub strict_mode: bool,
    /// When false, schema validation is skipped and only deserialization runs.
    pub validate_schema: bool,
    /// Maximum number of device files loaded from a directory.
    pub max_files_from_directory: usize,
    /// Maximum bytes allowed per configuration file.
    pub max_file_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            validate_schema: true,
            max_files_from_directory: 64,
            max_file_size: 256 * 1024,
        }
    }
}
