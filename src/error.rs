use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SkwError {
    #[error("config file not found: {0}")]
    ConfigMissing(PathBuf),

    #[error("config error: {0}")]
    ConfigInvalid(String),

    #[error("book XML not found: {0}")]
    XmlMissing(PathBuf),

    #[error("book XML malformed: {0}")]
    XmlMalformed(String),

    #[error("xpath error: {0}")]
    XpathInvalid(String),

    #[error("dependency cycle not covered by any ordered build group: {}", .0.join(", "))]
    UnhandledCycle(Vec<String>),

    #[error("malformed rewrite rule: {0}")]
    RuleMalformed(String),

    #[error("build plan invariant violated: {0}")]
    PlanInvalid(String),

    #[error("script {script} failed with exit code {code} (log: {log})")]
    ScriptFailed {
        script: String,
        code: i32,
        log: PathBuf,
    },

    #[error("{tool} failed with exit code {code}")]
    ExternalToolFailed { tool: String, code: i32 },

    #[error("repository unreachable: {0}")]
    RepoUnreachable(String),

    #[error("SHA256 mismatch for {file}:\n  expected: {expected}\n  actual:   {actual}")]
    IntegrityError {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("refusing to upload to HTTP(S) target: {0}")]
    UploadRejected(String),

    #[error("archive member escapes extraction root: {0}")]
    PathEscape(String),

    #[error("archive error: {0}")]
    ArchiveError(String),

    #[error("install aborted by user")]
    InstallDeclined,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SkwError {
    /// Short category tag printed next to CLI errors.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config-missing",
            Self::ConfigInvalid(_) => "config",
            Self::XmlMissing(_) => "xml-missing",
            Self::XmlMalformed(_) => "xml",
            Self::XpathInvalid(_) => "xpath",
            Self::UnhandledCycle(_) => "cycle",
            Self::RuleMalformed(_) => "rule",
            Self::PlanInvalid(_) => "plan",
            Self::ScriptFailed { .. } => "script",
            Self::ExternalToolFailed { .. } => "tool",
            Self::RepoUnreachable(_) => "repo",
            Self::IntegrityError { .. } => "integrity",
            Self::UploadRejected(_) => "upload",
            Self::PathEscape(_) => "path-escape",
            Self::ArchiveError(_) => "archive",
            Self::InstallDeclined => "declined",
            Self::IoError(_) => "io",
            Self::TomlError(_) => "toml",
            Self::JsonError(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, SkwError>;
