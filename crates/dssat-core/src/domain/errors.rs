use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type DssatResult<T> = Result<T, DssatError>;
pub type ParserResult<T> = DssatResult<T>;
pub type CodecResult<T> = DssatResult<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DssatErrorCategory {
    Success,
    InputValidationError,
    ParseError,
    CodecError,
    ReconcileError,
    CollaboratorFailure,
    CollaboratorTimeout,
    IoSystemError,
    InternalError,
}

impl DssatErrorCategory {
    pub const fn exit_placeholder(self) -> ExitPlaceholder {
        match self {
            Self::Success => ExitPlaceholder {
                exit_code: 0,
                rust_category: "Success",
                legacy_class: "SUCCESS",
            },
            Self::InputValidationError => ExitPlaceholder {
                exit_code: 2,
                rust_category: "InputValidationError",
                legacy_class: "INPUT_FATAL",
            },
            Self::ParseError => ExitPlaceholder {
                exit_code: 3,
                rust_category: "ParseError",
                legacy_class: "PARSE_FATAL",
            },
            Self::CodecError => ExitPlaceholder {
                exit_code: 4,
                rust_category: "CodecError",
                legacy_class: "CODEC_FATAL",
            },
            Self::ReconcileError => ExitPlaceholder {
                exit_code: 5,
                rust_category: "ReconcileError",
                legacy_class: "GENOTYPE_FATAL",
            },
            Self::CollaboratorFailure => ExitPlaceholder {
                exit_code: 6,
                rust_category: "CollaboratorFailure",
                legacy_class: "RUN_FATAL",
            },
            Self::CollaboratorTimeout => ExitPlaceholder {
                exit_code: 7,
                rust_category: "CollaboratorTimeout",
                legacy_class: "RUN_TIMEOUT",
            },
            Self::IoSystemError => ExitPlaceholder {
                exit_code: 8,
                rust_category: "IoSystemError",
                legacy_class: "IO_FATAL",
            },
            Self::InternalError => ExitPlaceholder {
                exit_code: 9,
                rust_category: "InternalError",
                legacy_class: "SYS_FATAL",
            },
        }
    }

    pub const fn exit_code(self) -> i32 {
        self.exit_placeholder().exit_code
    }

    pub const fn rust_category(self) -> &'static str {
        self.exit_placeholder().rust_category
    }

    pub const fn legacy_class(self) -> &'static str {
        self.exit_placeholder().legacy_class
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }

    /// Errors that reject a single experiment file while a batch keeps going.
    pub const fn is_experiment_local(self) -> bool {
        matches!(self, Self::InputValidationError | Self::ParseError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPlaceholder {
    pub exit_code: i32,
    pub rust_category: &'static str,
    pub legacy_class: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    pub experiment: Option<String>,
    pub cultivar: Option<String>,
    pub path: Option<PathBuf>,
}

impl ErrorContext {
    pub fn is_empty(&self) -> bool {
        self.experiment.is_none() && self.cultivar.is_none() && self.path.is_none()
    }

    fn render(&self) -> String {
        let mut parts = Vec::new();
        if let Some(experiment) = &self.experiment {
            parts.push(format!("experiment={}", experiment));
        }
        if let Some(cultivar) = &self.cultivar {
            parts.push(format!("cultivar={}", cultivar));
        }
        if let Some(path) = &self.path {
            parts.push(format!("path={}", path.display()));
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DssatError {
    category: DssatErrorCategory,
    placeholder: &'static str,
    message: String,
    context: ErrorContext,
}

impl DssatError {
    pub fn new(
        category: DssatErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            DssatErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn parse(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::ParseError, placeholder, message)
    }

    pub fn codec(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::CodecError, placeholder, message)
    }

    pub fn reconcile(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::ReconcileError, placeholder, message)
    }

    pub fn collaborator(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::CollaboratorFailure, placeholder, message)
    }

    pub fn collaborator_timeout(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::CollaboratorTimeout, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(DssatErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> DssatErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    // Inner layers know the most specific value, so existing context is kept.
    pub fn with_experiment(mut self, experiment: impl Into<String>) -> Self {
        if self.context.experiment.is_none() {
            self.context.experiment = Some(experiment.into());
        }
        self
    }

    pub fn with_cultivar(mut self, cultivar: impl Into<String>) -> Self {
        if self.context.cultivar.is_none() {
            self.context.cultivar = Some(cultivar.into());
        }
        self
    }

    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        if self.context.path.is_none() {
            self.context.path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        if self.context.is_empty() {
            format!("{}: [{}] {}", severity, self.placeholder, self.message)
        } else {
            format!(
                "{}: [{}] {} ({})",
                severity,
                self.placeholder,
                self.message,
                self.context.render()
            )
        }
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for DssatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.rust_category(),
            self.placeholder,
            self.message
        )?;
        if !self.context.is_empty() {
            write!(f, " ({})", self.context.render())?;
        }
        Ok(())
    }
}

impl Error for DssatError {}

pub trait ErrorContextExt<T> {
    fn in_experiment(self, experiment: &str) -> DssatResult<T>;
    fn for_cultivar(self, cultivar: &str) -> DssatResult<T>;
    fn at_path(self, path: &Path) -> DssatResult<T>;
}

impl<T> ErrorContextExt<T> for DssatResult<T> {
    fn in_experiment(self, experiment: &str) -> DssatResult<T> {
        self.map_err(|error| error.with_experiment(experiment))
    }

    fn for_cultivar(self, cultivar: &str) -> DssatResult<T> {
        self.map_err(|error| error.with_cultivar(cultivar))
    }

    fn at_path(self, path: &Path) -> DssatResult<T> {
        self.map_err(|error| error.with_path(path))
    }
}
